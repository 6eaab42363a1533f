//! Image decoding keyed on file content. The extension is only a fallback
//! hint, so a PNG saved as `.jpg` still decodes.

use crate::error::IoContext;
use crate::Result;
use image::io::Reader;
use image::DynamicImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn open_image(path: &Path) -> Result<DynamicImage> {
    Ok(reader(path)?.decode()?)
}

/// Width and height from the header only.
pub fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    Ok(reader(path)?.into_dimensions()?)
}

fn reader(path: &Path) -> Result<Reader<BufReader<File>>> {
    Reader::open(path).at(path)?.with_guessed_format().at(path)
}
