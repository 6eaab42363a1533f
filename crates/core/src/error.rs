use std::io;
use std::path::{Path, PathBuf};
use storage::LayoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("image codec: {0}")]
    Image(#[from] image::ImageError),
    #[error("archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),
    #[error("tagger: {0}")]
    Tagger(#[from] providers::ProviderError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<LayoutError> for Error {
    fn from(err: LayoutError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

/// Attaches the offending path to an io error, mapping a missing file to
/// [`Error::NotFound`].
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}
