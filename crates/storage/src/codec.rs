//! `<repeat>_<name>` concept folder codec.

use crate::LayoutError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptFolder {
    pub repeat: u32,
    pub name: String,
}

impl ConceptFolder {
    pub fn new(repeat: u32, name: impl Into<String>) -> Self {
        Self {
            repeat,
            name: name.into(),
        }
    }

    pub fn folder_name(&self) -> Result<String, LayoutError> {
        encode(self.repeat, &self.name)
    }
}

/// Builds the folder name for a concept. The name must not contain a path
/// separator and must be non-empty, otherwise it could not be decoded back.
pub fn encode(repeat: u32, name: &str) -> Result<String, LayoutError> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(LayoutError::InvalidName(name.to_string()));
    }
    Ok(format!("{}_{}", repeat, name))
}

/// Parses `^(\d+)_(.+)$`. Anything else is not a concept folder and yields
/// `None`; listing code treats that as a filter, never an error.
pub fn decode(folder_name: &str) -> Option<ConceptFolder> {
    let (digits, name) = folder_name.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
        return None;
    }
    let repeat = digits.parse::<u32>().ok()?;
    Some(ConceptFolder {
        repeat,
        name: name.to_string(),
    })
}
