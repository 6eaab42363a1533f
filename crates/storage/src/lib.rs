//! Storage layer: the on-disk repository contract.
//!
//! Holds the folder naming codec and the path layout every other crate
//! resolves against. The filesystem is the only source of truth; nothing
//! here caches directory state.

use thiserror::Error;

pub mod codec;
pub mod layout;

pub use codec::{decode, encode, ConceptFolder};
pub use layout::{normalize_rel, validate_segment, RepoLayout, SubsetKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("unknown subset kind: {0}")]
    UnknownSubset(String),
}
