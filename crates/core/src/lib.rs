//! Core library: dataset store, captions, thumbnails, import/export, near-duplicate detection, tagging.

pub mod caption;
pub mod cluster;
pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod hashing;
pub mod import;
pub mod models;
pub mod sequence;
pub mod similar;
pub mod store;
pub mod tagging;
pub mod thumbnail;

pub use error::{Error, Result};
pub use store::ConceptStore;
