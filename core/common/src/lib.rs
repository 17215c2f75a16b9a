//! Common utilities and types shared across the folio export crates.
//!
//! This module provides the error type, the immutable export configuration
//! and the small value types that every pipeline stage agrees on.

pub mod config;
pub mod error;
pub mod json;
pub mod sparse;
pub mod types;

pub use config::{AlertConfig, CdnConfig, ExportConfig};
pub use error::{Error, Result};
pub use sparse::SparseSeq;
pub use types::{archive_name, title_from_archive, VersionKey};
