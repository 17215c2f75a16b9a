//! Per-section JSON export.
//!
//! Aligns every language/edition variant of a book to absolute segment
//! positions and writes the documents consumed by the mobile clients.

pub mod calendar;
pub mod documents;
pub mod markup;
pub mod merge;
pub mod shared;

pub use calendar::{build_calendar, calendar_metadata};
pub use documents::{export_index, export_text_json, remove_files, version_hash, write_doc};
pub use markup::strip_itags;
pub use merge::{IndexExporter, SectionMetadata, SectionTexts, SimpleLink};
pub use shared::SharedDocs;
