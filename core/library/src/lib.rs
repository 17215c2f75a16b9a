//! Text library abstraction for folio.
//!
//! The exporter never owns the corpus. Titles, references, version
//! content, links, edit history and the table of contents all come from a
//! text library collaborator reached through the traits in [`library`].
//!
//! # Design Principles
//! - Narrow seams: each concern is its own trait, [`TextLibrary`] bundles them
//! - Async operations: the backing store is usually a database
//! - Owned data: every value crossing the seam is a plain owned struct

pub mod library;
pub mod memory;
pub mod model;
pub mod toc;

pub use library::{CatalogSource, EditHistory, LinkIndex, ReferenceResolver, TextLibrary, VersionStore};
pub use memory::{EditEvent, EditKind, MemoryBook, MemoryLibrary};
pub use model::{
    CalendarCustom, CalendarItem, Chunk, ChunkOrigin, EditQuery, EditTarget, Index, LocalizedText,
    RawLink, Ref, SchemaNode, TextNode, Version,
};
pub use toc::TocNode;
