//! Export run orchestration.
//!
//! [`ExportOrchestrator`] sequences change detection, per-book export,
//! snapshot updates, bundle maintenance and cache invalidation for full,
//! incremental and single-book runs.

pub mod cleanup;
pub mod orchestrator;

pub use cleanup::disk_full_cleanup;
pub use orchestrator::{ExportOrchestrator, ExportReport};
