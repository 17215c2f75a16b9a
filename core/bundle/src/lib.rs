//! Archive bundling.
//!
//! Book archives are grouped into content-addressed or curated bundles,
//! each split into parts no larger than the configured cap.

pub mod archive;
pub mod eviction;
pub mod fingerprint;
pub mod package;
pub mod service;

pub use archive::{build_split_archive, run_blocking, zip_book_files};
pub use eviction::{clear_bundles, clear_old_bundles, curated_names};
pub use fingerprint::fingerprint;
pub use package::{Package, PackageCatalog, PackageDefinition, Resolution};
pub use service::BundleService;
