//! Export synchronization.
//!
//! This module keeps the published artifacts in step with the library:
//! - Persisted per-book export times (`last_updated.json`)
//! - Detection of books edited or added since the last export
//! - Batched, retried edge-cache invalidation
//! - Alerts to the operations channel

pub mod alert;
pub mod detector;
pub mod invalidate;
pub mod retry;
pub mod state;

pub use alert::{alerter_for, AlertIcon, Alerter, LogAlerter, MemoryAlerter, WebhookAlerter};
pub use detector::{ChangeDetector, ChangeSet};
pub use invalidate::{
    CacheInvalidator, CloudflarePurgeClient, MemoryPurgeClient, PurgeClient, PurgeReport,
};
pub use retry::{retry, retry_with_config, RetryConfig, RetryExecutor};
pub use state::{SyncSnapshot, SyncStateStore};
