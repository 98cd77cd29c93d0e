//! opsdeck-status — the `/api/status` snapshot.
//!
//! ```text
//!  GET /api/status ──► StatusAggregator::get()  (never blocks)
//!                          │ stale and idle?
//!                          ▼
//!                   tokio::spawn(refresh) ──► SnapshotSource::collect()
//!                          │                      (ProbeSnapshotSource)
//!                          ▼
//!                   Arc<Snapshot> swapped in under the state lock
//! ```

pub mod aggregator;
pub mod error;
pub mod snapshot;

pub use aggregator::{DEFAULT_MAX_AGE, StatusAggregator, StatusMeta, StatusView};
pub use error::{StatusError, StatusResult};
pub use snapshot::{ProbeSnapshotSource, Snapshot, SnapshotSource};
