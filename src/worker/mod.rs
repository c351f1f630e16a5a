//! Worker module: the job loop, the per-scan pipeline and the slot tracker
//!
//! # Components
//!
//! - `WorkerRunner`: single-instance loop over the job queue
//! - `ScanPipeline`: one scan from PENDING to a terminal state
//! - `WorkerPool`: bounded, stale-aware concurrency slots

mod pipeline;
mod pool;
mod runner;

pub use pipeline::{ScanPipeline, ScanSummary};
pub use pool::{ActiveSlot, PoolError, PoolStatus, Slot, WorkerPool};
pub use runner::{RunOutcome, WorkerRunner, LEASE_NAME};
