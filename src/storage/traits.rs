//! Storage traits and error types
//!
//! These traits are the persistence seam of the worker: the scan-record store,
//! the durable job queue, and the single-instance lease. `SqliteStorage`
//! implements all three.

use crate::state::{ScanStatus, ScanType};
use crate::storage::{
    JobPayload, JobRecord, JobStatus, LeaseRecord, ScanRecord, ScanUpdate, ScorecardRecord,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Scan not found: {0}")]
    ScanNotFound(i64),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Job {id} is not in a state that allows {action}")]
    JobState { id: i64, action: &'static str },

    #[error("Invalid scan transition for scan {id}: {from} -> {to}")]
    InvalidTransition {
        id: i64,
        from: ScanStatus,
        to: ScanStatus,
    },

    #[error("Corrupt value in column {column}: {value}")]
    CorruptValue { column: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Scan-record store
///
/// Owns `ScanRecord.status`; every status change goes through
/// `transition_scan`, which rejects non-monotonic transitions.
pub trait ScanStore {
    // ===== Scan Lifecycle =====

    /// Creates a new PENDING scan and returns its ID
    fn create_scan(&mut self, target_url: &str, domain: &str, is_batch: bool)
        -> StorageResult<i64>;

    /// Gets a scan by ID
    fn get_scan(&self, scan_id: i64) -> StorageResult<ScanRecord>;

    /// Moves a scan to `to`, applying the fields in `update`
    ///
    /// Entering SCANNING stamps `started_at` and records `update.worker_id`.
    /// Entering a terminal state stamps `completed_at` and clears the worker
    /// identity; FAILED always stores an error message.
    ///
    /// # Errors
    ///
    /// `StorageError::InvalidTransition` if the scan's current status does not
    /// allow the transition, including when another writer changed it first.
    fn transition_scan(
        &mut self,
        scan_id: i64,
        to: ScanStatus,
        update: &ScanUpdate,
    ) -> StorageResult<()>;

    /// Records the crawl strategy in use for a scan
    fn update_scan_strategy(
        &mut self,
        scan_id: i64,
        scan_type: ScanType,
        fell_back: bool,
    ) -> StorageResult<()>;

    /// Replaces the stored report of a completed scan
    fn save_report(&mut self, scan_id: i64, report_json: &str) -> StorageResult<()>;

    /// Marks abandoned scans FAILED with the given reason
    ///
    /// A scan is abandoned when it is SCANNING, or when it is still PENDING but
    /// its job was already claimed (processing or failed).
    ///
    /// Returns the number of scans updated.
    fn fail_abandoned_scans(&mut self, reason: &str) -> StorageResult<usize>;

    // ===== Scorecards =====

    /// Inserts or replaces the AI trust scorecard for a scan
    fn upsert_scorecard(&mut self, scorecard: &ScorecardRecord) -> StorageResult<()>;

    /// Gets the scorecard for a scan, if one was stored
    fn get_scorecard(&self, scan_id: i64) -> StorageResult<Option<ScorecardRecord>>;

    // ===== Queries =====

    /// Counts scans with the given status
    fn count_scans_by_status(&self, status: ScanStatus) -> StorageResult<u64>;

    /// Domains whose FAST crawl has failed before
    fn domains_with_fast_fallback(&self) -> StorageResult<Vec<String>>;
}

/// Durable job queue
///
/// Delivery is at-most-once: a job leaves PENDING exactly once through
/// `dequeue_next`, and a failed job is never returned to PENDING.
pub trait JobQueue {
    /// Adds a PENDING job and returns its ID
    fn enqueue(&mut self, payload: &JobPayload) -> StorageResult<i64>;

    /// Atomically claims the oldest PENDING job
    ///
    /// Two callers never receive the same job.
    fn dequeue_next(&mut self) -> StorageResult<Option<JobRecord>>;

    /// Marks a PROCESSING job completed
    fn mark_complete(&mut self, job_id: i64) -> StorageResult<()>;

    /// Marks a job failed with the given reason
    fn mark_failed(&mut self, job_id: i64, reason: &str) -> StorageResult<()>;

    /// Gets a job by ID
    fn get_job(&self, job_id: i64) -> StorageResult<JobRecord>;

    /// Counts jobs with the given status, optionally only those touched since `since`
    fn count_jobs_by_status(
        &self,
        status: JobStatus,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<u64>;

    /// Marks every PROCESSING job failed with the given reason
    fn fail_abandoned_jobs(&mut self, reason: &str) -> StorageResult<usize>;

    /// Deletes finished jobs older than the given number of days
    fn cleanup(&mut self, older_than_days: u32) -> StorageResult<usize>;
}

/// Named single-holder lease used as a single-instance guard
pub trait InstanceLease {
    /// Takes the lease if it is free or its heartbeat is older than `stale_after`
    ///
    /// Returns false if another holder has a live lease.
    fn try_acquire_lease(
        &mut self,
        name: &str,
        holder: &str,
        stale_after: Duration,
    ) -> StorageResult<bool>;

    /// Refreshes the heartbeat; returns false if `holder` no longer owns the lease
    fn renew_lease(&mut self, name: &str, holder: &str) -> StorageResult<bool>;

    /// Releases the lease if `holder` owns it
    fn release_lease(&mut self, name: &str, holder: &str) -> StorageResult<()>;

    /// Current lease record, if any
    fn lease_holder(&self, name: &str) -> StorageResult<Option<LeaseRecord>>;
}

/// Everything the worker needs from its backing store
pub trait Store: ScanStore + JobQueue + InstanceLease + Send {}

impl<T> Store for T where T: ScanStore + JobQueue + InstanceLease + Send {}
