//! Queue and scan statistics for external monitoring

use crate::state::ScanStatus;
use crate::storage::{InstanceLease, JobQueue, JobStatus, LeaseRecord, ScanStore};
use crate::worker::LEASE_NAME;
use crate::SentinelError;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;

/// Worker statistics summary
#[derive(Debug, Clone)]
pub struct WorkerStatistics {
    /// Jobs waiting to be claimed
    pub jobs_pending: u64,

    /// Jobs claimed and not yet finished
    pub jobs_processing: u64,

    /// Jobs completed in the last hour
    pub jobs_completed_last_hour: u64,

    /// Jobs failed in the last hour
    pub jobs_failed_last_hour: u64,

    /// Count of scans by status
    pub scans_by_status: BTreeMap<ScanStatus, u64>,

    /// Current holder of the worker lease
    pub lease: Option<LeaseRecord>,
}

impl WorkerStatistics {
    pub fn total_scans(&self) -> u64 {
        self.scans_by_status.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The store to query
///
/// # Returns
///
/// * `Ok(WorkerStatistics)` - Successfully loaded statistics
/// * `Err(SentinelError)` - Failed to query statistics
pub fn load_statistics<S>(store: &S) -> Result<WorkerStatistics, SentinelError>
where
    S: ScanStore + JobQueue + InstanceLease + ?Sized,
{
    let hour_ago = Utc::now() - Duration::hours(1);

    let mut scans_by_status = BTreeMap::new();
    for status in ScanStatus::all_states() {
        scans_by_status.insert(status, store.count_scans_by_status(status)?);
    }

    Ok(WorkerStatistics {
        jobs_pending: store.count_jobs_by_status(JobStatus::Pending, None)?,
        jobs_processing: store.count_jobs_by_status(JobStatus::Processing, None)?,
        jobs_completed_last_hour: store
            .count_jobs_by_status(JobStatus::Completed, Some(hour_ago))?,
        jobs_failed_last_hour: store.count_jobs_by_status(JobStatus::Failed, Some(hour_ago))?,
        scans_by_status,
        lease: store.lease_holder(LEASE_NAME)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &WorkerStatistics) {
    println!("=== Worker Statistics ===\n");

    println!("Queue:");
    println!("  Pending: {}", stats.jobs_pending);
    println!("  Processing: {}", stats.jobs_processing);
    println!("  Completed (last hour): {}", stats.jobs_completed_last_hour);
    println!("  Failed (last hour): {}", stats.jobs_failed_last_hour);
    println!();

    println!("Scans by Status:");
    let total = stats.total_scans();
    for (status, count) in &stats.scans_by_status {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    match &stats.lease {
        Some(lease) => println!(
            "Worker: {} (since {}, last heartbeat {})",
            lease.holder, lease.acquired_at, lease.heartbeat_at
        ),
        None => println!("Worker: not running"),
    }
}
