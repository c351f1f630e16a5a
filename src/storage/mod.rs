//! Storage module for persisting scans and jobs
//!
//! This module handles all database operations for the worker, including:
//! - SQLite database initialization and schema management
//! - Scan records and their status transitions
//! - The durable job queue with atomic claims
//! - AI trust scorecards
//! - The single-instance worker lease

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{InstanceLease, JobQueue, ScanStore, StorageError, StorageResult, Store};

use crate::state::{ScanStatus, ScanType, WorkerType};
use crate::url::parse_target;
use crate::SentinelError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Initializes or opens a storage database, creating its directory if needed
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SentinelError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SentinelError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStorage::new(path)
}

/// Formats a timestamp the way every table stores it
///
/// Fixed-width UTC with microseconds, so stored values compare correctly as text.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Represents a scan request in the database
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub id: i64,
    pub target_url: String,
    pub domain: String,
    pub status: ScanStatus,
    pub scan_type: Option<ScanType>,
    pub worker_type: Option<WorkerType>,
    pub is_batch: bool,
    /// True once the FAST crawl failed and the scan fell back to DEEP
    pub fell_back: bool,
    /// Set only while SCANNING
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub risk_score: Option<u8>,
    pub risk_level: Option<String>,
    pub grade: Option<String>,
    pub has_ai: bool,
    pub report_json: Option<String>,
    pub metadata_json: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Fields written alongside a status transition
///
/// Unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct ScanUpdate {
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub risk_score: Option<u8>,
    pub risk_level: Option<String>,
    pub grade: Option<String>,
    pub has_ai: Option<bool>,
    pub report_json: Option<String>,
    pub metadata_json: Option<String>,
}

impl ScanUpdate {
    /// Update for entering SCANNING under the given worker identity
    pub fn started_by(worker_id: &str) -> Self {
        Self {
            worker_id: Some(worker_id.to_string()),
            ..Self::default()
        }
    }

    /// Update for entering FAILED with the given message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Status of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Queue payload for one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPayload {
    pub scan_id: i64,
    pub url: String,
    pub is_batch: bool,
}

/// Represents a job in the queue
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub scan_id: i64,
    pub target_url: String,
    pub is_batch: bool,
    pub status: JobStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRecord {
    pub fn payload(&self) -> JobPayload {
        JobPayload {
            scan_id: self.scan_id,
            url: self.target_url.clone(),
            is_batch: self.is_batch,
        }
    }
}

/// AI trust scorecard stored for a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScorecardRecord {
    pub scan_id: i64,
    pub domain: String,
    pub has_ai: bool,
    pub confidence: String,
    pub signals: Vec<String>,
    /// AI-security category score, only when that category was applicable
    pub ai_score: Option<u8>,
    pub updated_at: String,
}

/// Holder of a named instance lease
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub name: String,
    pub holder: String,
    pub acquired_at: String,
    pub heartbeat_at: String,
}

/// IDs created by `enqueue_scan`
#[derive(Debug, Clone)]
pub struct QueuedScan {
    pub scan_id: i64,
    pub job_id: i64,
    pub url: String,
    pub domain: String,
}

/// Creates a PENDING scan for `target` and queues its job
///
/// # Arguments
///
/// * `store` - The backing store
/// * `target` - URL or bare hostname to scan
/// * `is_batch` - True for batch-feed scans, false for user-initiated ones
pub fn enqueue_scan<S>(store: &mut S, target: &str, is_batch: bool) -> Result<QueuedScan, SentinelError>
where
    S: ScanStore + JobQueue + ?Sized,
{
    let (url, domain) = parse_target(target)?;
    let scan_id = store.create_scan(url.as_str(), &domain, is_batch)?;
    let job_id = store.enqueue(&JobPayload {
        scan_id,
        url: url.to_string(),
        is_batch,
    })?;

    tracing::info!(scan_id, job_id, %domain, is_batch, "Queued scan");

    Ok(QueuedScan {
        scan_id,
        job_id,
        url: url.to_string(),
        domain,
    })
}
