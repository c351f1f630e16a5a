//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the scan store, the job
//! queue, and the instance lease.

use crate::state::{ScanStatus, ScanType, WorkerType};
use crate::storage::schema::{initialize_schema, schema_version, SCHEMA_VERSION};
use crate::storage::traits::{InstanceLease, JobQueue, ScanStore, StorageError, StorageResult};
use crate::storage::{
    format_timestamp, now_timestamp, JobPayload, JobRecord, JobStatus, LeaseRecord, ScanRecord,
    ScanUpdate, ScorecardRecord,
};
use crate::SentinelError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const SCAN_COLUMNS: &str = "id, target_url, domain, status, scan_type, worker_type, is_batch, \
     fell_back, worker_id, error_message, risk_score, risk_level, grade, has_ai, report_json, \
     metadata_json, created_at, started_at, completed_at";

const JOB_COLUMNS: &str =
    "id, scan_id, target_url, is_batch, status, attempts, error, created_at, started_at, completed_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SentinelError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SentinelError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Writers from another process wait instead of failing immediately
        conn.busy_timeout(Duration::from_secs(5))?;

        let found = schema_version(&conn)?;
        if found > SCHEMA_VERSION {
            return Err(SentinelError::Invariant(format!(
                "database schema version {} is newer than supported version {}",
                found, SCHEMA_VERSION
            )));
        }
        initialize_schema(&conn)?;
        tracing::debug!(path = %path.display(), version = SCHEMA_VERSION, "Database ready");

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SentinelError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn scan_status(&self, scan_id: i64) -> StorageResult<ScanStatus> {
        let raw: String = self
            .conn
            .query_row(
                "SELECT status FROM scans WHERE id = ?1",
                params![scan_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::ScanNotFound(scan_id))?;

        ScanStatus::from_db_string(&raw).ok_or(StorageError::CorruptValue {
            column: "scans.status",
            value: raw,
        })
    }
}

/// Converts a text column through `parse`, reporting unknown values as conversion failures
fn parse_column<T>(
    row: &Row<'_>,
    idx: usize,
    column: &'static str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let value: String = row.get(idx)?;
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(StorageError::CorruptValue { column, value }),
        )
    })
}

fn parse_optional_column<T>(
    row: &Row<'_>,
    idx: usize,
    column: &'static str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<Option<T>> {
    let value: Option<String> = row.get(idx)?;
    match value {
        None => Ok(None),
        Some(value) => parse(&value).map(Some).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                Box::new(StorageError::CorruptValue { column, value }),
            )
        }),
    }
}

fn row_to_scan(row: &Row<'_>) -> rusqlite::Result<ScanRecord> {
    Ok(ScanRecord {
        id: row.get(0)?,
        target_url: row.get(1)?,
        domain: row.get(2)?,
        status: parse_column(row, 3, "scans.status", ScanStatus::from_db_string)?,
        scan_type: parse_optional_column(row, 4, "scans.scan_type", ScanType::from_db_string)?,
        worker_type: parse_optional_column(
            row,
            5,
            "scans.worker_type",
            WorkerType::from_db_string,
        )?,
        is_batch: row.get(6)?,
        fell_back: row.get(7)?,
        worker_id: row.get(8)?,
        error_message: row.get(9)?,
        risk_score: row.get(10)?,
        risk_level: row.get(11)?,
        grade: row.get(12)?,
        has_ai: row.get(13)?,
        report_json: row.get(14)?,
        metadata_json: row.get(15)?,
        created_at: row.get(16)?,
        started_at: row.get(17)?,
        completed_at: row.get(18)?,
    })
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        scan_id: row.get(1)?,
        target_url: row.get(2)?,
        is_batch: row.get(3)?,
        status: parse_column(row, 4, "jobs.status", JobStatus::from_db_string)?,
        attempts: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

impl ScanStore for SqliteStorage {
    // ===== Scan Lifecycle =====

    fn create_scan(
        &mut self,
        target_url: &str,
        domain: &str,
        is_batch: bool,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO scans (target_url, domain, status, is_batch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                target_url,
                domain,
                ScanStatus::Pending.to_db_string(),
                is_batch,
                now_timestamp()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_scan(&self, scan_id: i64) -> StorageResult<ScanRecord> {
        let sql = format!("SELECT {} FROM scans WHERE id = ?1", SCAN_COLUMNS);
        self.conn
            .query_row(&sql, params![scan_id], row_to_scan)
            .optional()?
            .ok_or(StorageError::ScanNotFound(scan_id))
    }

    fn transition_scan(
        &mut self,
        scan_id: i64,
        to: ScanStatus,
        update: &ScanUpdate,
    ) -> StorageResult<()> {
        let from = self.scan_status(scan_id)?;
        if !from.can_transition_to(to) {
            return Err(StorageError::InvalidTransition {
                id: scan_id,
                from,
                to,
            });
        }

        let now = now_timestamp();
        let changed = match to {
            ScanStatus::Scanning => self.conn.execute(
                "UPDATE scans SET status = ?1, started_at = ?2, worker_id = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    to.to_db_string(),
                    now,
                    update.worker_id,
                    scan_id,
                    from.to_db_string()
                ],
            )?,
            ScanStatus::Completed => self.conn.execute(
                "UPDATE scans SET status = ?1, completed_at = ?2, worker_id = NULL,
                     error_message = NULL,
                     risk_score = COALESCE(?3, risk_score),
                     risk_level = COALESCE(?4, risk_level),
                     grade = COALESCE(?5, grade),
                     has_ai = COALESCE(?6, has_ai),
                     report_json = COALESCE(?7, report_json),
                     metadata_json = COALESCE(?8, metadata_json)
                 WHERE id = ?9 AND status = ?10",
                params![
                    to.to_db_string(),
                    now,
                    update.risk_score,
                    update.risk_level,
                    update.grade,
                    update.has_ai,
                    update.report_json,
                    update.metadata_json,
                    scan_id,
                    from.to_db_string()
                ],
            )?,
            ScanStatus::Failed => self.conn.execute(
                "UPDATE scans SET status = ?1, completed_at = ?2, worker_id = NULL,
                     error_message = ?3,
                     metadata_json = COALESCE(?4, metadata_json)
                 WHERE id = ?5 AND status = ?6",
                params![
                    to.to_db_string(),
                    now,
                    update.error_message.as_deref().unwrap_or("Unknown error"),
                    update.metadata_json,
                    scan_id,
                    from.to_db_string()
                ],
            )?,
            ScanStatus::Pending => 0,
        };

        if changed == 0 {
            // Someone else moved the scan between the read and the write
            let actual = self.scan_status(scan_id)?;
            return Err(StorageError::InvalidTransition {
                id: scan_id,
                from: actual,
                to,
            });
        }

        Ok(())
    }

    fn update_scan_strategy(
        &mut self,
        scan_id: i64,
        scan_type: ScanType,
        fell_back: bool,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE scans SET scan_type = ?1, worker_type = ?2, fell_back = (fell_back OR ?3)
             WHERE id = ?4",
            params![
                scan_type.to_db_string(),
                scan_type.worker_type().to_db_string(),
                fell_back,
                scan_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::ScanNotFound(scan_id));
        }
        Ok(())
    }

    fn save_report(&mut self, scan_id: i64, report_json: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE scans SET report_json = ?1 WHERE id = ?2 AND status = ?3",
            params![report_json, scan_id, ScanStatus::Completed.to_db_string()],
        )?;

        if changed == 0 {
            return Err(StorageError::ScanNotFound(scan_id));
        }
        Ok(())
    }

    fn fail_abandoned_scans(&mut self, reason: &str) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE scans SET status = ?1, completed_at = ?2, worker_id = NULL, error_message = ?3
             WHERE status = ?4
                OR (status = ?5 AND id IN (SELECT scan_id FROM jobs WHERE status IN (?6, ?7)))",
            params![
                ScanStatus::Failed.to_db_string(),
                now_timestamp(),
                reason,
                ScanStatus::Scanning.to_db_string(),
                ScanStatus::Pending.to_db_string(),
                JobStatus::Processing.to_db_string(),
                JobStatus::Failed.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    // ===== Scorecards =====

    fn upsert_scorecard(&mut self, scorecard: &ScorecardRecord) -> StorageResult<()> {
        let signals_json = serde_json::to_string(&scorecard.signals)?;
        self.conn.execute(
            "INSERT INTO scorecards (scan_id, domain, has_ai, confidence, signals_json, ai_score, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(scan_id) DO UPDATE SET
                 domain = excluded.domain,
                 has_ai = excluded.has_ai,
                 confidence = excluded.confidence,
                 signals_json = excluded.signals_json,
                 ai_score = excluded.ai_score,
                 updated_at = excluded.updated_at",
            params![
                scorecard.scan_id,
                scorecard.domain,
                scorecard.has_ai,
                scorecard.confidence,
                signals_json,
                scorecard.ai_score,
                scorecard.updated_at
            ],
        )?;
        Ok(())
    }

    fn get_scorecard(&self, scan_id: i64) -> StorageResult<Option<ScorecardRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT scan_id, domain, has_ai, confidence, signals_json, ai_score, updated_at
                 FROM scorecards WHERE scan_id = ?1",
                params![scan_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<u8>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((scan_id, domain, has_ai, confidence, signals_json, ai_score, updated_at)) => {
                Ok(Some(ScorecardRecord {
                    scan_id,
                    domain,
                    has_ai,
                    confidence,
                    signals: serde_json::from_str(&signals_json)?,
                    ai_score,
                    updated_at,
                }))
            }
        }
    }

    // ===== Queries =====

    fn count_scans_by_status(&self, status: ScanStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM scans WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn domains_with_fast_fallback(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT domain FROM scans WHERE fell_back = 1 ORDER BY domain")?;
        let domains = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(domains)
    }
}

impl JobQueue for SqliteStorage {
    fn enqueue(&mut self, payload: &JobPayload) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO jobs (scan_id, target_url, is_batch, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                payload.scan_id,
                payload.url,
                payload.is_batch,
                JobStatus::Pending.to_db_string(),
                now_timestamp()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn dequeue_next(&mut self) -> StorageResult<Option<JobRecord>> {
        // A single statement, so the select and the claim cannot interleave with
        // another connection's claim.
        let sql = format!(
            "UPDATE jobs SET status = ?1, started_at = ?2, attempts = attempts + 1
             WHERE id = (
                 SELECT id FROM jobs WHERE status = ?3 ORDER BY created_at, id LIMIT 1
             ) AND status = ?3
             RETURNING {}",
            JOB_COLUMNS
        );

        let job = self
            .conn
            .query_row(
                &sql,
                params![
                    JobStatus::Processing.to_db_string(),
                    now_timestamp(),
                    JobStatus::Pending.to_db_string()
                ],
                row_to_job,
            )
            .optional()?;

        Ok(job)
    }

    fn mark_complete(&mut self, job_id: i64) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, completed_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                JobStatus::Completed.to_db_string(),
                now_timestamp(),
                job_id,
                JobStatus::Processing.to_db_string()
            ],
        )?;

        if changed == 0 {
            self.get_job(job_id)?;
            return Err(StorageError::JobState {
                id: job_id,
                action: "completion",
            });
        }
        Ok(())
    }

    fn mark_failed(&mut self, job_id: i64, reason: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, error = ?2, completed_at = ?3
             WHERE id = ?4 AND status IN (?5, ?6)",
            params![
                JobStatus::Failed.to_db_string(),
                reason,
                now_timestamp(),
                job_id,
                JobStatus::Pending.to_db_string(),
                JobStatus::Processing.to_db_string()
            ],
        )?;

        if changed == 0 {
            self.get_job(job_id)?;
            return Err(StorageError::JobState {
                id: job_id,
                action: "failure",
            });
        }
        Ok(())
    }

    fn get_job(&self, job_id: i64) -> StorageResult<JobRecord> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        self.conn
            .query_row(&sql, params![job_id], row_to_job)
            .optional()?
            .ok_or(StorageError::JobNotFound(job_id))
    }

    fn count_jobs_by_status(
        &self,
        status: JobStatus,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<u64> {
        let count: i64 = match since {
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?1",
                params![status.to_db_string()],
                |row| row.get(0),
            )?,
            Some(since) => self.conn.query_row(
                "SELECT COUNT(*) FROM jobs
                 WHERE status = ?1 AND COALESCE(completed_at, started_at, created_at) >= ?2",
                params![status.to_db_string(), format_timestamp(since)],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn fail_abandoned_jobs(&mut self, reason: &str) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, error = ?2, completed_at = ?3 WHERE status = ?4",
            params![
                JobStatus::Failed.to_db_string(),
                reason,
                now_timestamp(),
                JobStatus::Processing.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    fn cleanup(&mut self, older_than_days: u32) -> StorageResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        let deleted = self.conn.execute(
            "DELETE FROM jobs WHERE status IN (?1, ?2) AND completed_at < ?3",
            params![
                JobStatus::Completed.to_db_string(),
                JobStatus::Failed.to_db_string(),
                format_timestamp(cutoff)
            ],
        )?;
        Ok(deleted)
    }
}

impl InstanceLease for SqliteStorage {
    fn try_acquire_lease(
        &mut self,
        name: &str,
        holder: &str,
        stale_after: Duration,
    ) -> StorageResult<bool> {
        let now = Utc::now();
        let stale = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::zero());
        let stale_before = format_timestamp(now - stale);

        // The conflict branch only fires for a dead holder, so a live lease
        // leaves zero rows changed.
        let changed = self.conn.execute(
            "INSERT INTO instance_leases (name, holder, acquired_at, heartbeat_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 holder = excluded.holder,
                 acquired_at = excluded.acquired_at,
                 heartbeat_at = excluded.heartbeat_at
             WHERE instance_leases.heartbeat_at < ?4",
            params![name, holder, format_timestamp(now), stale_before],
        )?;

        Ok(changed == 1)
    }

    fn renew_lease(&mut self, name: &str, holder: &str) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE instance_leases SET heartbeat_at = ?1 WHERE name = ?2 AND holder = ?3",
            params![now_timestamp(), name, holder],
        )?;
        Ok(changed == 1)
    }

    fn release_lease(&mut self, name: &str, holder: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM instance_leases WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(())
    }

    fn lease_holder(&self, name: &str) -> StorageResult<Option<LeaseRecord>> {
        let lease = self
            .conn
            .query_row(
                "SELECT name, holder, acquired_at, heartbeat_at FROM instance_leases WHERE name = ?1",
                params![name],
                |row| {
                    Ok(LeaseRecord {
                        name: row.get(0)?,
                        holder: row.get(1)?,
                        acquired_at: row.get(2)?,
                        heartbeat_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_with_scan() -> (SqliteStorage, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let scan_id = storage
            .create_scan("https://example.com/", "example.com", false)
            .unwrap();
        (storage, scan_id)
    }

    fn queue_job(storage: &mut SqliteStorage, scan_id: i64) -> i64 {
        storage
            .enqueue(&JobPayload {
                scan_id,
                url: "https://example.com/".to_string(),
                is_batch: false,
            })
            .unwrap()
    }

    #[test]
    fn test_create_and_get_scan() {
        let (storage, scan_id) = storage_with_scan();
        let scan = storage.get_scan(scan_id).unwrap();

        assert_eq!(scan.status, ScanStatus::Pending);
        assert_eq!(scan.domain, "example.com");
        assert!(scan.worker_id.is_none());
        assert!(scan.scan_type.is_none());
        assert!(scan.started_at.is_none());
    }

    #[test]
    fn test_get_missing_scan() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_scan(42),
            Err(StorageError::ScanNotFound(42))
        ));
    }

    #[test]
    fn test_scanning_sets_worker_and_start_time() {
        let (mut storage, scan_id) = storage_with_scan();
        storage
            .transition_scan(scan_id, ScanStatus::Scanning, &ScanUpdate::started_by("w-1"))
            .unwrap();

        let scan = storage.get_scan(scan_id).unwrap();
        assert_eq!(scan.status, ScanStatus::Scanning);
        assert_eq!(scan.worker_id.as_deref(), Some("w-1"));
        assert!(scan.started_at.is_some());
    }

    #[test]
    fn test_completion_clears_worker_identity() {
        let (mut storage, scan_id) = storage_with_scan();
        storage
            .transition_scan(scan_id, ScanStatus::Scanning, &ScanUpdate::started_by("w-1"))
            .unwrap();

        let update = ScanUpdate {
            risk_score: Some(88),
            risk_level: Some("LOW".to_string()),
            grade: Some("B+".to_string()),
            has_ai: Some(true),
            report_json: Some("{}".to_string()),
            ..ScanUpdate::default()
        };
        storage
            .transition_scan(scan_id, ScanStatus::Completed, &update)
            .unwrap();

        let scan = storage.get_scan(scan_id).unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
        assert!(scan.worker_id.is_none());
        assert!(scan.completed_at.is_some());
        assert_eq!(scan.risk_score, Some(88));
        assert_eq!(scan.grade.as_deref(), Some("B+"));
        assert!(scan.has_ai);
    }

    #[test]
    fn test_failure_stores_message_and_clears_worker() {
        let (mut storage, scan_id) = storage_with_scan();
        storage
            .transition_scan(scan_id, ScanStatus::Scanning, &ScanUpdate::started_by("w-1"))
            .unwrap();
        storage
            .transition_scan(
                scan_id,
                ScanStatus::Failed,
                &ScanUpdate::failed("Crawl timeout after 60000ms"),
            )
            .unwrap();

        let scan = storage.get_scan(scan_id).unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
        assert!(scan.worker_id.is_none());
        assert_eq!(
            scan.error_message.as_deref(),
            Some("Crawl timeout after 60000ms")
        );
    }

    #[test]
    fn test_failure_without_message_still_stores_one() {
        let (mut storage, scan_id) = storage_with_scan();
        storage
            .transition_scan(scan_id, ScanStatus::Failed, &ScanUpdate::default())
            .unwrap();

        let scan = storage.get_scan(scan_id).unwrap();
        assert!(scan.error_message.is_some());
    }

    #[test]
    fn test_terminal_scan_rejects_transitions() {
        let (mut storage, scan_id) = storage_with_scan();
        storage
            .transition_scan(scan_id, ScanStatus::Failed, &ScanUpdate::failed("boom"))
            .unwrap();

        let result =
            storage.transition_scan(scan_id, ScanStatus::Scanning, &ScanUpdate::started_by("w"));
        assert!(matches!(
            result,
            Err(StorageError::InvalidTransition {
                from: ScanStatus::Failed,
                to: ScanStatus::Scanning,
                ..
            })
        ));
    }

    #[test]
    fn test_pending_cannot_complete() {
        let (mut storage, scan_id) = storage_with_scan();
        let result = storage.transition_scan(scan_id, ScanStatus::Completed, &ScanUpdate::default());
        assert!(result.is_err());
        assert_eq!(
            storage.get_scan(scan_id).unwrap().status,
            ScanStatus::Pending
        );
    }

    #[test]
    fn test_update_scan_strategy_keeps_fallback_flag() {
        let (mut storage, scan_id) = storage_with_scan();
        storage
            .update_scan_strategy(scan_id, ScanType::Fast, false)
            .unwrap();
        storage
            .update_scan_strategy(scan_id, ScanType::Deep, true)
            .unwrap();

        let scan = storage.get_scan(scan_id).unwrap();
        assert_eq!(scan.scan_type, Some(ScanType::Deep));
        assert_eq!(scan.worker_type, Some(WorkerType::Renderer));
        assert!(scan.fell_back);

        assert_eq!(
            storage.domains_with_fast_fallback().unwrap(),
            vec!["example.com".to_string()]
        );
    }

    #[test]
    fn test_save_report_requires_completed_scan() {
        let (mut storage, scan_id) = storage_with_scan();
        assert!(storage.save_report(scan_id, "{}").is_err());
    }

    #[test]
    fn test_dequeue_claims_oldest_job_once() {
        let (mut storage, scan_id) = storage_with_scan();
        let first = queue_job(&mut storage, scan_id);
        let second = queue_job(&mut storage, scan_id);

        let job = storage.dequeue_next().unwrap().unwrap();
        assert_eq!(job.id, first);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_some());

        let job = storage.dequeue_next().unwrap().unwrap();
        assert_eq!(job.id, second);

        assert!(storage.dequeue_next().unwrap().is_none());
    }

    #[test]
    fn test_dequeue_empty_queue() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.dequeue_next().unwrap().is_none());
    }

    #[test]
    fn test_failed_job_is_never_redelivered() {
        let (mut storage, scan_id) = storage_with_scan();
        let job_id = queue_job(&mut storage, scan_id);

        let job = storage.dequeue_next().unwrap().unwrap();
        storage.mark_failed(job.id, "scan exploded").unwrap();

        assert!(storage.dequeue_next().unwrap().is_none());
        let job = storage.get_job(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("scan exploded"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_mark_complete_requires_processing() {
        let (mut storage, scan_id) = storage_with_scan();
        let job_id = queue_job(&mut storage, scan_id);

        assert!(matches!(
            storage.mark_complete(job_id),
            Err(StorageError::JobState { .. })
        ));

        storage.dequeue_next().unwrap();
        storage.mark_complete(job_id).unwrap();
        assert_eq!(
            storage.get_job(job_id).unwrap().status,
            JobStatus::Completed
        );

        // Terminal jobs stay terminal
        assert!(storage.mark_failed(job_id, "late").is_err());
    }

    #[test]
    fn test_mark_missing_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.mark_complete(7),
            Err(StorageError::JobNotFound(7))
        ));
    }

    #[test]
    fn test_count_jobs_by_status() {
        let (mut storage, scan_id) = storage_with_scan();
        queue_job(&mut storage, scan_id);
        queue_job(&mut storage, scan_id);
        let job = storage.dequeue_next().unwrap().unwrap();
        storage.mark_complete(job.id).unwrap();

        assert_eq!(
            storage.count_jobs_by_status(JobStatus::Pending, None).unwrap(),
            1
        );
        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(
            storage
                .count_jobs_by_status(JobStatus::Completed, Some(hour_ago))
                .unwrap(),
            1
        );
        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(
            storage
                .count_jobs_by_status(JobStatus::Completed, Some(future))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_abandoned_work_is_failed() {
        let (mut storage, scan_id) = storage_with_scan();
        queue_job(&mut storage, scan_id);
        storage.dequeue_next().unwrap();
        storage
            .transition_scan(scan_id, ScanStatus::Scanning, &ScanUpdate::started_by("dead"))
            .unwrap();

        assert_eq!(storage.fail_abandoned_jobs("worker died").unwrap(), 1);
        assert_eq!(storage.fail_abandoned_scans("worker died").unwrap(), 1);

        let scan = storage.get_scan(scan_id).unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
        assert!(scan.worker_id.is_none());
        assert_eq!(
            storage.count_jobs_by_status(JobStatus::Failed, None).unwrap(),
            1
        );
    }

    #[test]
    fn test_dequeued_but_unstarted_scan_is_failed() {
        let (mut storage, scan_id) = storage_with_scan();
        queue_job(&mut storage, scan_id);
        storage.dequeue_next().unwrap();

        // A scan that is still queued is left alone
        let waiting = storage
            .create_scan("https://waiting.example.com/", "waiting.example.com", false)
            .unwrap();
        queue_job(&mut storage, waiting);

        assert_eq!(storage.fail_abandoned_jobs("worker died").unwrap(), 1);
        assert_eq!(storage.fail_abandoned_scans("worker died").unwrap(), 1);

        let scan = storage.get_scan(scan_id).unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
        assert_eq!(scan.error_message.as_deref(), Some("worker died"));
        assert!(scan.completed_at.is_some());

        assert_eq!(storage.get_scan(waiting).unwrap().status, ScanStatus::Pending);
        assert_eq!(
            storage.count_jobs_by_status(JobStatus::Pending, None).unwrap(),
            1
        );
    }

    #[test]
    fn test_cleanup_keeps_recent_jobs() {
        let (mut storage, scan_id) = storage_with_scan();
        queue_job(&mut storage, scan_id);
        let job = storage.dequeue_next().unwrap().unwrap();
        storage.mark_complete(job.id).unwrap();

        assert_eq!(storage.cleanup(7).unwrap(), 0);
        // Zero days means anything finished before now
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(storage.cleanup(0).unwrap(), 1);
    }

    #[test]
    fn test_scorecard_upsert_replaces() {
        let (mut storage, scan_id) = storage_with_scan();
        let mut card = ScorecardRecord {
            scan_id,
            domain: "example.com".to_string(),
            has_ai: true,
            confidence: "low".to_string(),
            signals: vec!["AI UI elements detected".to_string()],
            ai_score: None,
            updated_at: now_timestamp(),
        };
        storage.upsert_scorecard(&card).unwrap();

        card.confidence = "high".to_string();
        card.ai_score = Some(70);
        storage.upsert_scorecard(&card).unwrap();

        let loaded = storage.get_scorecard(scan_id).unwrap().unwrap();
        assert_eq!(loaded, card);
    }

    #[test]
    fn test_lease_is_exclusive_while_live() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let stale = Duration::from_secs(300);

        assert!(storage.try_acquire_lease("worker", "a", stale).unwrap());
        assert!(!storage.try_acquire_lease("worker", "b", stale).unwrap());
        assert_eq!(
            storage.lease_holder("worker").unwrap().unwrap().holder,
            "a"
        );

        assert!(storage.renew_lease("worker", "a").unwrap());
        assert!(!storage.renew_lease("worker", "b").unwrap());
    }

    #[test]
    fn test_stale_lease_can_be_taken_over() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert!(storage
            .try_acquire_lease("worker", "a", Duration::from_secs(300))
            .unwrap());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(storage
            .try_acquire_lease("worker", "b", Duration::from_millis(1))
            .unwrap());

        assert_eq!(
            storage.lease_holder("worker").unwrap().unwrap().holder,
            "b"
        );
        // The previous holder has lost it
        assert!(!storage.renew_lease("worker", "a").unwrap());
    }

    #[test]
    fn test_release_lease_only_by_holder() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let stale = Duration::from_secs(300);
        storage.try_acquire_lease("worker", "a", stale).unwrap();

        storage.release_lease("worker", "b").unwrap();
        assert!(storage.lease_holder("worker").unwrap().is_some());

        storage.release_lease("worker", "a").unwrap();
        assert!(storage.lease_holder("worker").unwrap().is_none());
        assert!(storage.try_acquire_lease("worker", "b", stale).unwrap());
    }
}
