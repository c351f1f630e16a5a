//! Single-instance worker loop
//!
//! Holds a named lease in the store for as long as it runs; a second worker
//! against the same database sees the live lease and exits without touching
//! the queue. Jobs are claimed atomically and never re-queued.

use crate::analysis::{builtin_registry, FanOutExecutor};
use crate::config::{Config, WorkerConfig};
use crate::crawler::build_strategy;
use crate::storage::{StorageResult, Store};
use crate::worker::pipeline::ScanPipeline;
use crate::worker::pool::WorkerPool;
use crate::SentinelError;
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lease name guarding the worker loop
pub const LEASE_NAME: &str = "scan-worker";

const ORPHAN_REASON: &str = "Worker stopped before the scan finished";

/// How a call to `WorkerRunner::run` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another live worker holds the lease
    AlreadyRunning { holder: Option<String> },
    /// The loop ran and was shut down
    Stopped { processed: u64, failed: u64 },
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Dequeues jobs and runs them through the scan pipeline
pub struct WorkerRunner<S> {
    store: Arc<Mutex<S>>,
    pipeline: Arc<ScanPipeline<S>>,
    pool: Arc<WorkerPool>,
    config: WorkerConfig,
    worker_id: String,
}

impl<S: Store + 'static> WorkerRunner<S> {
    /// Creates a runner around an existing pipeline
    ///
    /// The runner uses the pipeline's worker identity as its lease holder.
    pub fn new(store: Arc<Mutex<S>>, pipeline: ScanPipeline<S>, config: WorkerConfig) -> Self {
        let worker_id = pipeline.worker_id().to_string();
        Self {
            pool: Arc::new(WorkerPool::new(config.max_workers, config.max_runtime())),
            store,
            pipeline: Arc::new(pipeline),
            config,
            worker_id,
        }
    }

    /// Builds a runner with the built-in crawlers and analyzers
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration
    /// * `store` - Opened store
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerRunner)` - Ready to `run`
    /// * `Err(SentinelError)` - The HTTP client could not be built
    pub fn from_config(config: &Config, store: S) -> Result<Self, SentinelError> {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let strategy = build_strategy(&config.crawler, config.timeouts.crawl())?;
        let executor = FanOutExecutor::new(
            builtin_registry(),
            config.analyzers.clone(),
            config.timeouts.analyzer_batch(),
        );

        let store = Arc::new(Mutex::new(store));
        let pipeline = ScanPipeline::new(
            Arc::clone(&store),
            strategy,
            executor,
            &config.timeouts,
            worker_id,
        );
        Ok(Self::new(store, pipeline, config.worker.clone()))
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut S) -> StorageResult<T>) -> Result<T, SentinelError> {
        with_store(&self.store, f)
    }

    /// Runs the worker loop until `shutdown` is cancelled
    ///
    /// Takes the single-instance lease first and returns
    /// `RunOutcome::AlreadyRunning` if another worker holds it. On shutdown it
    /// stops dequeuing, waits for in-flight scans and releases the lease.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunOutcome, SentinelError> {
        let acquired = self.with_store(|s| {
            s.try_acquire_lease(LEASE_NAME, &self.worker_id, self.config.lease_stale_after())
        })?;
        if !acquired {
            let holder = self
                .with_store(|s| s.lease_holder(LEASE_NAME))?
                .map(|lease| lease.holder);
            warn!(holder = ?holder, "Another worker is already running");
            return Ok(RunOutcome::AlreadyRunning { holder });
        }
        info!(worker_id = %self.worker_id, max_workers = self.pool.max_workers(), "Worker started");

        let result = self.run_loop(&shutdown).await;

        if let Err(e) = self.with_store(|s| s.release_lease(LEASE_NAME, &self.worker_id)) {
            error!(error = %e, "Failed to release worker lease");
        }
        result
    }

    fn recover(&self) -> Result<(), SentinelError> {
        let jobs = self.with_store(|s| s.fail_abandoned_jobs(ORPHAN_REASON))?;
        let scans = self.with_store(|s| s.fail_abandoned_scans(ORPHAN_REASON))?;
        if jobs > 0 || scans > 0 {
            warn!(jobs, scans, "Marked orphaned work from a previous worker as failed");
        }

        let purged = self.with_store(|s| s.cleanup(self.config.cleanup_after_days))?;
        if purged > 0 {
            info!(purged, days = self.config.cleanup_after_days, "Purged old jobs");
        }

        let remembered = self.pipeline.seed_fast_failures()?;
        debug!(domains = remembered, "Loaded domains with previous fast crawl failures");
        Ok(())
    }

    async fn run_loop(&self, shutdown: &CancellationToken) -> Result<RunOutcome, SentinelError> {
        self.recover()?;

        let counters = Arc::new(Counters::default());
        let mut tasks = JoinSet::new();

        while !shutdown.is_cancelled() {
            match self.with_store(|s| s.renew_lease(LEASE_NAME, &self.worker_id)) {
                Ok(true) => {}
                Ok(false) => {
                    error!(worker_id = %self.worker_id, "Worker lease was taken over; stopping");
                    break;
                }
                Err(e) => warn!(error = %e, "Failed to renew worker lease"),
            }

            self.pool.sweep_stale();
            while let Some(Some(_)) = tasks.join_next().now_or_never() {}

            let dispatched = match self.pool.acquire_slot(&self.worker_id) {
                Err(denied) => {
                    debug!(reason = %denied, "No free worker slot");
                    false
                }
                Ok(slot) => match self.with_store(|s| s.dequeue_next()) {
                    Ok(Some(job)) => {
                        info!(job_id = job.id, scan_id = job.scan_id, url = %job.target_url, "Dequeued job");
                        let pipeline = Arc::clone(&self.pipeline);
                        let store = Arc::clone(&self.store);
                        let pool = Arc::clone(&self.pool);
                        let counters = Arc::clone(&counters);

                        tasks.spawn(async move {
                            let job_id = job.id;
                            let scan_id = job.scan_id;
                            let scan = tokio::spawn({
                                let pipeline = Arc::clone(&pipeline);
                                async move { pipeline.process(&job).await }
                            });

                            let outcome = match scan.await {
                                Ok(Ok(_)) => Ok(()),
                                Ok(Err(e)) => {
                                    let message = e.to_string();
                                    pipeline.fail_scan(scan_id, &message);
                                    Err(message)
                                }
                                Err(join_error) => {
                                    let message = if join_error.is_panic() {
                                        "Scan task panicked".to_string()
                                    } else {
                                        "Scan task was cancelled".to_string()
                                    };
                                    pipeline.fail_scan(scan_id, &message);
                                    Err(message)
                                }
                            };

                            let marked = match &outcome {
                                Ok(()) => with_store(&store, |s| s.mark_complete(job_id)),
                                Err(reason) => with_store(&store, |s| s.mark_failed(job_id, reason)),
                            };
                            if let Err(e) = marked {
                                error!(job_id, error = %e, "Failed to record job result");
                            }

                            counters.processed.fetch_add(1, Ordering::Relaxed);
                            if outcome.is_err() {
                                counters.failed.fetch_add(1, Ordering::Relaxed);
                            }

                            pool.release_slot(slot);
                            let status = pool.status();
                            info!(
                                job_id,
                                active = status.active,
                                stale = status.stale,
                                available = status.available,
                                "Worker pool status"
                            );
                        });
                        true
                    }
                    Ok(None) => {
                        self.pool.release_slot(slot);
                        false
                    }
                    Err(e) => {
                        self.pool.release_slot(slot);
                        error!(error = %e, "Failed to dequeue job");
                        false
                    }
                },
            };

            if !dispatched {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight scans");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job bookkeeping task failed");
            }
        }

        let processed = counters.processed.load(Ordering::Relaxed);
        let failed = counters.failed.load(Ordering::Relaxed);
        info!(processed, failed, "Worker stopped");
        Ok(RunOutcome::Stopped { processed, failed })
    }
}

fn with_store<S, T>(
    store: &Mutex<S>,
    f: impl FnOnce(&mut S) -> StorageResult<T>,
) -> Result<T, SentinelError> {
    let mut guard = store.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(f(&mut guard)?)
}
