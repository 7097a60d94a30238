//! Two worker pools joined by bounded queues: compute (job -> summary) and
//! persist (summary -> store). Failures are logged and the item dropped; the
//! next pass regenerates whatever never reached the store.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::aggregation::AggregationJob;
use crate::config::AggregationConfig;
use crate::error::AggregationError;
use crate::services::{SummaryComputer, SummaryStore};
use crate::store::operations::summaries::Summary;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub compute_workers: usize,
    pub persist_workers: usize,
    pub compute_timeout: Duration,
    pub persist_timeout: Duration,
}

impl From<&AggregationConfig> for PipelineConfig {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            compute_workers: config.compute_workers,
            persist_workers: config.persist_workers,
            compute_timeout: config.compute_timeout(),
            persist_timeout: config.persist_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub computed: u64,
    pub compute_failed: u64,
    pub persisted: u64,
    pub persist_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    computed: AtomicU64,
    compute_failed: AtomicU64,
    persisted: AtomicU64,
    persist_failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            computed: self.computed.load(Ordering::Relaxed),
            compute_failed: self.compute_failed.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
        }
    }
}

type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

pub struct Pipeline {
    jobs_tx: mpsc::Sender<AggregationJob>,
    compute_handles: Vec<JoinHandle<()>>,
    persist_handles: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl Pipeline {
    /// Spawn both pools. Each queue holds as many items as its consuming stage has workers.
    pub fn start(
        computer: Arc<dyn SummaryComputer>,
        store: Arc<dyn SummaryStore>,
        config: &PipelineConfig,
    ) -> Self {
        let compute_workers = config.compute_workers.max(1);
        let persist_workers = config.persist_workers.max(1);

        let (jobs_tx, jobs_rx) = mpsc::channel::<AggregationJob>(compute_workers);
        let (summaries_tx, summaries_rx) = mpsc::channel::<Summary>(persist_workers);
        let jobs_rx: SharedReceiver<AggregationJob> = Arc::new(Mutex::new(jobs_rx));
        let summaries_rx: SharedReceiver<Summary> = Arc::new(Mutex::new(summaries_rx));
        let counters = Arc::new(Counters::default());

        let compute_handles = (0..compute_workers)
            .map(|worker| {
                tokio::spawn(compute_worker(
                    worker,
                    Arc::clone(&jobs_rx),
                    summaries_tx.clone(),
                    Arc::clone(&computer),
                    config.compute_timeout,
                    Arc::clone(&counters),
                ))
            })
            .collect();
        // Compute workers now own every summary sender.
        drop(summaries_tx);

        let persist_handles = (0..persist_workers)
            .map(|worker| {
                tokio::spawn(persist_worker(
                    worker,
                    Arc::clone(&summaries_rx),
                    Arc::clone(&store),
                    config.persist_timeout,
                    Arc::clone(&counters),
                ))
            })
            .collect();

        tracing::info!(compute_workers, persist_workers, "Aggregation pipeline started");

        Self {
            jobs_tx,
            compute_handles,
            persist_handles,
            counters,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<AggregationJob> {
        self.jobs_tx.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Close the job queue and wait for both stages to drain.
    ///
    /// Jobs already queued are still computed and persisted. The job queue only
    /// closes once every sender handed out by [`Pipeline::sender`] is dropped too.
    pub async fn shutdown(self) -> PipelineStats {
        let Self {
            jobs_tx,
            compute_handles,
            persist_handles,
            counters,
        } = self;

        drop(jobs_tx);
        log_join_failures("compute", join_all(compute_handles).await);
        tracing::debug!("Compute stage drained");
        log_join_failures("persist", join_all(persist_handles).await);
        tracing::debug!("Persist stage drained");

        counters.snapshot()
    }
}

fn log_join_failures(stage: &'static str, results: Vec<Result<(), tokio::task::JoinError>>) {
    for result in results {
        if let Err(e) = result {
            tracing::error!(stage, error = %e, "Aggregation worker panicked");
        }
    }
}

async fn with_timeout<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, AggregationError>>,
) -> Result<T, AggregationError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AggregationError::Timeout {
            operation,
            secs: limit.as_secs(),
        }),
    }
}

async fn next_item<T>(queue: &SharedReceiver<T>) -> Option<T> {
    queue.lock().await.recv().await
}

async fn compute_worker(
    worker: usize,
    jobs: SharedReceiver<AggregationJob>,
    summaries: mpsc::Sender<Summary>,
    computer: Arc<dyn SummaryComputer>,
    timeout: Duration,
    counters: Arc<Counters>,
) {
    while let Some(job) = next_item(&jobs).await {
        let result = with_timeout(
            "summary computation",
            timeout,
            computer.compute(&job.user_id, job.from, job.to, true),
        )
        .await;

        match result {
            Ok(summary) => {
                counters.computed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    user_id = %job.user_id,
                    from = %job.from,
                    to = %job.to,
                    "Generated summary"
                );
                if summaries.send(summary).await.is_err() {
                    tracing::error!(worker, "Summary queue closed, compute worker exiting");
                    break;
                }
            }
            Err(e) => {
                counters.compute_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    user_id = %job.user_id,
                    from = %job.from,
                    to = %job.to,
                    error = %e,
                    "Failed to generate summary"
                );
            }
        }
    }
    tracing::debug!(worker, "Compute worker stopped");
}

async fn persist_worker(
    worker: usize,
    summaries: SharedReceiver<Summary>,
    store: Arc<dyn SummaryStore>,
    timeout: Duration,
    counters: Arc<Counters>,
) {
    while let Some(summary) = next_item(&summaries).await {
        let user_id = summary.user_id.clone();
        let (from, to) = (summary.from, summary.to);

        match with_timeout("summary insert", timeout, store.insert(summary)).await {
            Ok(()) => {
                counters.persisted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.persist_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    user_id = %user_id,
                    from = %from,
                    to = %to,
                    error = %e,
                    "Failed to save summary"
                );
            }
        }
    }
    tracing::debug!(worker, "Persist worker stopped");
}
