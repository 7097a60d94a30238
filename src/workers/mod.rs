pub mod pipeline;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{NaiveTime, TimeZone, Timelike, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::aggregation::{AggregationJob, Trigger};
use crate::config::AggregationConfig;
use crate::error::AggregationError;
use crate::services::{SummaryComputer, SummaryStore};

pub use pipeline::{Pipeline, PipelineConfig, PipelineStats};

/// Wall-clock time of the daily pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTime {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTime {
    /// Parse `HH:MM` (24-hour clock).
    pub fn parse(raw: &str) -> Result<Self, AggregationError> {
        let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map_err(|_| AggregationError::InvalidTime(raw.to_string()))?;
        Ok(Self {
            hour: time.hour(),
            minute: time.minute(),
        })
    }

    /// Six-field cron expression (`sec min hour dom mon dow`) firing once a day.
    pub fn cron(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }
}

/// Why a pass was started; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Startup,
    Scheduled,
}

impl PassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Scheduled => "scheduled",
        }
    }
}

/// Resets the single-flight flag even if the pass panics.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts Trigger passes, at most one at a time, against the pipeline's job queue.
struct PassRunner<Tz: TimeZone> {
    trigger: Arc<Trigger<Tz>>,
    queue: Mutex<Option<mpsc::Sender<AggregationJob>>>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl<Tz> PassRunner<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    fn new(trigger: Arc<Trigger<Tz>>, jobs: mpsc::Sender<AggregationJob>) -> Self {
        Self {
            trigger,
            queue: Mutex::new(Some(jobs)),
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawn a pass unless one is already running or the queue has been closed.
    fn launch(self: &Arc<Self>, kind: PassKind) -> Option<JoinHandle<()>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                pass = kind.as_str(),
                "Skipping summary generation: previous pass still in progress"
            );
            return None;
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let jobs = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(jobs) = jobs else {
            tracing::debug!(pass = kind.as_str(), "Job queue closed, not starting pass");
            return None;
        };

        let runner = Arc::clone(self);
        Some(self.tracker.spawn(async move {
            let _guard = guard;
            let started = Instant::now();
            match runner.trigger.run(&jobs, Utc::now(), &runner.cancel).await {
                Ok(report) => tracing::info!(
                    pass = kind.as_str(),
                    users = report.users,
                    inactive_users = report.inactive_users,
                    jobs = report.jobs_enqueued,
                    cancelled = report.cancelled,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Summary generation pass finished"
                ),
                Err(e) => tracing::error!(
                    pass = kind.as_str(),
                    error = %e,
                    "Summary generation pass failed"
                ),
            }
        }))
    }

    /// Stop enqueueing, release the job queue and wait for in-flight passes.
    async fn close(&self) {
        self.cancel.cancel();
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Keeps every user's summaries caught up to yesterday: one pass at startup,
/// then one per day at the configured time.
pub struct AggregationScheduler<Tz: TimeZone> {
    trigger: Arc<Trigger<Tz>>,
    computer: Arc<dyn SummaryComputer>,
    summary_store: Arc<dyn SummaryStore>,
    shutdown_rx: broadcast::Receiver<()>,
    config: AggregationConfig,
}

impl<Tz> AggregationScheduler<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    pub fn new(
        trigger: Trigger<Tz>,
        computer: Arc<dyn SummaryComputer>,
        summary_store: Arc<dyn SummaryStore>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &AggregationConfig,
    ) -> Self {
        Self {
            trigger: Arc::new(trigger),
            computer,
            summary_store,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Run until the shutdown broadcast, then drain. Errors only on startup failures.
    pub async fn start(mut self) -> Result<PipelineStats, AggregationError> {
        if !self.config.enabled {
            tracing::info!("Aggregation disabled; skipping scheduler startup");
            return Ok(PipelineStats::default());
        }

        let daily = DailyTime::parse(&self.config.time)?;
        let mut scheduler = JobScheduler::new().await?;

        let pipeline = Pipeline::start(
            Arc::clone(&self.computer),
            Arc::clone(&self.summary_store),
            &PipelineConfig::from(&self.config),
        );
        let runner = Arc::new(PassRunner::new(Arc::clone(&self.trigger), pipeline.sender()));

        if let Err(e) = register_daily_pass(&scheduler, &daily.cron(), &runner).await {
            runner.close().await;
            pipeline.shutdown().await;
            return Err(e);
        }
        if let Err(e) = scheduler.start().await {
            runner.close().await;
            pipeline.shutdown().await;
            return Err(e.into());
        }

        // 启动时立即补齐停机期间的缺口
        runner.launch(PassKind::Startup);

        tracing::info!(
            time = %self.config.time,
            cron = %daily.cron(),
            compute_workers = self.config.compute_workers,
            persist_workers = self.config.persist_workers,
            "Aggregation scheduler started"
        );
        let _ = self.shutdown_rx.recv().await;

        tracing::info!("Aggregation scheduler shutting down");
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Failed to stop cron scheduler cleanly");
        }
        runner.close().await;
        let stats = pipeline.shutdown().await;

        tracing::info!(
            computed = stats.computed,
            compute_failed = stats.compute_failed,
            persisted = stats.persisted,
            persist_failed = stats.persist_failed,
            "Aggregation pipeline drained"
        );
        Ok(stats)
    }
}

/// Register a recurring pass on `cron`, evaluated in the trigger's time zone.
async fn register_daily_pass<Tz>(
    scheduler: &JobScheduler,
    cron: &str,
    runner: &Arc<PassRunner<Tz>>,
) -> Result<(), AggregationError>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    let tz = runner.trigger.tz().clone();
    let runner = Arc::clone(runner);

    let job = Job::new_async_tz(cron, tz, move |_uuid, _lock| {
        let runner = Arc::clone(&runner);
        Box::pin(async move {
            if let Some(pass) = runner.launch(PassKind::Scheduled) {
                if let Err(e) = pass.await {
                    tracing::error!(error = %e, "Scheduled summary generation pass panicked");
                }
            }
        })
    })?;
    scheduler.add(job).await?;

    tracing::info!(cron = %cron, "Registered daily summary generation");
    Ok(())
}
