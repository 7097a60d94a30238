use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aggregation::jobs::{generate_jobs, AggregationJob};
use crate::error::AggregationError;
use crate::services::{HeartbeatStore, SummaryStore, UserDirectory};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub users: usize,
    /// Users with neither a summary nor a heartbeat.
    pub inactive_users: usize,
    pub jobs_enqueued: usize,
    pub cancelled: bool,
}

enum Enqueue {
    Sent,
    Cancelled,
}

/// One catch-up pass over all users.
pub struct Trigger<Tz: TimeZone> {
    users: Arc<dyn UserDirectory>,
    summaries: Arc<dyn SummaryStore>,
    heartbeats: Arc<dyn HeartbeatStore>,
    tz: Tz,
}

impl<Tz> Trigger<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    pub fn new(
        users: Arc<dyn UserDirectory>,
        summaries: Arc<dyn SummaryStore>,
        heartbeats: Arc<dyn HeartbeatStore>,
        tz: Tz,
    ) -> Self {
        Self {
            users,
            summaries,
            heartbeats,
            tz,
        }
    }

    pub fn tz(&self) -> &Tz {
        &self.tz
    }

    /// Push every job needed to bring each user up to the start of the day
    /// containing `now`.
    ///
    /// Blocks while the queue is full. Any read failure aborts the pass before
    /// anything is enqueued. Cancellation stops enqueueing; jobs already queued
    /// stay queued.
    pub async fn run(
        &self,
        jobs: &mpsc::Sender<AggregationJob>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassReport, AggregationError> {
        tracing::info!("Generating summaries");

        let users = self.users.get_all_users().await?;
        let coverage = self.summaries.latest_coverage_per_user().await?;

        let missing: Vec<String> = users
            .iter()
            .filter(|id| !coverage.contains_key(*id))
            .cloned()
            .collect();

        let first_heartbeats = if missing.is_empty() {
            Default::default()
        } else {
            self.heartbeats.first_heartbeat_times(&missing).await?
        };

        let mut report = PassReport {
            users: users.len(),
            inactive_users: missing
                .iter()
                .filter(|id| !first_heartbeats.contains_key(*id))
                .count(),
            ..PassReport::default()
        };

        let mut covered: Vec<_> = coverage.into_iter().collect();
        covered.sort();
        let frontiers = covered.into_iter().chain(
            missing
                .into_iter()
                .filter_map(|id| first_heartbeats.get(&id).map(|first| (id, *first))),
        );

        for (user_id, frontier) in frontiers {
            for job in generate_jobs(&user_id, frontier, now, &self.tz) {
                match self.enqueue(jobs, job, cancel).await? {
                    Enqueue::Sent => report.jobs_enqueued += 1,
                    Enqueue::Cancelled => {
                        tracing::info!(
                            jobs = report.jobs_enqueued,
                            "Summary generation cancelled, remaining jobs not enqueued"
                        );
                        report.cancelled = true;
                        return Ok(report);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn enqueue(
        &self,
        jobs: &mpsc::Sender<AggregationJob>,
        job: AggregationJob,
        cancel: &CancellationToken,
    ) -> Result<Enqueue, AggregationError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Enqueue::Cancelled),
            sent = jobs.send(job) => match sent {
                Ok(()) => Ok(Enqueue::Sent),
                Err(_) => Err(AggregationError::unavailable("job queue", "closed")),
            },
        }
    }
}
