use thiserror::Error;
use tokio::task::JoinError;
use tokio_cron_scheduler::JobSchedulerError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("{capability} unavailable: {message}")]
    Unavailable {
        capability: &'static str,
        message: String,
    },
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
    #[error("invalid aggregation time '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
    #[error("blocking task failed: {0}")]
    Task(#[from] JoinError),
}

impl AggregationError {
    pub fn unavailable(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            capability,
            message: message.into(),
        }
    }
}
