//! Capabilities the aggregation core consumes: user directory, heartbeat store,
//! summary store and summary computation.

pub mod store_backend;
pub mod summarizer;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AggregationError;
use crate::store::operations::summaries::Summary;

pub use store_backend::StoreBackend;
pub use summarizer::HeartbeatSummarizer;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_all_users(&self) -> Result<Vec<String>, AggregationError>;
}

#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Earliest heartbeat per user, restricted to `user_ids`. Users without any
    /// heartbeat are absent from the result.
    async fn first_heartbeat_times(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, AggregationError>;
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// End of the most recent summary per user. Absent means "no summary yet".
    async fn latest_coverage_per_user(
        &self,
    ) -> Result<HashMap<String, DateTime<Utc>>, AggregationError>;

    /// Idempotent on `(user_id, from, to)`.
    async fn insert(&self, summary: Summary) -> Result<(), AggregationError>;
}

#[async_trait]
pub trait SummaryComputer: Send + Sync {
    async fn compute(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        allow_overwrite: bool,
    ) -> Result<Summary, AggregationError>;
}
