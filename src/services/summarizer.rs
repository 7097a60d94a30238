use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::constants::UNKNOWN_KEY;
use crate::error::AggregationError;
use crate::services::SummaryComputer;
use crate::store::operations::heartbeats::Heartbeat;
use crate::store::operations::summaries::{Summary, SummaryItem};
use crate::store::Store;

/// Default computation: credits the time between consecutive heartbeats, capped at
/// `heartbeat_timeout`, to each heartbeat's project, language, editor, OS and machine.
#[derive(Debug, Clone)]
pub struct HeartbeatSummarizer {
    store: Arc<Store>,
    heartbeat_timeout: Duration,
}

impl HeartbeatSummarizer {
    pub fn new(store: Arc<Store>, heartbeat_timeout: Duration) -> Self {
        Self {
            store,
            heartbeat_timeout,
        }
    }
}

#[async_trait]
impl SummaryComputer for HeartbeatSummarizer {
    async fn compute(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        allow_overwrite: bool,
    ) -> Result<Summary, AggregationError> {
        let store = Arc::clone(&self.store);
        let timeout = self.heartbeat_timeout;
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Summary, AggregationError> {
            if !allow_overwrite {
                if let Some(existing) = store.get_summary(&user_id, from, to)? {
                    return Ok(existing);
                }
            }
            let heartbeats = store.heartbeats_in_range(&user_id, from, to)?;
            Ok(summarize(&user_id, from, to, &heartbeats, timeout))
        })
        .await?
    }
}

#[derive(Default)]
struct Totals {
    projects: HashMap<String, i64>,
    languages: HashMap<String, i64>,
    editors: HashMap<String, i64>,
    operating_systems: HashMap<String, i64>,
    machines: HashMap<String, i64>,
}

impl Totals {
    fn credit(&mut self, heartbeat: &Heartbeat, millis: i64) {
        for (bucket, key) in [
            (&mut self.projects, &heartbeat.project),
            (&mut self.languages, &heartbeat.language),
            (&mut self.editors, &heartbeat.editor),
            (&mut self.operating_systems, &heartbeat.operating_system),
            (&mut self.machines, &heartbeat.machine),
        ] {
            let key = if key.trim().is_empty() {
                UNKNOWN_KEY
            } else {
                key.as_str()
            };
            *bucket.entry(key.to_string()).or_default() += millis;
        }
    }
}

fn into_items(totals: HashMap<String, i64>) -> Vec<SummaryItem> {
    let mut items: Vec<SummaryItem> = totals
        .into_iter()
        .map(|(key, millis)| SummaryItem {
            key,
            total_secs: millis / 1000,
        })
        .collect();
    items.sort_by(|a, b| b.total_secs.cmp(&a.total_secs).then_with(|| a.key.cmp(&b.key)));
    items
}

/// Build a summary from `heartbeats`, which must be sorted by time.
pub fn summarize(
    user_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    heartbeats: &[Heartbeat],
    heartbeat_timeout: Duration,
) -> Summary {
    let mut totals = Totals::default();
    for pair in heartbeats.windows(2) {
        let gap = (pair[1].time - pair[0].time)
            .min(heartbeat_timeout)
            .max(Duration::zero());
        totals.credit(&pair[0], gap.num_milliseconds());
    }

    let mut summary = Summary::empty(user_id, from, to);
    summary.projects = into_items(totals.projects);
    summary.languages = into_items(totals.languages);
    summary.editors = into_items(totals.editors);
    summary.operating_systems = into_items(totals.operating_systems);
    summary.machines = into_items(totals.machines);
    summary
}
