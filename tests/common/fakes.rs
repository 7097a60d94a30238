use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use activity_aggregator::error::AggregationError;
use activity_aggregator::services::{HeartbeatStore, SummaryComputer, SummaryStore, UserDirectory};
use activity_aggregator::store::operations::summaries::Summary;

pub type Window = (String, DateTime<Utc>, DateTime<Utc>);

#[derive(Default)]
pub struct MemoryDirectory {
    pub users: Vec<String>,
    pub fail: AtomicBool,
}

impl MemoryDirectory {
    pub fn with_users(users: &[&str]) -> Self {
        Self {
            users: users.iter().map(|u| u.to_string()).collect(),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn get_all_users(&self) -> Result<Vec<String>, AggregationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AggregationError::unavailable("user directory", "offline"));
        }
        Ok(self.users.clone())
    }
}

#[derive(Default)]
pub struct MemoryHeartbeats {
    pub firsts: HashMap<String, DateTime<Utc>>,
    pub requested: Mutex<Vec<Vec<String>>>,
    pub fail: AtomicBool,
}

impl MemoryHeartbeats {
    pub fn with_firsts(firsts: &[(&str, DateTime<Utc>)]) -> Self {
        Self {
            firsts: firsts.iter().map(|(u, t)| (u.to_string(), *t)).collect(),
            requested: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl HeartbeatStore for MemoryHeartbeats {
    async fn first_heartbeat_times(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, AggregationError> {
        self.requested.lock().unwrap().push(user_ids.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(AggregationError::unavailable("heartbeat store", "offline"));
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| self.firsts.get(id).map(|t| (id.clone(), *t)))
            .collect())
    }
}

/// Summary store keyed by window, recording every insert attempt.
#[derive(Default)]
pub struct MemorySummaryStore {
    pub summaries: Mutex<HashMap<Window, Summary>>,
    pub attempts: Mutex<Vec<Window>>,
    pub failing_users: HashSet<String>,
    pub fail_reads: AtomicBool,
    pub insert_delay: Duration,
}

impl MemorySummaryStore {
    pub fn failing_for(users: &[&str]) -> Self {
        Self {
            failing_users: users.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn slow_inserts(delay: Duration) -> Self {
        Self {
            insert_delay: delay,
            ..Self::default()
        }
    }

    pub fn seed(&self, user_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) {
        self.summaries.lock().unwrap().insert(
            (user_id.to_string(), from, to),
            Summary::empty(user_id, from, to),
        );
    }

    pub fn attempts(&self) -> Vec<Window> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn stored(&self) -> usize {
        self.summaries.lock().unwrap().len()
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn latest_coverage_per_user(
        &self,
    ) -> Result<HashMap<String, DateTime<Utc>>, AggregationError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AggregationError::unavailable("summary store", "offline"));
        }
        let mut coverage: HashMap<String, DateTime<Utc>> = HashMap::new();
        for (user_id, _, to) in self.summaries.lock().unwrap().keys() {
            let entry = coverage.entry(user_id.clone()).or_insert(*to);
            if *to > *entry {
                *entry = *to;
            }
        }
        Ok(coverage)
    }

    async fn insert(&self, summary: Summary) -> Result<(), AggregationError> {
        let window = (summary.user_id.clone(), summary.from, summary.to);
        self.attempts.lock().unwrap().push(window.clone());
        if !self.insert_delay.is_zero() {
            tokio::time::sleep(self.insert_delay).await;
        }
        if self.failing_users.contains(&summary.user_id) {
            return Err(AggregationError::unavailable("summary store", "write rejected"));
        }
        self.summaries.lock().unwrap().insert(window, summary);
        Ok(())
    }
}

/// Produces empty summaries, optionally slowly or failing for some users.
#[derive(Default)]
pub struct FakeComputer {
    pub delay: Duration,
    pub failing_users: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FakeComputer {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing_for(users: &[&str]) -> Self {
        Self {
            failing_users: users.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SummaryComputer for FakeComputer {
    async fn compute(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        allow_overwrite: bool,
    ) -> Result<Summary, AggregationError> {
        assert!(allow_overwrite, "pipeline always recomputes");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_users.contains(user_id) {
            return Err(AggregationError::unavailable("computation", "bad heartbeats"));
        }
        Ok(Summary::empty(user_id, from, to))
    }
}
