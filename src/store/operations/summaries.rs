use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Credited time for one project / language / editor / OS / machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryItem {
    pub key: String,
    pub total_secs: i64,
}

/// Aggregated activity of one user over `[from, to)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub id: String,
    pub user_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub projects: Vec<SummaryItem>,
    #[serde(default)]
    pub languages: Vec<SummaryItem>,
    #[serde(default)]
    pub editors: Vec<SummaryItem>,
    #[serde(default)]
    pub operating_systems: Vec<SummaryItem>,
    #[serde(default)]
    pub machines: Vec<SummaryItem>,
}

impl Summary {
    pub fn empty(user_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            from,
            to,
            projects: Vec::new(),
            languages: Vec::new(),
            editors: Vec::new(),
            operating_systems: Vec::new(),
            machines: Vec::new(),
        }
    }

    pub fn total_secs(&self) -> i64 {
        self.projects.iter().map(|item| item.total_secs).sum()
    }
}

pub(crate) fn encode_coverage(to_ms: i64) -> [u8; 8] {
    to_ms.to_be_bytes()
}

pub(crate) fn decode_coverage(raw: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = raw.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

fn merge_max(old: Option<&[u8]>, candidate_ms: i64) -> Option<Vec<u8>> {
    let merged = match old.and_then(decode_coverage) {
        Some(current) if current >= candidate_ms => current,
        _ => candidate_ms,
    };
    Some(encode_coverage(merged).to_vec())
}

impl Store {
    /// Insert or replace the summary stored for `(user_id, from, to)` and advance the
    /// user's coverage frontier.
    pub fn upsert_summary(&self, summary: &Summary) -> Result<(), StoreError> {
        if summary.to <= summary.from {
            return Err(StoreError::Validation(format!(
                "summary window is empty: {} >= {}",
                summary.from, summary.to
            )));
        }
        let from_ms = summary.from.timestamp_millis();
        let to_ms = summary.to.timestamp_millis();
        let key = keys::summary_key(&summary.user_id, from_ms, to_ms)?;
        self.summaries
            .insert(key.as_bytes(), Self::serialize(summary)?)?;

        let coverage_key = keys::summary_coverage_key(&summary.user_id)?;
        self.summary_coverage
            .update_and_fetch(coverage_key.as_bytes(), |old| merge_max(old, to_ms))?;
        Ok(())
    }

    pub fn get_summary(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<Summary>, StoreError> {
        let key = keys::summary_key(user_id, from.timestamp_millis(), to.timestamp_millis())?;
        match self.summaries.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// All summaries of `user_id`, ordered by window start.
    pub fn list_summaries(&self, user_id: &str) -> Result<Vec<Summary>, StoreError> {
        let prefix = keys::summary_prefix(user_id)?;
        let mut summaries = Vec::new();
        for item in self.summaries.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            summaries.push(Self::deserialize::<Summary>(&value)?);
        }
        Ok(summaries)
    }

    /// End of the latest summary per user. Users without summaries are absent.
    pub fn latest_coverage_per_user(&self) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let mut coverage = HashMap::new();
        for item in self.summary_coverage.iter() {
            let (key, value) = item?;
            let user_id = match String::from_utf8(key.to_vec()) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid UTF-8 in summary coverage key");
                    continue;
                }
            };
            let Some(to) = decode_coverage(&value).and_then(DateTime::from_timestamp_millis)
            else {
                tracing::warn!(user_id = %user_id, "Malformed summary coverage entry");
                continue;
            };
            coverage.insert(user_id, to);
        }
        Ok(coverage)
    }
}
