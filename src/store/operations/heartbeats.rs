use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub id: String,
    pub user_id: String,
    pub entity: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub editor: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub machine: String,
    pub time: DateTime<Utc>,
}

impl Store {
    pub fn insert_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), StoreError> {
        let key = keys::heartbeat_key(
            &heartbeat.user_id,
            heartbeat.time.timestamp_millis(),
            &heartbeat.id,
        )?;
        self.heartbeats
            .insert(key.as_bytes(), Self::serialize(heartbeat)?)?;
        Ok(())
    }

    pub fn first_heartbeat(&self, user_id: &str) -> Result<Option<Heartbeat>, StoreError> {
        let prefix = keys::heartbeat_prefix(user_id)?;
        match self.heartbeats.scan_prefix(prefix.as_bytes()).next() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(Self::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Earliest heartbeat time for each of `user_ids`; users without heartbeats are absent.
    pub fn first_heartbeat_times(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let mut firsts = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(heartbeat) = self.first_heartbeat(user_id)? {
                firsts.insert(user_id.clone(), heartbeat.time);
            }
        }
        Ok(firsts)
    }

    /// Heartbeats of `user_id` with `from <= time < to`, in time order.
    pub fn heartbeats_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, StoreError> {
        if to <= from {
            return Ok(Vec::new());
        }
        let start = keys::heartbeat_range_start(user_id, from.timestamp_millis())?;
        let end = keys::heartbeat_range_start(user_id, to.timestamp_millis())?;

        let mut heartbeats = Vec::new();
        for item in self.heartbeats.range(start.as_bytes()..end.as_bytes()) {
            let (_, value) = item?;
            heartbeats.push(Self::deserialize::<Heartbeat>(&value)?);
        }
        Ok(heartbeats)
    }
}
