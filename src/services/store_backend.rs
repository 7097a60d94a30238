use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AggregationError;
use crate::services::{HeartbeatStore, SummaryStore, UserDirectory};
use crate::store::operations::summaries::Summary;
use crate::store::{Store, StoreError};

/// Serves all three storage capabilities from the sled [`Store`].
///
/// sled calls block, so each one runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct StoreBackend {
    store: Arc<Store>,
}

impl StoreBackend {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, AggregationError>
    where
        F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || op(&store)).await??)
    }
}

#[async_trait]
impl UserDirectory for StoreBackend {
    async fn get_all_users(&self) -> Result<Vec<String>, AggregationError> {
        self.blocking(|store| store.list_user_ids()).await
    }
}

#[async_trait]
impl HeartbeatStore for StoreBackend {
    async fn first_heartbeat_times(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, AggregationError> {
        let user_ids = user_ids.to_vec();
        self.blocking(move |store| store.first_heartbeat_times(&user_ids))
            .await
    }
}

#[async_trait]
impl SummaryStore for StoreBackend {
    async fn latest_coverage_per_user(
        &self,
    ) -> Result<HashMap<String, DateTime<Utc>>, AggregationError> {
        self.blocking(|store| store.latest_coverage_per_user()).await
    }

    async fn insert(&self, summary: Summary) -> Result<(), AggregationError> {
        self.blocking(move |store| store.upsert_summary(&summary))
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::tempdir;

    use super::*;
    use crate::store::operations::heartbeats::Heartbeat;
    use crate::store::operations::users::User;

    #[tokio::test]
    async fn backend_serves_capabilities_from_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("backend-db").to_str().unwrap()).unwrap());
        store.create_user(&User::new("u1")).unwrap();
        store.create_user(&User::new("u2")).unwrap();

        let first = Utc.with_ymd_and_hms(2024, 1, 3, 14, 0, 0).unwrap();
        store
            .insert_heartbeat(&Heartbeat {
                id: "h1".to_string(),
                user_id: "u1".to_string(),
                entity: "lib.rs".to_string(),
                project: String::new(),
                language: String::new(),
                editor: String::new(),
                operating_system: String::new(),
                machine: String::new(),
                time: first,
            })
            .unwrap();

        let backend = StoreBackend::new(store);
        let users = backend.get_all_users().await.unwrap();
        assert_eq!(users, vec!["u1", "u2"]);

        let firsts = backend.first_heartbeat_times(&users).await.unwrap();
        assert_eq!(firsts.get("u1"), Some(&first));
        assert!(!firsts.contains_key("u2"));

        let from = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        backend.insert(Summary::empty("u1", from, to)).await.unwrap();
        let coverage = backend.latest_coverage_per_user().await.unwrap();
        assert_eq!(coverage.get("u1"), Some(&to));
    }

    #[tokio::test]
    async fn store_errors_surface_as_aggregation_errors() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("backend-db2").to_str().unwrap()).unwrap());
        let backend = StoreBackend::new(store);

        let err = backend
            .first_heartbeat_times(&["bad:id".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AggregationError::Store(StoreError::Validation(_))
        ));
    }
}
