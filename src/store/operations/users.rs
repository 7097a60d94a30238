use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }
}

impl Store {
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let key = keys::user_key(&user.id)?;

        // Atomic insert-if-absent so concurrent registrations of one id cannot both succeed.
        let cas_result = self
            .users
            .compare_and_swap(
                key.as_bytes(),
                None::<&[u8]>,
                Some(Self::serialize(user)?),
            )
            .map_err(StoreError::Sled)?;

        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "user".to_string(),
                key: user.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let key = keys::user_key(user_id)?;
        match self.users.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for item in self.users.iter() {
            let (key, _) = item?;
            match String::from_utf8(key.to_vec()) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(error = %e, "Invalid UTF-8 in user key"),
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn create_and_list_users() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("users-db").to_str().unwrap()).unwrap();

        store.create_user(&User::new("u2")).unwrap();
        store.create_user(&User::new("u1")).unwrap();

        assert_eq!(store.list_user_ids().unwrap(), vec!["u1", "u2"]);
        assert!(store.get_user_by_id("u1").unwrap().is_some());
        assert!(store.get_user_by_id("u3").unwrap().is_none());
    }

    #[test]
    fn duplicate_user_conflicts() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("users-db2").to_str().unwrap()).unwrap();

        store.create_user(&User::new("u1")).unwrap();
        let err = store.create_user(&User::new("u1")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }
}
