use crate::store::operations::summaries::{encode_coverage, Summary};
use crate::store::{keys, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_summary_coverage_index", m001_summary_coverage_index),
    ]
}

/// 执行所有未应用的数据库迁移。
///
/// - 每个迁移必须幂等：进程可能在迁移成功但版本号写入之前崩溃，重启后会再次执行。
/// - 版本号在每个迁移成功后立即持久化。
/// - 仅向前：set_version 拒绝降级。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("malformed schema version ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

/// Rebuild `summary_coverage` from the summaries tree.
fn m001_summary_coverage_index(store: &Store) -> Result<(), StoreError> {
    let mut latest: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for item in store.summaries.iter() {
        let (_, value) = item?;
        let summary: Summary = Store::deserialize(&value)?;
        let to_ms = summary.to.timestamp_millis();
        latest
            .entry(summary.user_id)
            .and_modify(|current| *current = (*current).max(to_ms))
            .or_insert(to_ms);
    }

    for (user_id, to_ms) in latest {
        let key = keys::summary_coverage_key(&user_id)?;
        store
            .summary_coverage
            .insert(key.as_bytes(), &encode_coverage(to_ms))?;
    }

    Ok(())
}
