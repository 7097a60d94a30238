use crate::store::StoreError;

const SEP: char = ':';

fn validate_id(kind: &str, id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::Validation(format!("{kind} must not be empty")));
    }
    if id.contains(SEP) {
        return Err(StoreError::Validation(format!(
            "{kind} must not contain '{SEP}': {id}"
        )));
    }
    Ok(())
}

fn ts(timestamp_ms: i64) -> u64 {
    timestamp_ms.max(0) as u64
}

pub fn user_key(user_id: &str) -> Result<String, StoreError> {
    validate_id("user_id", user_id)?;
    Ok(user_id.to_string())
}

/// `{user_id}:{time_ms:020}:{heartbeat_id}`, ascending by time within a user.
pub fn heartbeat_key(
    user_id: &str,
    timestamp_ms: i64,
    heartbeat_id: &str,
) -> Result<String, StoreError> {
    validate_id("user_id", user_id)?;
    validate_id("heartbeat_id", heartbeat_id)?;
    Ok(format!("{}:{:020}:{}", user_id, ts(timestamp_ms), heartbeat_id))
}

pub fn heartbeat_prefix(user_id: &str) -> Result<String, StoreError> {
    validate_id("user_id", user_id)?;
    Ok(format!("{}:", user_id))
}

/// Lower bound of all heartbeat keys of `user_id` at or after `timestamp_ms`.
pub fn heartbeat_range_start(user_id: &str, timestamp_ms: i64) -> Result<String, StoreError> {
    validate_id("user_id", user_id)?;
    Ok(format!("{}:{:020}:", user_id, ts(timestamp_ms)))
}

/// `{user_id}:{from_ms:020}:{to_ms:020}`; one slot per summary window.
pub fn summary_key(user_id: &str, from_ms: i64, to_ms: i64) -> Result<String, StoreError> {
    validate_id("user_id", user_id)?;
    Ok(format!("{}:{:020}:{:020}", user_id, ts(from_ms), ts(to_ms)))
}

pub fn summary_prefix(user_id: &str) -> Result<String, StoreError> {
    validate_id("user_id", user_id)?;
    Ok(format!("{}:", user_id))
}

pub fn summary_coverage_key(user_id: &str) -> Result<String, StoreError> {
    validate_id("user_id", user_id)?;
    Ok(user_id.to_string())
}
