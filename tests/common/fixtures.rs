use chrono::{DateTime, Duration, TimeZone, Utc};

use activity_aggregator::aggregation::{generate_jobs, AggregationJob};
use activity_aggregator::store::operations::heartbeats::Heartbeat;
use activity_aggregator::store::Store;

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// `days` consecutive one-day jobs per user starting at 2024-01-01.
pub fn daily_jobs(users: &[&str], days: i64) -> Vec<AggregationJob> {
    let start = utc(2024, 1, 1, 0, 0);
    users
        .iter()
        .flat_map(|user| {
            (0..days).map(move |day| AggregationJob {
                user_id: user.to_string(),
                from: start + Duration::days(day),
                to: start + Duration::days(day + 1),
            })
        })
        .collect()
}

pub fn expected_jobs(user_id: &str, frontier: DateTime<Utc>) -> Vec<AggregationJob> {
    generate_jobs(user_id, frontier, Utc::now(), &Utc).collect()
}

pub fn seed_heartbeat(store: &Store, user_id: &str, project: &str, time: DateTime<Utc>) {
    store
        .insert_heartbeat(&Heartbeat {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entity: "src/lib.rs".to_string(),
            project: project.to_string(),
            language: "Rust".to_string(),
            editor: "vim".to_string(),
            operating_system: "Linux".to_string(),
            machine: "workstation".to_string(),
            time,
        })
        .expect("insert heartbeat");
}
