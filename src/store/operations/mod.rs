pub mod heartbeats;
pub mod summaries;
pub mod users;
