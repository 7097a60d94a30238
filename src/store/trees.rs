pub const USERS: &str = "users";
pub const HEARTBEATS: &str = "heartbeats";
pub const SUMMARIES: &str = "summaries";
pub const SUMMARY_COVERAGE: &str = "summary_coverage";
pub const META: &str = "meta";
