/// 默认每日聚合触发时间（本地时间 HH:MM）
pub const DEFAULT_AGGREGATION_TIME: &str = "02:15";

/// 持久化阶段默认并发数，对应存储的安全连接预算
pub const DEFAULT_DB_MAX_CONN: usize = 2;

/// 单个汇总计算的超时（秒）
pub const DEFAULT_COMPUTE_TIMEOUT_SECS: u64 = 300;

/// 单个汇总写入的超时（秒）
pub const DEFAULT_PERSIST_TIMEOUT_SECS: u64 = 30;

/// 相邻心跳之间最多计入的时长（秒）
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 120;

/// 汇总中缺失分类值的占位键
pub const UNKNOWN_KEY: &str = "unknown";
