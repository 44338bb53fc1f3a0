use std::time::Duration;

use protocol::FetchOffset;

/// Heartbeat deadline (seconds). Default 30.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;
/// Minimum seconds between auto-commits. Default 10.
pub const DEFAULT_OFFSET_COMMIT_INTERVAL_SECS: u64 = 10;
/// How much earlier than the session timeout a heartbeat is due: the
/// grace period keeps a loaded consumer from getting evicted at the last
/// second.
pub const DEFAULT_HEARTBEAT_GRACE_SECS: u64 = 2;
pub const DEFAULT_MIN_BYTES: i32 = 1;
pub const DEFAULT_MAX_BYTES_PER_PARTITION: i32 = 1024 * 1024;
pub const DEFAULT_MAX_WAIT_TIME_MILLIS: i32 = 500;

/// The default offset policy applied to a partition with no committed
/// offset in the group's offset store, recorded per subscribed topic.
pub type DefaultOffsetPolicy = FetchOffset;

/// Everything the `Consumer`/`ConsumerCoordinator`/`OffsetManager` need
/// beyond `ClientConfig`: group membership timing and fetch shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub group_id: String,
    pub session_timeout_secs: u64,
    pub heartbeat_grace_secs: u64,
    pub offset_commit_interval_secs: u64,
    pub min_bytes: i32,
    pub max_bytes_per_partition: i32,
    pub max_wait_time_millis: i32,
    /// Auto-commit offsets on `shutdown()` and during the fetch loop; set
    /// to `false` for applications that manage commits themselves.
    pub auto_commit: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            group_id: String::new(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            heartbeat_grace_secs: DEFAULT_HEARTBEAT_GRACE_SECS,
            offset_commit_interval_secs: DEFAULT_OFFSET_COMMIT_INTERVAL_SECS,
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes_per_partition: DEFAULT_MAX_BYTES_PER_PARTITION,
            max_wait_time_millis: DEFAULT_MAX_WAIT_TIME_MILLIS,
            auto_commit: true,
        }
    }
}

impl ConsumerConfig {
    pub fn new<S: Into<String>>(group_id: S) -> Self {
        ConsumerConfig { group_id: group_id.into(), ..Default::default() }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        let grace = self.heartbeat_grace_secs.min(self.session_timeout_secs.saturating_sub(1));
        Duration::from_secs(self.session_timeout_secs - grace)
    }

    pub fn offset_commit_interval(&self) -> Duration {
        Duration::from_secs(self.offset_commit_interval_secs)
    }
}
