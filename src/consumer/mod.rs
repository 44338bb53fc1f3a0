//! The consumer group side of the crate: subscription bookkeeping,
//! partition assignment, the join/sync/heartbeat state machine, offset
//! tracking, and the fetch/dispatch loop that ties them together.

mod config;
mod subscriptions;
mod assignor;
mod coordinator;
mod offset_manager;
mod fetcher;
mod consumer;

pub use self::config::{ConsumerConfig, DEFAULT_HEARTBEAT_GRACE_SECS,
                       DEFAULT_OFFSET_COMMIT_INTERVAL_SECS, DEFAULT_SESSION_TIMEOUT_SECS};
pub use self::subscriptions::Subscriptions;
pub use self::assignor::{PartitionAssignor, RoundRobinAssignor, TopicPartition};
pub use self::coordinator::{ConsumerCoordinator, Generation};
pub use self::offset_manager::OffsetManager;
pub use self::fetcher::{FetchBatch, FetchOperation, FetchTarget, FetchedMessage, PartitionError};
pub use self::consumer::{EventSink, KafkaConsumer, NoopEventSink};
