//! Cluster membership & metadata plus the `KafkaClient` façade that
//! turns each wire API into one Rust method — a tagged dispatch rather
//! than open polymorphism.

mod config;
mod pool;
mod cluster;
mod client;

pub use self::config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONNECTION_IDLE_SECS,
                       DEFAULT_METADATA_MAX_AGE_SECS, DEFAULT_RETRY_BACKOFF_MILLIS,
                       DEFAULT_RETRY_BUDGET, DEFAULT_SOCKET_TIMEOUT_SECS};
pub use self::pool::BrokerPool;
pub use self::cluster::{Broker, BrokerRef, Cluster};
pub use self::client::{Client, KafkaClient};
