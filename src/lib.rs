//! Client core for Kafka 0.9-era consumer groups.
//!
//! This crate discovers brokers, speaks the binary wire protocol, and
//! coordinates a consumer group so that several independent client
//! processes cooperatively read from the partitions of one or more topics
//! while committing progress back to the cluster.
//!
//! The producer, SASL/SSL handshakes, and a metrics backend are external
//! collaborators and are not implemented here; see `network::authenticate`
//! for the seam a real deployment would plug TLS/SASL into.

#![recursion_limit = "128"]
#![allow(dead_code)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
extern crate bytes;
#[macro_use]
extern crate nom;
extern crate crc;
extern crate time;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;

extern crate futures;
extern crate futures_cpupool;

#[cfg(test)]
extern crate pretty_env_logger;

#[macro_use]
pub mod errors;
pub mod protocol;
pub mod network;
pub mod client;
pub mod consumer;

pub use errors::{Error, ErrorKind, KafkaCode, Result};
pub use protocol::{ApiKeys, FetchOffset, NodeId, Offset, PartitionId};
pub use network::authenticate;
pub use client::{Broker, BrokerRef, Client, ClientConfig, Cluster, KafkaClient};
pub use consumer::{ConsumerConfig, EventSink, FetchBatch, FetchedMessage, KafkaConsumer,
                   NoopEventSink, PartitionError};
