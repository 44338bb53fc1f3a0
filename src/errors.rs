//! Error types shared across the crate.

use std::net::SocketAddr;

use protocol::ApiKeys;
use client::BrokerRef;

/// Various errors reported by a remote Kafka server.
///
/// We use numeric codes to indicate what problem occurred on the server.
/// These get translated into `ErrorKind::KafkaError` by the client.
///
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i16)]
pub enum KafkaCode {
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition.
    OffsetOutOfRange = 1,
    /// A message's contents do not match its CRC.
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size.
    InvalidMessageSize = 4,
    /// No leader exists for this partition right now.
    LeaderNotAvailable = 5,
    /// The client's metadata is out of date; it sent the request to a
    /// broker that is not the leader for this partition.
    NotLeaderForPartition = 6,
    /// The request exceeded the user-specified time limit.
    RequestTimedOut = 7,
    BrokerNotAvailable = 8,
    ReplicaNotAvailable = 9,
    MessageSizeTooLarge = 10,
    StaleControllerEpoch = 11,
    OffsetMetadataTooLarge = 12,
    NetworkException = 13,
    /// Coordinator is still loading group/offset metadata.
    GroupLoadInProgress = 14,
    /// No coordinator is currently available for the offsets topic.
    GroupCoordinatorNotAvailable = 15,
    /// This broker is not the coordinator for the requested group.
    NotCoordinatorForGroup = 16,
    InvalidTopic = 17,
    RecordListTooLarge = 18,
    NotEnoughReplicas = 19,
    NotEnoughReplicasAfterAppend = 20,
    InvalidRequiredAcks = 21,
    /// The generation id in the request is stale.
    IllegalGeneration = 22,
    InconsistentGroupProtocol = 23,
    InvalidGroupId = 24,
    /// The member id is not recognised by the coordinator.
    UnknownMemberId = 25,
    InvalidSessionTimeout = 26,
    /// The coordinator has begun rebalancing the group; the client
    /// must rejoin.
    RebalanceInProgress = 27,
    InvalidCommitOffsetSize = 28,
    TopicAuthorizationFailed = 29,
    GroupAuthorizationFailed = 30,
    ClusterAuthorizationFailed = 31,
    InvalidTimestamp = 32,
    UnsupportedSaslMechanism = 33,
    IllegalSaslState = 34,
    UnsupportedVersion = 35,
    TopicAlreadyExists = 36,
    InvalidPartitions = 37,
    InvalidReplicationFactor = 38,
    InvalidReplicaAssignment = 39,
    InvalidConfig = 40,
    NotController = 41,
    InvalidRequest = 42,
    UnsupportedForMessageFormat = 43,
    PolicyViolation = 44,
}

impl From<i16> for KafkaCode {
    fn from(v: i16) -> Self {
        match v {
            -1 => KafkaCode::Unknown,
            0 => KafkaCode::None,
            1 => KafkaCode::OffsetOutOfRange,
            2 => KafkaCode::CorruptMessage,
            3 => KafkaCode::UnknownTopicOrPartition,
            4 => KafkaCode::InvalidMessageSize,
            5 => KafkaCode::LeaderNotAvailable,
            6 => KafkaCode::NotLeaderForPartition,
            7 => KafkaCode::RequestTimedOut,
            8 => KafkaCode::BrokerNotAvailable,
            9 => KafkaCode::ReplicaNotAvailable,
            10 => KafkaCode::MessageSizeTooLarge,
            11 => KafkaCode::StaleControllerEpoch,
            12 => KafkaCode::OffsetMetadataTooLarge,
            13 => KafkaCode::NetworkException,
            14 => KafkaCode::GroupLoadInProgress,
            15 => KafkaCode::GroupCoordinatorNotAvailable,
            16 => KafkaCode::NotCoordinatorForGroup,
            17 => KafkaCode::InvalidTopic,
            18 => KafkaCode::RecordListTooLarge,
            19 => KafkaCode::NotEnoughReplicas,
            20 => KafkaCode::NotEnoughReplicasAfterAppend,
            21 => KafkaCode::InvalidRequiredAcks,
            22 => KafkaCode::IllegalGeneration,
            23 => KafkaCode::InconsistentGroupProtocol,
            24 => KafkaCode::InvalidGroupId,
            25 => KafkaCode::UnknownMemberId,
            26 => KafkaCode::InvalidSessionTimeout,
            27 => KafkaCode::RebalanceInProgress,
            28 => KafkaCode::InvalidCommitOffsetSize,
            29 => KafkaCode::TopicAuthorizationFailed,
            30 => KafkaCode::GroupAuthorizationFailed,
            31 => KafkaCode::ClusterAuthorizationFailed,
            32 => KafkaCode::InvalidTimestamp,
            33 => KafkaCode::UnsupportedSaslMechanism,
            34 => KafkaCode::IllegalSaslState,
            35 => KafkaCode::UnsupportedVersion,
            36 => KafkaCode::TopicAlreadyExists,
            37 => KafkaCode::InvalidPartitions,
            38 => KafkaCode::InvalidReplicationFactor,
            39 => KafkaCode::InvalidReplicaAssignment,
            40 => KafkaCode::InvalidConfig,
            41 => KafkaCode::NotController,
            42 => KafkaCode::InvalidRequest,
            43 => KafkaCode::UnsupportedForMessageFormat,
            44 => KafkaCode::PolicyViolation,
            _ => KafkaCode::Unknown,
        }
    }
}

impl KafkaCode {
    /// Transport/topology errors the core retries locally without
    /// surfacing them to the caller; see the error-handling design.
    pub fn is_retriable_locally(&self) -> bool {
        match *self {
            KafkaCode::LeaderNotAvailable |
            KafkaCode::NotLeaderForPartition |
            KafkaCode::UnknownTopicOrPartition |
            KafkaCode::GroupCoordinatorNotAvailable |
            KafkaCode::NotCoordinatorForGroup |
            KafkaCode::GroupLoadInProgress |
            KafkaCode::RequestTimedOut |
            KafkaCode::NetworkException => true,
            _ => false,
        }
    }

    /// Errors that invalidate group membership and force a rejoin.
    pub fn is_rebalance(&self) -> bool {
        match *self {
            KafkaCode::RebalanceInProgress |
            KafkaCode::IllegalGeneration |
            KafkaCode::UnknownMemberId => true,
            _ => false,
        }
    }
}

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Parse(::nom::ErrorKind);
    }

    errors {
        /// A response arrived whose bytes did not match what the
        /// decoder for this API key expected.
        UnexpectedResponse(api_key: ApiKeys) {
            description("unexpected response")
            display("unexpected response for api key: {:?}", api_key)
        }

        /// A broker named by a `BrokerRef` is no longer (or never was)
        /// known to the cluster metadata cache.
        BrokerNotFound(broker: BrokerRef) {
            description("broker not found")
            display("broker not found: {:?}", broker)
        }

        /// Connect or socket timeout elapsed.
        ConnectionError(addr: SocketAddr) {
            description("connection error")
            display("fail to connect {}", addr)
        }

        /// The broker replied with a non-zero error code.
        KafkaError(code: KafkaCode) {
            description("kafka error")
            display("kafka error: {:?}", code)
        }

        /// A message's attributes byte named a compression codec this
        /// crate does not implement (compression is a named non-goal).
        UnsupportedCompression(codec: i8) {
            description("unsupported compression codec")
            display("unsupported compression codec: {}", codec)
        }

        /// The embedded assignment / subscription metadata could not be
        /// decoded.
        CodecError(reason: &'static str) {
            description("codec error")
            display("codec error: {}", reason)
        }

        /// No group protocol strategy matched the one the coordinator
        /// selected for the group.
        UnsupportedAssignmentStrategy(name: String) {
            description("unsupported assignment strategy")
            display("unsupported assignment strategy: {}", name)
        }

        /// A pending future was dropped before it completed.
        Canceled(reason: &'static str) {
            description("canceled")
            display("canceled: {}", reason)
        }

        /// Could not parse a configuration value.
        ParseError(reason: String) {
            description("parse error")
            display("parse error: {}", reason)
        }

        /// A socket read returned fewer bytes than the frame announced.
        UnexpectedEOF(expected: usize, got: usize) {
            description("unexpected EOF")
            display("unexpected EOF: expected {} bytes, got {}", expected, got)
        }
    }
}
