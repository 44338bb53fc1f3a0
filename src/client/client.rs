//! `KafkaClient`: the thin façade that turns each protocol API into a
//! single method, routed to the right broker via `Cluster` and dispatched
//! through the shared `BrokerPool`. `ConsumerCoordinator`, `Fetcher` and
//! `OffsetManager` are built against this instead of talking to
//! `Connection` directly, so they can be unit tested against a fake.

use bytes::{BigEndian, BytesMut};

use client::{Broker, ClientConfig, Cluster};
use errors::{Error, ErrorKind, Result};
use protocol::{ApiKeys, Encodable, FetchRequest, FetchResponse, FetchTopic,
              GenerationId, HeartbeatRequest, HeartbeatResponse, JoinGroupProtocol,
              JoinGroupRequest, JoinGroupResponse, LeaveGroupRequest, LeaveGroupResponse,
              ListOffsetsRequest, ListOffsetsResponse, ListOffsetsTopic, OffsetCommitRequest,
              OffsetCommitResponse, OffsetCommitTopic, OffsetFetchRequest, OffsetFetchResponse,
              OffsetFetchTopic, RequestHeader, SyncGroupAssignment, SyncGroupRequest,
              SyncGroupResponse, parse_fetch_response, parse_heartbeat_response,
              parse_join_group_response, parse_leave_group_response, parse_list_offsets_response,
              parse_offset_commit_response, parse_offset_fetch_response, parse_sync_group_response};

fn decode_nom<O>(result: ::nom::IResult<&[u8], O>) -> Result<O> {
    match result {
        ::nom::IResult::Done(_, out) => Ok(out),
        ::nom::IResult::Incomplete(_) => bail!(ErrorKind::UnexpectedEOF(0, 0)),
        ::nom::IResult::Error(e) => Err(Error::from(e)),
    }
}

/// A trait for communicating with the Kafka cluster, implemented by
/// `KafkaClient` and, in tests, by an in-memory fake that never opens a
/// socket. Every method resolves to one request/response pair against the
/// named broker.
pub trait Client {
    fn fetch(&self, broker: &Broker, max_wait_time: i32, min_bytes: i32, topics: Vec<FetchTopic>) -> Result<FetchResponse>;

    fn list_offsets(&self, broker: &Broker, topics: Vec<ListOffsetsTopic>) -> Result<ListOffsetsResponse>;

    fn join_group(&self,
                  coordinator: &Broker,
                  group_id: &str,
                  session_timeout_ms: i32,
                  member_id: &str,
                  protocol_type: &str,
                  group_protocols: Vec<JoinGroupProtocol>)
                  -> Result<JoinGroupResponse>;

    fn sync_group(&self,
                  coordinator: &Broker,
                  group_id: &str,
                  generation_id: GenerationId,
                  member_id: &str,
                  group_assignment: Vec<SyncGroupAssignment>)
                  -> Result<SyncGroupResponse>;

    fn heartbeat(&self, coordinator: &Broker, group_id: &str, generation_id: GenerationId, member_id: &str) -> Result<HeartbeatResponse>;

    fn leave_group(&self, coordinator: &Broker, group_id: &str, member_id: &str) -> Result<LeaveGroupResponse>;

    fn offset_commit(&self,
                     coordinator: &Broker,
                     group_id: &str,
                     generation_id: GenerationId,
                     member_id: &str,
                     retention_time: i64,
                     topics: Vec<OffsetCommitTopic>)
                     -> Result<OffsetCommitResponse>;

    fn offset_fetch(&self, coordinator: &Broker, group_id: &str, topics: Vec<OffsetFetchTopic>) -> Result<OffsetFetchResponse>;
}

/// Fetch/offset/group-protocol requests routed through a live `Cluster`.
#[derive(Clone)]
pub struct KafkaClient {
    config: ClientConfig,
    cluster: Cluster,
}

impl KafkaClient {
    pub fn new(config: ClientConfig) -> Result<KafkaClient> {
        let cluster = Cluster::new(config.clone())?;
        Ok(KafkaClient { config: config, cluster: cluster })
    }

    pub fn from_cluster(config: ClientConfig, cluster: Cluster) -> KafkaClient {
        KafkaClient { config: config, cluster: cluster }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn send<F, D, R>(&self, broker: &Broker, build: F, decode: D) -> Result<R>
        where F: FnOnce(i32) -> Result<BytesMut>,
              D: FnOnce(&[u8]) -> Result<R>
    {
        let addr = broker.socket_addr()?;
        match self.cluster.pool().request(addr, build, Some(decode))? {
            Some(response) => Ok(response),
            None => unreachable!("a decoder was supplied"),
        }
    }

    fn header(&self, api_key: ApiKeys, api_version: i16, correlation_id: i32) -> RequestHeader {
        RequestHeader {
            api_key: api_key as i16,
            api_version: api_version,
            correlation_id: correlation_id,
            client_id: self.config.client_id.clone(),
        }
    }
}

impl Client for KafkaClient {
    fn fetch(&self, broker: &Broker, max_wait_time: i32, min_bytes: i32, topics: Vec<FetchTopic>) -> Result<FetchResponse> {
        let header_tpl = self.clone();
        self.send(broker,
                  move |correlation_id| {
                      let req = FetchRequest {
                          header: header_tpl.header(ApiKeys::Fetch, 0, correlation_id),
                          replica_id: -1,
                          max_wait_time: max_wait_time,
                          min_bytes: min_bytes,
                          topics: topics,
                      };
                      let mut buf = BytesMut::with_capacity(512);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_fetch_response(body, 0)))
    }

    fn list_offsets(&self, broker: &Broker, topics: Vec<ListOffsetsTopic>) -> Result<ListOffsetsResponse> {
        let header_tpl = self.clone();
        self.send(broker,
                  move |correlation_id| {
                      let req = ListOffsetsRequest {
                          header: header_tpl.header(ApiKeys::Offsets, 0, correlation_id),
                          replica_id: -1,
                          topics: topics.clone(),
                      };
                      let mut buf = BytesMut::with_capacity(256);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_list_offsets_response(body)))
    }

    fn join_group(&self,
                  coordinator: &Broker,
                  group_id: &str,
                  session_timeout_ms: i32,
                  member_id: &str,
                  protocol_type: &str,
                  group_protocols: Vec<JoinGroupProtocol>)
                  -> Result<JoinGroupResponse> {
        let header_tpl = self.clone();
        let group_id = group_id.to_owned();
        let member_id = member_id.to_owned();
        let protocol_type = protocol_type.to_owned();
        self.send(coordinator,
                  move |correlation_id| {
                      let req = JoinGroupRequest {
                          header: header_tpl.header(ApiKeys::JoinGroup, 0, correlation_id),
                          group_id: group_id.clone(),
                          session_timeout: session_timeout_ms,
                          member_id: member_id.clone(),
                          protocol_type: protocol_type.clone(),
                          group_protocols: group_protocols.clone(),
                      };
                      let mut buf = BytesMut::with_capacity(256);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_join_group_response(body)))
    }

    fn sync_group(&self,
                  coordinator: &Broker,
                  group_id: &str,
                  generation_id: GenerationId,
                  member_id: &str,
                  group_assignment: Vec<SyncGroupAssignment>)
                  -> Result<SyncGroupResponse> {
        let header_tpl = self.clone();
        let group_id = group_id.to_owned();
        let member_id = member_id.to_owned();
        self.send(coordinator,
                  move |correlation_id| {
                      let req = SyncGroupRequest {
                          header: header_tpl.header(ApiKeys::SyncGroup, 0, correlation_id),
                          group_id: group_id.clone(),
                          generation_id: generation_id,
                          member_id: member_id.clone(),
                          group_assignment: group_assignment.clone(),
                      };
                      let mut buf = BytesMut::with_capacity(256);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_sync_group_response(body)))
    }

    fn heartbeat(&self, coordinator: &Broker, group_id: &str, generation_id: GenerationId, member_id: &str) -> Result<HeartbeatResponse> {
        let header_tpl = self.clone();
        let group_id = group_id.to_owned();
        let member_id = member_id.to_owned();
        self.send(coordinator,
                  move |correlation_id| {
                      let req = HeartbeatRequest {
                          header: header_tpl.header(ApiKeys::Heartbeat, 0, correlation_id),
                          group_id: group_id.clone(),
                          generation_id: generation_id,
                          member_id: member_id.clone(),
                      };
                      let mut buf = BytesMut::with_capacity(64);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_heartbeat_response(body)))
    }

    fn leave_group(&self, coordinator: &Broker, group_id: &str, member_id: &str) -> Result<LeaveGroupResponse> {
        let header_tpl = self.clone();
        let group_id = group_id.to_owned();
        let member_id = member_id.to_owned();
        self.send(coordinator,
                  move |correlation_id| {
                      let req = LeaveGroupRequest {
                          header: header_tpl.header(ApiKeys::LeaveGroup, 0, correlation_id),
                          group_id: group_id.clone(),
                          member_id: member_id.clone(),
                      };
                      let mut buf = BytesMut::with_capacity(64);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_leave_group_response(body)))
    }

    fn offset_commit(&self,
                     coordinator: &Broker,
                     group_id: &str,
                     generation_id: GenerationId,
                     member_id: &str,
                     retention_time: i64,
                     topics: Vec<OffsetCommitTopic>)
                     -> Result<OffsetCommitResponse> {
        let header_tpl = self.clone();
        let group_id = group_id.to_owned();
        let member_id = member_id.to_owned();
        self.send(coordinator,
                  move |correlation_id| {
                      let req = OffsetCommitRequest {
                          header: header_tpl.header(ApiKeys::OffsetCommit, 2, correlation_id),
                          group_id: group_id.clone(),
                          generation_id: generation_id,
                          member_id: member_id.clone(),
                          retention_time: retention_time,
                          topics: topics.clone(),
                      };
                      let mut buf = BytesMut::with_capacity(256);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_offset_commit_response(body)))
    }

    fn offset_fetch(&self, coordinator: &Broker, group_id: &str, topics: Vec<OffsetFetchTopic>) -> Result<OffsetFetchResponse> {
        let header_tpl = self.clone();
        let group_id = group_id.to_owned();
        self.send(coordinator,
                  move |correlation_id| {
                      let req = OffsetFetchRequest {
                          header: header_tpl.header(ApiKeys::OffsetFetch, 1, correlation_id),
                          group_id: group_id.clone(),
                          topics: topics.clone(),
                      };
                      let mut buf = BytesMut::with_capacity(128);
                      req.encode::<BigEndian>(&mut buf)?;
                      Ok(buf)
                  },
                  |body: &[u8]| decode_nom(parse_offset_fetch_response(body)))
    }
}
