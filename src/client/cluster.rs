//! Topology cache: brokers by node id, partition leaders, group
//! coordinators. Seeds from the bootstrap list and refreshes reactively on
//! `NotLeaderForPartition` / `LeaderNotAvailable` / coordinator errors.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use bytes::{BigEndian, BytesMut};
use rand::Rng;

use client::{BrokerPool, ClientConfig};
use errors::{Error, ErrorKind, KafkaCode, Result};
use protocol::{ApiKeys, Encodable, GroupCoordinatorRequest, GroupCoordinatorResponse,
              MetadataRequest, MetadataResponse, NodeId, PartitionId, RequestHeader,
              parse_group_coordinator_response, parse_metadata_response};

/// An opaque handle to a broker known by the cluster. Never the raw node
/// id directly, so a handle captured before a topology change can be
/// checked against the current cache instead of silently resolving to
/// whatever broker now holds that id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BrokerRef(pub NodeId);

impl BrokerRef {
    pub fn node_id(&self) -> NodeId {
        self.0
    }
}

/// One Kafka server process, identified by a cluster-assigned node id.
#[derive(Clone, Debug, PartialEq)]
pub struct Broker {
    pub node_id: NodeId,
    pub host: String,
    pub port: i32,
}

impl Broker {
    pub fn as_ref(&self) -> BrokerRef {
        BrokerRef(self.node_id)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port as u16)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ErrorKind::ConnectionError(no_addr()).into())
    }
}

fn no_addr() -> SocketAddr {
    "0.0.0.0:0".parse().expect("valid socket address literal")
}

/// Transport and topology-class errors are worth retrying locally;
/// rebalance, data-integrity and fatal errors are not — those propagate
/// straight to the caller.
fn is_retriable_locally(err: &Error) -> bool {
    match err.kind() {
        &ErrorKind::KafkaError(code) => code.is_retriable_locally(),
        &ErrorKind::ConnectionError(_) => true,
        _ => false,
    }
}

/// Adds up to 50% jitter to `base`, so N callers retrying the same
/// failure don't all hammer the cluster again in lockstep.
fn jittered_backoff(base: Duration) -> Duration {
    let base_millis = base.as_secs() * 1000 + u64::from(base.subsec_nanos() / 1_000_000);
    let max_jitter = base_millis / 2 + 1;
    let jitter_millis = rand::thread_rng().gen_range(0, max_jitter);
    base + Duration::from_millis(jitter_millis)
}

fn decode_nom<O>(result: ::nom::IResult<&[u8], O>) -> Result<O> {
    match result {
        ::nom::IResult::Done(_, out) => Ok(out),
        ::nom::IResult::Incomplete(_) => bail!(ErrorKind::UnexpectedEOF(0, 0)),
        ::nom::IResult::Error(e) => Err(Error::from(e)),
    }
}

#[derive(Default)]
struct ClusterState {
    brokers: HashMap<NodeId, Broker>,
    leaders: HashMap<(String, PartitionId), NodeId>,
    coordinators: HashMap<String, NodeId>,
    next_seed: usize,
    refreshing: bool,
}

struct Inner {
    config: ClientConfig,
    pool: Arc<BrokerPool>,
    seeds: Vec<SocketAddr>,
    state: Mutex<ClusterState>,
    refresh_done: Condvar,
}

/// The shared, guarded topology cache. Cheaply `Clone`-able; clones share
/// the same underlying cache and broker pool.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<Inner>,
}

impl Cluster {
    pub fn new(config: ClientConfig) -> Result<Cluster> {
        let mut seeds = Vec::new();
        for seed in &config.seed_brokers {
            for addr in seed.to_socket_addrs()? {
                seeds.push(addr);
            }
        }

        let pool = Arc::new(BrokerPool::new(config.clone()));

        Ok(Cluster {
            inner: Arc::new(Inner {
                config: config,
                pool: pool,
                seeds: seeds,
                state: Mutex::new(ClusterState::default()),
                refresh_done: Condvar::new(),
            }),
        })
    }

    pub fn pool(&self) -> Arc<BrokerPool> {
        self.inner.pool.clone()
    }

    /// All currently known broker addresses plus the original seed list,
    /// in rotation order, so a broker outage doesn't wedge every future
    /// discovery request on the same dead seed.
    fn candidate_addrs(&self) -> Vec<SocketAddr> {
        let mut state = self.inner.state.lock().unwrap();
        let mut addrs: Vec<SocketAddr> = state.brokers.values().filter_map(|b| b.socket_addr().ok()).collect();

        if self.inner.seeds.is_empty() {
            return addrs;
        }

        let start = state.next_seed % self.inner.seeds.len();
        state.next_seed = (state.next_seed + 1) % self.inner.seeds.len();

        let mut rotated: Vec<SocketAddr> =
            self.inner.seeds[start..].iter().chain(self.inner.seeds[..start].iter()).cloned().collect();
        rotated.append(&mut addrs);
        rotated.dedup();
        rotated
    }

    fn request_any<F, D, R>(&self, build: F, decode: D) -> Result<R>
        where F: Fn(i32) -> Result<BytesMut>,
              D: Fn(&[u8]) -> Result<R>
    {
        let candidates = self.candidate_addrs();
        let mut last_err = None;

        for addr in &candidates {
            match self.inner.pool.request(*addr, |cid| build(cid), Some(|body: &[u8]| decode(body))) {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => unreachable!("a decoder was supplied"),
                Err(err) => {
                    warn!("request to {} failed, trying next candidate: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ErrorKind::ConnectionError(no_addr()).into()))
    }

    /// Returns the cached leader for `(topic, partition)`, refreshing
    /// metadata on a cache miss and retrying topology-class failures by
    /// invalidating the relevant cache entry and retrying with bounded
    /// backoff.
    pub fn get_leader(&self, topic: &str, partition: PartitionId) -> Result<Broker> {
        if let Some(broker) = self.cached_leader(topic, partition) {
            return Ok(broker);
        }

        self.resolve_with_retry(|| {
            self.refresh_metadata(Some(&[topic.to_owned()]))?;
            self.cached_leader(topic, partition).ok_or_else(|| ErrorKind::KafkaError(KafkaCode::LeaderNotAvailable).into())
        })
    }

    /// Retries `attempt` up to `config.retry_budget` times when it fails
    /// with a transport or topology-class error, sleeping a jittered
    /// `retry_backoff` between tries. Any other error kind, or the budget
    /// running out, propagates immediately.
    fn resolve_with_retry<F, R>(&self, mut attempt: F) -> Result<R>
        where F: FnMut() -> Result<R>
    {
        let budget = self.inner.config.retry_budget;

        for try_number in 0..(budget + 1) {
            match attempt() {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if try_number == budget || !is_retriable_locally(&err) {
                        return Err(err);
                    }
                    let backoff = jittered_backoff(self.inner.config.retry_backoff());
                    warn!("retrying after {:?} ({}/{}): {}", backoff, try_number + 1, budget, err);
                    thread::sleep(backoff);
                }
            }
        }

        unreachable!("loop always returns on its last iteration")
    }

    fn cached_leader(&self, topic: &str, partition: PartitionId) -> Option<Broker> {
        let state = self.inner.state.lock().unwrap();
        let node_id = *state.leaders.get(&(topic.to_owned(), partition))?;
        if node_id < 0 {
            return None;
        }
        state.brokers.get(&node_id).cloned()
    }

    /// Forces a metadata refresh. Concurrent callers collapse into a
    /// single in-flight `MetadataRequest` — exactly one metadata
    /// request across N concurrent callers for the same uncached
    /// partition.
    pub fn refresh_metadata(&self, topics: Option<&[String]>) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.refreshing {
                while state.refreshing {
                    state = self.inner.refresh_done.wait(state).unwrap();
                }
                return Ok(());
            }
            state.refreshing = true;
        }

        let result = self.do_refresh_metadata(topics);

        let mut state = self.inner.state.lock().unwrap();
        state.refreshing = false;
        self.inner.refresh_done.notify_all();
        result
    }

    fn do_refresh_metadata(&self, topics: Option<&[String]>) -> Result<()> {
        let topic_names: Vec<String> = topics.map(|t| t.to_vec()).unwrap_or_default();
        let client_id = self.inner.config.client_id.clone();

        debug!("refreshing cluster metadata for {:?}", topic_names);

        let response: MetadataResponse = self.request_any(move |correlation_id| {
                                                               let req = MetadataRequest {
                                                                   header: RequestHeader {
                                                                       api_key: ApiKeys::Metadata as i16,
                                                                       api_version: 0,
                                                                       correlation_id: correlation_id,
                                                                       client_id: client_id.clone(),
                                                                   },
                                                                   topic_names: topic_names.clone(),
                                                               };
                                                               let mut buf = BytesMut::with_capacity(256);
                                                               req.encode::<BigEndian>(&mut buf)?;
                                                               Ok(buf)
                                                           },
                                                           |body: &[u8]| decode_nom(parse_metadata_response(body)))?;

        let mut state = self.inner.state.lock().unwrap();

        for broker in response.brokers {
            state.brokers.insert(broker.node_id,
                                 Broker {
                                     node_id: broker.node_id,
                                     host: broker.host,
                                     port: broker.port,
                                 });
        }

        for topic in response.topics {
            if topic.error_code != 0 {
                warn!("metadata error for topic {}: {:?}", topic.topic_name, KafkaCode::from(topic.error_code));
                continue;
            }
            for partition in topic.partitions {
                state.leaders.insert((topic.topic_name.clone(), partition.partition_id), partition.leader);
            }
        }

        Ok(())
    }

    /// Locates (and caches) the broker acting as coordinator for
    /// `group_id`, retrying topology-class failures with bounded backoff.
    pub fn get_group_coordinator(&self, group_id: &str) -> Result<Broker> {
        if let Some(broker) = self.cached_coordinator(group_id) {
            return Ok(broker);
        }

        self.resolve_with_retry(|| self.fetch_group_coordinator(group_id))
    }

    fn cached_coordinator(&self, group_id: &str) -> Option<Broker> {
        let state = self.inner.state.lock().unwrap();
        let node_id = *state.coordinators.get(group_id)?;
        state.brokers.get(&node_id).cloned()
    }

    fn fetch_group_coordinator(&self, group_id: &str) -> Result<Broker> {
        let client_id = self.inner.config.client_id.clone();
        let group_id_owned = group_id.to_owned();

        let response: GroupCoordinatorResponse =
            self.request_any(move |correlation_id| {
                                 let req = GroupCoordinatorRequest {
                                     header: RequestHeader {
                                         api_key: ApiKeys::GroupCoordinator as i16,
                                         api_version: 0,
                                         correlation_id: correlation_id,
                                         client_id: client_id.clone(),
                                     },
                                     group_id: group_id_owned.clone(),
                                 };
                                 let mut buf = BytesMut::with_capacity(64);
                                 req.encode::<BigEndian>(&mut buf)?;
                                 Ok(buf)
                             },
                             |body: &[u8]| decode_nom(parse_group_coordinator_response(body)))?;

        let code = KafkaCode::from(response.error_code);
        if code != KafkaCode::None {
            bail!(ErrorKind::KafkaError(code));
        }

        let broker = Broker {
            node_id: response.coordinator_id,
            host: response.coordinator_host,
            port: response.coordinator_port,
        };

        let mut state = self.inner.state.lock().unwrap();
        state.brokers.insert(broker.node_id, broker.clone());
        state.coordinators.insert(group_id.to_owned(), broker.node_id);
        Ok(broker)
    }

    /// Drops a stale coordinator cache entry; the next
    /// `get_group_coordinator` call rediscovers it.
    pub fn invalidate_group_coordinator(&self, group_id: &str) {
        self.inner.state.lock().unwrap().coordinators.remove(group_id);
    }

    pub fn broker(&self, node_id: NodeId) -> Option<Broker> {
        self.inner.state.lock().unwrap().brokers.get(&node_id).cloned()
    }

    pub fn partitions_for(&self, topic: &str) -> Result<Vec<PartitionId>> {
        {
            let state = self.inner.state.lock().unwrap();
            let known: Vec<PartitionId> = state
                .leaders
                .keys()
                .filter(|&&(ref t, _)| t == topic)
                .map(|&(_, p)| p)
                .collect();
            if !known.is_empty() {
                return Ok(known);
            }
        }

        self.refresh_metadata(Some(&[topic.to_owned()]))?;

        let state = self.inner.state.lock().unwrap();
        Ok(state.leaders.keys().filter(|&&(ref t, _)| t == topic).map(|&(_, p)| p).collect())
    }

    /// Closes every pooled connection.
    pub fn disconnect(&self) {
        self.inner.pool.disconnect();
    }
}
