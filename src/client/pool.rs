//! A mapping `(host, port) -> Connection`, lazily populated, guarded so
//! that concurrent per-broker fetch workers never contend on brokers
//! other than the one they're calling.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use bytes::BytesMut;

use client::ClientConfig;
use errors::Result;
use network::Connection;
use protocol::CorrelationId;

/// Creates and caches one `Connection` per `(host, port)`. Structural
/// changes to the map (inserting a new broker) take the write lock
/// briefly; routine requests only ever lock the one connection they use,
/// so a slow broker cannot stall requests to any other broker.
pub struct BrokerPool {
    config: ClientConfig,
    connections: RwLock<HashMap<SocketAddr, Arc<Mutex<Connection>>>>,
}

impl BrokerPool {
    pub fn new(config: ClientConfig) -> BrokerPool {
        BrokerPool {
            config: config,
            connections: RwLock::new(HashMap::new()),
        }
    }

    fn connection_for(&self, addr: SocketAddr) -> Arc<Mutex<Connection>> {
        if let Some(conn) = self.connections.read().unwrap().get(&addr) {
            return conn.clone();
        }

        let mut connections = self.connections.write().unwrap();
        connections
            .entry(addr)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Connection::new(addr,
                                                     self.config.client_id.clone(),
                                                     self.config.connect_timeout(),
                                                     self.config.socket_timeout())))
            })
            .clone()
    }

    /// Send one request to the broker at `addr`, dialing it first if
    /// necessary. `decode = None` is fire-and-forget.
    pub fn request<E, D, R>(&self, addr: SocketAddr, encode: E, decode: Option<D>) -> Result<Option<R>>
        where E: FnOnce(CorrelationId) -> Result<BytesMut>,
              D: FnOnce(&[u8]) -> Result<R>
    {
        let conn = self.connection_for(addr);
        let mut conn = conn.lock().unwrap();
        conn.request(encode, decode)
    }

    /// Drops every pooled connection, closing their sockets. The next
    /// `request` to any broker re-dials.
    pub fn disconnect(&self) {
        self.connections.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.connections.read().unwrap().len()
    }
}
