use std::time::Duration;

/// Default connect timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default socket read/write timeout (seconds).
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 30;
/// How long cached cluster metadata is trusted before a background
/// refresh is due.
pub const DEFAULT_METADATA_MAX_AGE_SECS: u64 = 300;
/// Backoff between retries of a topology-class error.
pub const DEFAULT_RETRY_BACKOFF_MILLIS: u64 = 100;
/// Ceiling on retries of a topology-class error before it becomes fatal.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;
/// Idle-connection eviction from the broker pool.
pub const DEFAULT_MAX_CONNECTION_IDLE_SECS: u64 = 600;

/// Everything the core needs to bootstrap into a cluster and open sockets
/// to it. Covers every connection and topology option except the
/// per-subscription default offset and the group/session settings, which
/// live in `ConsumerConfig`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bootstrap list of `host:port` pairs.
    pub seed_brokers: Vec<String>,
    /// Identifier sent in every request envelope.
    pub client_id: Option<String>,
    pub connect_timeout_secs: u64,
    pub socket_timeout_secs: u64,
    pub metadata_max_age_secs: u64,
    pub retry_backoff_millis: u64,
    pub retry_budget: u32,
    pub max_connection_idle_secs: u64,
    /// Handed opaquely to `network::authenticate`; this crate does not
    /// implement TLS negotiation itself.
    pub ssl_enabled: bool,
    pub sasl_gssapi_service_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            seed_brokers: Vec::new(),
            client_id: Some("kafka-group-client".to_owned()),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            metadata_max_age_secs: DEFAULT_METADATA_MAX_AGE_SECS,
            retry_backoff_millis: DEFAULT_RETRY_BACKOFF_MILLIS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            max_connection_idle_secs: DEFAULT_MAX_CONNECTION_IDLE_SECS,
            ssl_enabled: false,
            sasl_gssapi_service_name: None,
        }
    }
}

impl ClientConfig {
    pub fn new<I, S>(seed_brokers: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        ClientConfig { seed_brokers: seed_brokers.into_iter().map(Into::into).collect(), ..Default::default() }
    }

    pub fn with_client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout_secs = timeout.as_secs();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn metadata_max_age(&self) -> Duration {
        Duration::from_secs(self.metadata_max_age_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }

    pub fn max_connection_idle(&self) -> Duration {
        Duration::from_secs(self.max_connection_idle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_sane_timeouts() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout().as_secs(), DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.retry_budget, DEFAULT_RETRY_BUDGET);
    }

    #[test]
    fn test_builder_overrides_client_id() {
        let config = ClientConfig::new(vec!["localhost:9092"]).with_client_id("test-client");
        assert_eq!(config.client_id.as_ref().map(|s| s.as_str()), Some("test-client"));
        assert_eq!(config.seed_brokers, vec!["localhost:9092".to_owned()]);
    }
}
