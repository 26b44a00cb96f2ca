use std::time::Duration;

/// TLS configuration is an external collaborator (§1 scope); this carries
/// only the handful of knobs the core needs to decide *whether* to wrap the
/// transport, not how.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub ca_file: Option<String>,
    pub alpn: Vec<String>,
}

/// HTTP CONNECT tunnelling proxy, used for both raw TCP and WebSocket paths.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub host: String,
    pub port: u16,
    pub auth: Option<(String, String)>,
}

/// WebSocket transport options (§6): handshake path/sub-protocol are fixed
/// by the spec, only the optional transformer/validator hooks are
/// configurable here as type-erased callbacks owned by the caller.
#[derive(Default)]
pub struct WebSocketOptions {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SocketOptions {
    pub tcp_nodelay: bool,
    pub keepalive: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LastWill {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: mqttbytes::QoS,
    pub retain: bool,
}

#[derive(Debug, Clone)]
pub struct Login {
    pub username: String,
    pub password: String,
}

/// Reconnect backoff bounds (§4.6). Defaults match the spec: 1s .. 128s.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectOptions {
    pub min_sec: u64,
    pub max_sec: u64,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        ReconnectOptions { min_sec: 1, max_sec: 128 }
    }
}

/// Connection identity and configuration (§3 `Connection`). Attributes here
/// may only be changed while the connection is `Disconnected` or
/// `Connected` — `Connection::configure_*` enforces that gate, this struct
/// is just the bag of values.
#[derive(Debug, Clone)]
pub struct MqttOptions {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) client_id: String,
    pub(crate) clean_session: bool,
    pub(crate) keep_alive: Duration,
    pub(crate) ping_timeout: Duration,
    pub(crate) operation_timeout: Option<Duration>,
    pub(crate) credentials: Option<Login>,
    pub(crate) last_will: Option<LastWill>,
    pub(crate) reconnect: ReconnectOptions,
    pub(crate) socket_options: SocketOptions,
    pub(crate) max_packet_size: usize,
}

impl MqttOptions {
    pub fn new<S: Into<String>, H: Into<String>>(client_id: S, host: H, port: u16) -> MqttOptions {
        MqttOptions {
            host: host.into(),
            port,
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(10),
            operation_timeout: Some(Duration::from_secs(10)),
            credentials: None,
            last_will: None,
            reconnect: ReconnectOptions::default(),
            socket_options: SocketOptions::default(),
            max_packet_size: 256 * 1024,
        }
    }

    pub fn set_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn set_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive = Duration::from_secs(secs as u64);
        self
    }

    pub fn set_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn set_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn set_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Login { username: username.into(), password: password.into() });
        self
    }

    pub fn set_last_will(mut self, will: LastWill) -> Self {
        self.last_will = Some(will);
        self
    }

    pub fn set_reconnect_options(mut self, min_sec: u64, max_sec: u64) -> Self {
        self.reconnect = ReconnectOptions { min_sec, max_sec };
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// §4.6 mandatory invariant: keep_alive must outlast ping_timeout or a
    /// PINGREQ deadline could fire before the next PINGREQ is even due.
    pub fn validate(&self) -> Result<(), crate::error::ConnectionError> {
        if self.keep_alive > Duration::from_secs(0) && self.keep_alive <= self.ping_timeout {
            return Err(crate::error::ConnectionError::KeepAliveTooShort {
                keep_alive_secs: self.keep_alive.as_secs() as u16,
                ping_timeout_ms: self.ping_timeout.as_millis() as u64,
            });
        }
        Ok(())
    }
}
