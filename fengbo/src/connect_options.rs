// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use codec::utils::random_client_id;
use codec::v5::{Properties, Will};

use crate::auth::Authenticator;
use crate::error::{Error, ErrorKind};

/// Default port of plain MQTT protocol.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default port of MQTT over TLS.
pub const DEFAULT_MQTTS_PORT: u16 = 8883;

/// A broker endpoint in `host[:port][/path]` form.
///
/// The path part is only used by WebSocket transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Parse an endpoint from `host[:port][/path]`.
    ///
    /// # Errors
    ///
    /// Returns error if `authority` has an empty host or an unparsable port.
    pub fn parse(authority: &str, default_port: u16) -> Result<Self, Error> {
        let (addr, path) = match authority.find('/') {
            Some(index) => (&authority[..index], &authority[index..]),
            None => (authority, "/"),
        };

        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::from_string(
                        ErrorKind::InvalidAddress,
                        format!("Invalid port in broker address: {authority}"),
                    )
                })?;
                (host, port)
            }
            None => (addr, default_port),
        };
        if host.is_empty() {
            return Err(Error::from_string(
                ErrorKind::InvalidAddress,
                format!("Empty host in broker address: {authority}"),
            ));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            path: path.to_owned(),
        })
    }

    /// Get host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get port number.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Get URL path, used by WebSocket transports only.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How TLS certificates are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsType {
    /// Signed by a well known root CA, like `Let's Encrypt`.
    CASigned,

    /// Self signed CA file generated with `openssl` or other tools.
    SelfSigned {
        /// Path to root ca file in PEM format.
        root_ca_pem: PathBuf,
    },
}

/// Transport used to reach the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectType {
    /// Plain TCP.
    Mqtt,

    /// TCP with TLS.
    Mqtts(TlsType),

    /// WebSocket over TCP.
    Ws,

    /// WebSocket over TLS.
    Wss(TlsType),
}

/// Client configuration, collected before `Session` is created.
///
/// All setters are chainable.
pub struct ConnectOptions {
    endpoints: Vec<Endpoint>,
    connect_type: ConnectType,

    client_id: String,
    username: Option<String>,
    password: Option<Vec<u8>>,
    keep_alive: u16,
    clean_start: bool,
    will: Option<Will>,
    connect_properties: Properties,
    authenticator: Option<Box<dyn Authenticator>>,

    connect_timeout: Duration,
    operation_timeout: Option<Duration>,
    reconnect_min_delay: Duration,
    reconnect_max_delay: Duration,

    /// Overrides the SNI host name sent during the TLS handshake.
    /// When unset the endpoint host is used.
    tls_server_name: Option<String>,

    /// Treat CONNACK `session_present=1` with an empty local in-flight
    /// table as a protocol error instead of accepting it silently.
    strict_session_present: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            connect_type: ConnectType::Mqtt,
            client_id: random_client_id(12),
            username: None,
            password: None,
            keep_alive: 60,
            clean_start: true,
            will: None,
            connect_properties: Properties::new(),
            authenticator: None,
            connect_timeout: Duration::from_secs(10),
            operation_timeout: None,
            reconnect_min_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            tls_server_name: None,
            strict_session_present: false,
        }
    }
}

impl ConnectOptions {
    /// Create options with a generated client id and no broker endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the broker list with `authorities`, each in
    /// `host[:port][/path]` form; `default_port` fills in missing ports.
    ///
    /// Brokers are tried in list order, round-robin, with exponential
    /// backoff between full rounds.
    ///
    /// # Errors
    ///
    /// Returns error if one of `authorities` cannot be parsed.
    pub fn brokers<I, S>(&mut self, authorities: I, default_port: u16) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.endpoints.clear();
        for authority in authorities {
            self.endpoints
                .push(Endpoint::parse(authority.as_ref(), default_port)?);
        }
        Ok(self)
    }

    /// Get current broker list.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Update transport type.
    pub fn set_connect_type(&mut self, connect_type: ConnectType) -> &mut Self {
        self.connect_type = connect_type;
        self
    }

    /// Get current transport type.
    #[must_use]
    pub const fn connect_type(&self) -> &ConnectType {
        &self.connect_type
    }

    /// Update MQTT credentials.
    ///
    /// An empty `client_id` asks the broker to assign one; the assigned
    /// value is adopted from the CONNACK.
    pub fn credentials(
        &mut self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> &mut Self {
        self.client_id = client_id.to_owned();
        self.username = username.map(str::to_owned);
        self.password = password.map(<[u8]>::to_vec);
        self
    }

    /// Get current client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get current username.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Get current password.
    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    /// Update keep alive value in seconds; 0 disables keep alive.
    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Get current keep alive value.
    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    /// Update clean start flag.
    pub fn set_clean_start(&mut self, clean_start: bool) -> &mut Self {
        self.clean_start = clean_start;
        self
    }

    /// Get current clean start flag.
    #[must_use]
    pub const fn clean_start(&self) -> bool {
        self.clean_start
    }

    /// Update last will message.
    pub fn set_will(&mut self, will: Option<Will>) -> &mut Self {
        self.will = will;
        self
    }

    /// Get current last will message.
    #[must_use]
    pub const fn will(&self) -> Option<&Will> {
        self.will.as_ref()
    }

    /// Replace CONNECT packet properties.
    pub fn set_connect_properties(&mut self, properties: Properties) -> &mut Self {
        self.connect_properties = properties;
        self
    }

    /// Get current CONNECT packet properties.
    #[must_use]
    pub const fn connect_properties(&self) -> &Properties {
        &self.connect_properties
    }

    /// Install the enhanced authentication exchange used during handshakes
    /// and re-authentication [MQTT-4.12].
    pub fn authenticator(&mut self, authenticator: Box<dyn Authenticator>) -> &mut Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Take the configured authenticator out, leaving `None`.
    pub(crate) fn take_authenticator(&mut self) -> Option<Box<dyn Authenticator>> {
        self.authenticator.take()
    }

    /// Update connect timeout covering TCP connect, TLS handshake,
    /// WebSocket upgrade and the CONNECT/CONNACK exchange.
    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Get current connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Update per-operation deadline; `None` waits indefinitely.
    pub fn set_operation_timeout(&mut self, operation_timeout: Option<Duration>) -> &mut Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// Get current per-operation deadline.
    #[must_use]
    pub const fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }

    /// Update reconnect backoff range. The delay starts at `min`, doubles
    /// after each failed round over the broker list, and is capped at `max`.
    pub fn set_reconnect_delay(&mut self, min: Duration, max: Duration) -> &mut Self {
        self.reconnect_min_delay = min;
        self.reconnect_max_delay = max;
        self
    }

    /// Get current minimum reconnect delay.
    #[must_use]
    pub const fn reconnect_min_delay(&self) -> Duration {
        self.reconnect_min_delay
    }

    /// Get current maximum reconnect delay.
    #[must_use]
    pub const fn reconnect_max_delay(&self) -> Duration {
        self.reconnect_max_delay
    }

    /// Override the SNI host name sent during the TLS handshake.
    pub fn set_tls_server_name(&mut self, name: Option<&str>) -> &mut Self {
        self.tls_server_name = name.map(str::to_owned);
        self
    }

    /// Get current SNI override.
    #[must_use]
    pub fn tls_server_name(&self) -> Option<&str> {
        self.tls_server_name.as_deref()
    }

    /// Update strict session-present checking.
    pub fn set_strict_session_present(&mut self, strict: bool) -> &mut Self {
        self.strict_session_present = strict;
        self
    }

    /// Get current strict session-present flag.
    #[must_use]
    pub const fn strict_session_present(&self) -> bool {
        self.strict_session_present
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("endpoints", &self.endpoints)
            .field("connect_type", &self.connect_type)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("keep_alive", &self.keep_alive)
            .field("clean_start", &self.clean_start)
            .field("will", &self.will)
            .field("connect_properties", &self.connect_properties)
            .field(
                "authenticator",
                &self.authenticator.as_ref().map(|a| a.method().to_owned()),
            )
            .field("connect_timeout", &self.connect_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("reconnect_min_delay", &self.reconnect_min_delay)
            .field("reconnect_max_delay", &self.reconnect_max_delay)
            .field("tls_server_name", &self.tls_server_name)
            .field("strict_session_present", &self.strict_session_present)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let endpoint = Endpoint::parse("broker.emqx.io", DEFAULT_MQTT_PORT).unwrap();
        assert_eq!(endpoint.host(), "broker.emqx.io");
        assert_eq!(endpoint.port(), 1883);
        assert_eq!(endpoint.path(), "/");

        let endpoint = Endpoint::parse("127.0.0.1:8883", DEFAULT_MQTT_PORT).unwrap();
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 8883);

        let endpoint = Endpoint::parse("ws.example.com:8083/mqtt", DEFAULT_MQTT_PORT).unwrap();
        assert_eq!(endpoint.host(), "ws.example.com");
        assert_eq!(endpoint.port(), 8083);
        assert_eq!(endpoint.path(), "/mqtt");
    }

    #[test]
    fn test_endpoint_parse_invalid() {
        assert!(Endpoint::parse("", DEFAULT_MQTT_PORT).is_err());
        assert!(Endpoint::parse(":1883", DEFAULT_MQTT_PORT).is_err());
        assert!(Endpoint::parse("host:not-a-port", DEFAULT_MQTT_PORT).is_err());
    }

    #[test]
    fn test_brokers_round_robin_order() {
        let mut options = ConnectOptions::new();
        options
            .brokers(["first:1883", "second", "third:2883"], DEFAULT_MQTT_PORT)
            .unwrap();
        let hosts: Vec<&str> = options.endpoints().iter().map(Endpoint::host).collect();
        assert_eq!(hosts, vec!["first", "second", "third"]);
        assert_eq!(options.endpoints()[1].port(), DEFAULT_MQTT_PORT);
    }
}
