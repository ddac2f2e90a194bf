//! # Connection manager
//!
//! Keeps one MQTT session alive from a cooperative main loop.
//!
//! ## Design
//!
//! The manager is a two-state machine, `Disconnected` and `Connected`, driven
//! entirely by [`ConnectionManager::tick`]:
//!
//! * While disconnected, every tick checks the backoff gate. At most one
//!   connect attempt is made per [`BACKOFF_INTERVAL_MS`] after a failure.
//! * A successful connect re-subscribes every configured topic, in order,
//!   before `tick` returns.
//! * A dropped connection is noticed on the next tick through
//!   [`ProtocolClient::is_connected`]; there is no failure callback.
//! * Every tick, connected or not, hands control to
//!   [`ProtocolClient::poll`] for keep-alive and inbound messages.
//!
//! Nothing here sleeps. The only way to stop reconnecting is to stop calling
//! `tick`.
//!
//! ## Session continuity
//!
//! The clean-session flag is chosen per attempt. If the last successful
//! connect was at most [`SESSION_RETENTION_MS`] ago the broker is asked to
//! resume the session, so in-flight QoS 1 deliveries continue. Otherwise, and
//! on the very first connect, the session starts clean. The timestamp is only
//! written by a successful [`reconnect`](ConnectionManager::reconnect).
//!
//! ```rust,no_run
//! use mqtt_session::config::Config;
//! use mqtt_session::network::mqtt::Client;
//! use mqtt_session::session::ConnectionManager;
//! # use mqtt_session::network::error::Error;
//! # use mqtt_session::network::tls::{SecureTransport, TlsError};
//! # use mqtt_session::network::{Close, Connect, Connection, Read, Write};
//! # use mqtt_session::time::Clock;
//! # struct Socket;
//! # impl Read for Socket {
//! #     type Error = Error;
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Error> { Err(Error::Timeout) }
//! # }
//! # impl Write for Socket {
//! #     type Error = Error;
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Error> { Ok(()) }
//! # }
//! # impl Close for Socket {
//! #     type Error = Error;
//! #     fn close(self) -> Result<(), Error> { Ok(()) }
//! # }
//! # impl Connection for Socket {}
//! # struct Tls;
//! # impl Connect for Tls {
//! #     type Connection = Socket;
//! #     type Error = Error;
//! #     fn connect(&mut self, _host: &str, _port: u16) -> Result<Socket, Error> { Ok(Socket) }
//! # }
//! # impl SecureTransport for Tls {
//! #     fn set_insecure(&mut self) {}
//! #     fn set_fingerprint(&mut self, _fingerprint: &str) {}
//! #     fn last_error(&self) -> Option<TlsError> { None }
//! # }
//! # #[derive(Clone, Copy)]
//! # struct Millis;
//! # impl Clock for Millis { fn now_ms(&self) -> u64 { 0 } }
//!
//! let config = Config::new("broker.local", 8883, "hall-light")
//!     .with_topics(&["hall/light/set", "hall/light/brightness"])
//!     .unwrap();
//! let client = Client::new(Tls, Millis);
//! let mut mqtt = ConnectionManager::new(config, client, Millis, |topic: &str, payload: &[u8]| {
//!     let _ = (topic, payload);
//! })?;
//!
//! loop {
//!     mqtt.tick();
//!     mqtt.publish("hall/light/state", b"on");
//! #   break;
//! }
//! # Ok::<(), Error>(())
//! ```

use crate::config::Config;
use crate::network::error::Error;
use crate::network::mqtt::{ConnectOptions, ProtocolClient, QoS, State};
use crate::network::tls::{SecureTransport, TlsError, TlsMode};
use crate::time::Clock;

/// Minimum time between a failed connect attempt and the next one.
pub const BACKOFF_INTERVAL_MS: u64 = 5_000;

/// Outage length after which a clean session is requested.
pub const SESSION_RETENTION_MS: u64 = 10_000;

/// QoS used for every publish.
pub const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// QoS requested for every subscription.
pub const SUBSCRIBE_QOS: QoS = QoS::AtMostOnce;

/// Why the last connect attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    /// When the attempt was made, in clock milliseconds.
    pub at_ms: u64,
    /// Protocol client state after the attempt.
    pub state: State,
    /// Secure socket diagnostics, only collected when pinning is active.
    pub tls: Option<TlsError>,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectFailure {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "rc={} at {} ms", self.state, self.at_ms);
        if let Some(tls) = &self.tls {
            defmt::write!(f, " tls={}", tls);
        }
    }
}

/// Owns the MQTT session and keeps it connected.
///
/// # Type Parameters
///
/// * `P` - The protocol client, normally [`Client`](crate::network::mqtt::Client)
/// * `K` - The clock driving backoff and session retention
/// * `F` - Callback receiving `(topic, payload)` for every inbound message
pub struct ConnectionManager<'a, P, K, F> {
    config: Config<'a>,
    client: P,
    clock: K,
    on_message: F,
    last_connected_ms: Option<u64>,
    last_failure: Option<ConnectFailure>,
}

impl<P, K, F> core::fmt::Debug for ConnectionManager<'_, P, K, F>
where
    P: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("client", &self.client)
            .field("last_connected_ms", &self.last_connected_ms)
            .field("last_failure", &self.last_failure)
            .finish()
    }
}

impl<'a, P, K, F> ConnectionManager<'a, P, K, F>
where
    P: ProtocolClient,
    K: Clock,
    F: FnMut(&str, &[u8]),
{
    /// Configure `client` for the broker in `config`.
    ///
    /// Sets the server endpoint and the TLS trust mode. No network I/O
    /// happens; the first connect attempt is made by the first
    /// [`tick`](Self::tick).
    pub fn new(config: Config<'a>, mut client: P, clock: K, on_message: F) -> Result<Self, Error> {
        client.set_server(config.host, config.port)?;

        let mode = config.tls_mode();
        client.transport_mut().apply(mode);
        match mode {
            TlsMode::Insecure => {
                warn!("mqtt: no fingerprint configured, broker certificate is not verified")
            }
            TlsMode::Fingerprint(fingerprint) => {
                debug!("mqtt: pinning broker certificate {}", fingerprint)
            }
        }

        Ok(Self {
            config,
            client,
            clock,
            on_message,
            last_connected_ms: None,
            last_failure: None,
        })
    }

    /// Drive the session. Call this often from the main loop.
    ///
    /// Reconnects when needed (subject to the backoff gate) and lets the
    /// protocol client process keep-alive and inbound messages.
    pub fn tick(&mut self) {
        if !self.client.is_connected() {
            self.reconnect();
        }

        if let Err(e) = self.client.poll(&mut self.on_message) {
            warn!("mqtt: connection lost: {:?}", e);
        }
    }

    /// Try to connect if the backoff window since the last failure elapsed.
    ///
    /// Returns `true` if a connect attempt was made and succeeded.
    pub fn reconnect(&mut self) -> bool {
        let now = self.clock.now_ms();

        if let Some(failure) = &self.last_failure {
            if now.saturating_sub(failure.at_ms) < BACKOFF_INTERVAL_MS {
                return false;
            }
        }

        let clean_session = self.use_clean_session(now);
        if clean_session {
            info!(
                "mqtt: attempting connection to {}:{}, clean session",
                self.config.host, self.config.port
            );
        } else {
            info!(
                "mqtt: attempting connection to {}:{}, resuming session",
                self.config.host, self.config.port
            );
        }

        let options = ConnectOptions {
            client_id: self.config.device_id,
            username: self.config.username,
            password: self.config.password,
            clean_session,
            keep_alive_seconds: self.config.keep_alive_seconds,
        };

        match self.client.connect(&options) {
            Ok(()) => {
                info!("mqtt: connected to {}", self.config.host);
                self.last_connected_ms = Some(now);
                self.last_failure = None;
                self.resubscribe();
                true
            }
            Err(e) => {
                let state = self.client.state();
                let tls = if self.config.tls_mode().is_pinned() {
                    self.client.transport().last_error()
                } else {
                    None
                };
                match &tls {
                    Some(tls) => error!(
                        "mqtt: connection to {} failed ({:?}), rc={}, tls error {}: {}, retrying in {} ms",
                        self.config.host,
                        e,
                        state.code(),
                        tls.code,
                        tls.description.as_str(),
                        BACKOFF_INTERVAL_MS
                    ),
                    None => error!(
                        "mqtt: connection to {} failed ({:?}), rc={}, retrying in {} ms",
                        self.config.host,
                        e,
                        state.code(),
                        BACKOFF_INTERVAL_MS
                    ),
                }
                self.last_failure = Some(ConnectFailure {
                    at_ms: now,
                    state,
                    tls,
                });
                false
            }
        }
    }

    fn use_clean_session(&self, now: u64) -> bool {
        match self.last_connected_ms {
            None => true,
            Some(at) => now.saturating_sub(at) > SESSION_RETENTION_MS,
        }
    }

    fn resubscribe(&mut self) {
        let topics = self.config.topics.clone();
        for topic in &topics {
            self.subscribe(topic);
        }
    }

    /// Publish a retained message at QoS 1.
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        self.publish_with_retain(topic, payload, true)
    }

    /// Publish at QoS 1 with an explicit retain flag.
    ///
    /// Returns `false` if the message could not be handed to the broker,
    /// for example while disconnected. Nothing is queued or retried.
    pub fn publish_with_retain(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool {
        match core::str::from_utf8(payload) {
            Ok(text) => debug!("mqtt: publish [{}]: {}", topic, text),
            Err(_) => debug!("mqtt: publish [{}]: {} bytes", topic, payload.len()),
        }

        match self.client.publish(topic, payload, PUBLISH_QOS, retained) {
            Ok(()) => true,
            Err(e) => {
                warn!("mqtt: unable to publish to [{}]: {:?}", topic, e);
                false
            }
        }
    }

    /// Subscribe to a topic filter. The SUBACK is not awaited.
    pub fn subscribe(&mut self, topic: &str) {
        match self.client.subscribe(topic, SUBSCRIBE_QOS) {
            Ok(()) => info!("mqtt: subscribed to '{}'", topic),
            Err(e) => warn!("mqtt: unable to subscribe to '{}': {:?}", topic, e),
        }
    }

    /// Whether the protocol client currently holds a session.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// The configured topic list.
    pub fn topics(&self) -> &[&'a str] {
        &self.config.topics
    }

    /// The configuration the manager was built with.
    pub fn config(&self) -> &Config<'a> {
        &self.config
    }

    /// Diagnostics of the most recent failed attempt, cleared on success.
    pub fn last_failure(&self) -> Option<&ConnectFailure> {
        self.last_failure.as_ref()
    }

    /// The protocol client.
    pub fn client(&self) -> &P {
        &self.client
    }

    /// Mutable access to the protocol client.
    pub fn client_mut(&mut self) -> &mut P {
        &mut self.client
    }
}
