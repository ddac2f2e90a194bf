//! MQTT 3.1.1 protocol client for embedded systems.
//!
//! The session layer talks to the broker through the [`ProtocolClient`] trait.
//! [`Client`] is the bundled implementation: it frames CONNECT, PUBLISH,
//! SUBSCRIBE and the keep-alive pings over any connector implementing
//! [`Connect`](crate::network::Connect) and
//! [`SecureTransport`](crate::network::tls::SecureTransport).
//!
//! There is no outbound queue and no retransmission or topic matching.
//! Acknowledgements from the broker are read and dropped;
//! inbound QoS 1 publishes are acknowledged so the broker stops resending them.

use crate::network::error::Error;
use crate::network::tls::SecureTransport;

/// MQTT client implementation.
pub mod client;

/// Packet framing and decoding.
pub mod packet;

pub use client::{Client, MAX_HOST_LEN, MAX_PACKETS_PER_POLL};
pub use packet::{MAX_PACKET_SIZE, Publish};

/// Quality of Service levels for MQTT messages.
///
/// ```rust
/// use mqtt_session::network::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::AtLeastOnce as u8, 1);
/// assert_eq!(QoS::from_bits(2), Some(QoS::ExactlyOnce));
/// assert_eq!(QoS::from_bits(3), None);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Decode the two QoS bits of a fixed header or SUBSCRIBE payload.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QoS {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "QoS{}", *self as u8)
    }
}

/// Connection state of a protocol client.
///
/// The numeric [`code`](State::code) follows the convention most Arduino-era
/// MQTT clients use, so log lines stay comparable across firmware versions:
/// negative values are local failures, positive values are CONNACK refusals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The broker did not answer within the transport's timeout.
    ConnectionTimeout,
    /// An established connection broke.
    ConnectionLost,
    /// The transport could not connect, or the handshake was malformed.
    ConnectFailed,
    /// Never connected, or cleanly disconnected.
    Disconnected,
    /// Session established.
    Connected,
    /// CONNACK 1: unacceptable protocol version.
    BadProtocol,
    /// CONNACK 2: client identifier rejected.
    BadClientId,
    /// CONNACK 3: server unavailable.
    Unavailable,
    /// CONNACK 4: bad username or password.
    BadCredentials,
    /// CONNACK 5: not authorized.
    Unauthorized,
}

impl State {
    /// Numeric state code, `0` when connected.
    pub fn code(self) -> i32 {
        match self {
            State::ConnectionTimeout => -4,
            State::ConnectionLost => -3,
            State::ConnectFailed => -2,
            State::Disconnected => -1,
            State::Connected => 0,
            State::BadProtocol => 1,
            State::BadClientId => 2,
            State::Unavailable => 3,
            State::BadCredentials => 4,
            State::Unauthorized => 5,
        }
    }

    /// Map a non-zero CONNACK return code onto a refusal state.
    ///
    /// Returns `None` for `0` (accepted) and for codes MQTT 3.1.1 does not
    /// define.
    pub fn from_return_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(State::BadProtocol),
            2 => Some(State::BadClientId),
            3 => Some(State::Unavailable),
            4 => Some(State::BadCredentials),
            5 => Some(State::Unauthorized),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for State {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.code())
    }
}

/// Parameters of a single CONNECT.
///
/// Empty `username` means no credentials are sent. `password` is only sent
/// together with a username, as MQTT 3.1.1 requires.
#[derive(Debug, Clone)]
pub struct ConnectOptions<'a> {
    /// The client identifier, unique per broker.
    pub client_id: &'a str,
    /// User name, may be empty.
    pub username: &'a str,
    /// Password, may be empty.
    pub password: &'a str,
    /// Ask the broker to drop any stored session for this client id.
    pub clean_session: bool,
    /// Keep-alive interval in seconds, `0` disables it.
    pub keep_alive_seconds: u16,
}

/// The operations the session layer needs from an MQTT client.
pub trait ProtocolClient {
    /// The secure socket underneath, for trust configuration and diagnostics.
    type Transport: SecureTransport;

    /// Set the broker endpoint used by the next [`connect`](Self::connect).
    fn set_server(&mut self, host: &str, port: u16) -> Result<(), Error>;

    /// Shared access to the secure socket.
    fn transport(&self) -> &Self::Transport;

    /// Exclusive access to the secure socket.
    fn transport_mut(&mut self) -> &mut Self::Transport;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;

    /// Current state; after a failed connect this explains why.
    fn state(&self) -> State;

    /// Open the transport and perform the CONNECT/CONNACK exchange.
    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), Error>;

    /// Send a PUBLISH.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retained: bool)
    -> Result<(), Error>;

    /// Send a SUBSCRIBE without waiting for the SUBACK.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error>;

    /// Run keep-alive and hand every received publish to `on_message`.
    ///
    /// Must not block longer than one transport read timeout. Does nothing
    /// while disconnected.
    fn poll<F: FnMut(&str, &[u8])>(&mut self, on_message: &mut F) -> Result<(), Error>;
}
