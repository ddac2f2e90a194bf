//! An MQTT client implementation based on the MQTT 3.1.1 specification.
//!
//! [`Client`] owns a connector and at most one live connection. It never
//! retries on its own: a failed connect or a broken connection leaves it in a
//! failure [`State`] until the caller connects again.

use super::packet::{self, Frame, MAX_PACKET_SIZE, RemainingLength};
use super::{ConnectOptions, ProtocolClient, QoS, State};
use crate::network::error::Error;
use crate::network::tls::SecureTransport;
use crate::network::{Close, Connect, Read, Write};
use crate::time::Clock;
use heapless::{String, Vec};

/// Longest broker host name the client stores.
pub const MAX_HOST_LEN: usize = 128;

/// Upper bound on packets handled by one [`poll`](ProtocolClient::poll), so a
/// chatty broker cannot starve the caller's loop.
pub const MAX_PACKETS_PER_POLL: usize = 8;

/// An MQTT 3.1.1 client.
///
/// # Type Parameters
///
/// * `N` - The connector, usually a TLS socket factory implementing
///   [`Connect`] and [`SecureTransport`]
/// * `K` - The clock used for keep-alive bookkeeping
///
/// # Examples
///
/// ```rust,no_run
/// use mqtt_session::network::error::Error;
/// use mqtt_session::network::mqtt::{Client, ConnectOptions, ProtocolClient, QoS};
/// use mqtt_session::network::tls::{SecureTransport, TlsError};
/// use mqtt_session::network::{Close, Connect, Connection, Read, Write};
/// use mqtt_session::time::Clock;
/// # struct Socket;
/// # impl Read for Socket {
/// #     type Error = Error;
/// #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Error> { Err(Error::Timeout) }
/// # }
/// # impl Write for Socket {
/// #     type Error = Error;
/// #     fn write(&mut self, buf: &[u8]) -> Result<usize, Error> { Ok(buf.len()) }
/// #     fn flush(&mut self) -> Result<(), Error> { Ok(()) }
/// # }
/// # impl Close for Socket {
/// #     type Error = Error;
/// #     fn close(self) -> Result<(), Error> { Ok(()) }
/// # }
/// # impl Connection for Socket {}
/// # struct Tls;
/// # impl Connect for Tls {
/// #     type Connection = Socket;
/// #     type Error = Error;
/// #     fn connect(&mut self, _host: &str, _port: u16) -> Result<Socket, Error> { Ok(Socket) }
/// # }
/// # impl SecureTransport for Tls {
/// #     fn set_insecure(&mut self) {}
/// #     fn set_fingerprint(&mut self, _fingerprint: &str) {}
/// #     fn last_error(&self) -> Option<TlsError> { None }
/// # }
/// # struct Millis;
/// # impl Clock for Millis { fn now_ms(&self) -> u64 { 0 } }
///
/// let mut client = Client::new(Tls, Millis);
/// client.set_server("broker.local", 8883)?;
/// client.connect(&ConnectOptions {
///     client_id: "sensor-01",
///     username: "",
///     password: "",
///     clean_session: true,
///     keep_alive_seconds: 15,
/// })?;
/// client.publish("sensors/temp", b"23.5", QoS::AtLeastOnce, true)?;
/// client.poll(&mut |topic: &str, payload: &[u8]| {
///     let _ = (topic, payload);
/// })?;
/// # Ok::<(), Error>(())
/// ```
pub struct Client<N: Connect, K> {
    connector: N,
    clock: K,
    connection: Option<N::Connection>,
    host: String<MAX_HOST_LEN>,
    port: u16,
    state: State,
    keep_alive_ms: u64,
    last_outbound_ms: u64,
    last_inbound_ms: u64,
    ping_outstanding: bool,
    packet_id: u16,
    partial: Partial,
}

impl<N: Connect, K> core::fmt::Debug for Client<N, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("keep_alive_ms", &self.keep_alive_ms)
            .field("ping_outstanding", &self.ping_outstanding)
            .finish()
    }
}

/// What one read attempt produced.
enum Received {
    /// No complete packet yet; any bytes read so far stay in [`Partial`].
    Nothing,
    /// A complete packet; its fixed header byte. The body is in the buffer.
    Packet(u8),
    /// A packet too large for the buffer was read and thrown away.
    Discarded(u8, usize),
}

/// An inbound packet being assembled across polls.
///
/// A read timeout in the middle of a packet leaves the bytes read so far
/// here, and the next poll continues where this one stopped.
#[derive(Debug, Default)]
struct Partial {
    first: Option<u8>,
    length: RemainingLength,
    size: Option<usize>,
    body: Vec<u8, MAX_PACKET_SIZE>,
    read: usize,
}

impl<N: Connect, K> Client<N, K> {
    /// Create a disconnected client. No I/O happens until
    /// [`connect`](ProtocolClient::connect).
    pub fn new(connector: N, clock: K) -> Self {
        Self {
            connector,
            clock,
            connection: None,
            host: String::new(),
            port: 0,
            state: State::Disconnected,
            keep_alive_ms: 0,
            last_outbound_ms: 0,
            last_inbound_ms: 0,
            ping_outstanding: false,
            packet_id: 0,
            partial: Partial::default(),
        }
    }

    /// The configured broker host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured broker port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Next non-zero packet identifier.
    fn next_packet_id(&mut self) -> u16 {
        self.packet_id = self.packet_id.wrapping_add(1);
        if self.packet_id == 0 {
            self.packet_id = 1;
        }
        self.packet_id
    }

    fn drop_connection(&mut self, state: State) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
        self.state = state;
        self.ping_outstanding = false;
        self.partial = Partial::default();
    }
}

impl<N, K> Client<N, K>
where
    N: Connect + SecureTransport,
    N::Connection: Read<Error = Error> + Write<Error = Error>,
    K: Clock,
{
    /// Send a DISCONNECT and close the connection.
    ///
    /// The broker discards the will message and, for a clean session, the
    /// session state.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if self.connection.is_none() {
            self.state = State::Disconnected;
            return Ok(());
        }
        let result = packet::disconnect().and_then(|frame| self.send(&frame));
        self.drop_connection(State::Disconnected);
        result
    }

    fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::NotOpen);
        };
        match frame.write_to(connection) {
            Ok(()) => {
                self.last_outbound_ms = self.clock.now_ms();
                Ok(())
            }
            Err(e) => {
                warn!("mqtt: write failed, dropping connection: {:?}", e);
                self.drop_connection(State::ConnectionLost);
                Err(e)
            }
        }
    }

    fn keep_alive(&mut self) -> Result<(), Error> {
        if self.keep_alive_ms == 0 {
            return Ok(());
        }
        let now = self.clock.now_ms();
        let idle_in = now.saturating_sub(self.last_inbound_ms);
        let idle_out = now.saturating_sub(self.last_outbound_ms);
        if idle_in < self.keep_alive_ms && idle_out < self.keep_alive_ms {
            return Ok(());
        }

        if self.ping_outstanding {
            warn!("mqtt: no PINGRESP within {} ms", self.keep_alive_ms);
            self.drop_connection(State::ConnectionTimeout);
            return Err(Error::Timeout);
        }

        trace!("mqtt: sending PINGREQ");
        self.send(&packet::pingreq()?)?;
        self.last_inbound_ms = now;
        self.ping_outstanding = true;
        Ok(())
    }

    fn read_packet<F>(&mut self, on_message: &mut F) -> Result<bool, Error>
    where
        F: FnMut(&str, &[u8]),
    {
        let received = match self.connection.as_mut() {
            Some(connection) => receive(connection, &mut self.partial),
            None => return Ok(false),
        };

        let first = match received {
            Ok(Received::Nothing) => return Ok(false),
            Ok(Received::Packet(first)) => first,
            Ok(Received::Discarded(first, len)) => {
                warn!(
                    "mqtt: dropped packet type {} of {} bytes, buffer holds {}",
                    first >> 4,
                    len,
                    MAX_PACKET_SIZE
                );
                self.partial = Partial::default();
                self.last_inbound_ms = self.clock.now_ms();
                return Ok(true);
            }
            Err(e) => {
                warn!("mqtt: read failed, dropping connection: {:?}", e);
                self.drop_connection(State::ConnectionLost);
                return Err(e);
            }
        };

        let packet = core::mem::take(&mut self.partial);
        self.last_inbound_ms = self.clock.now_ms();
        self.dispatch(first, &packet.body, on_message)?;
        Ok(true)
    }

    fn dispatch<F>(&mut self, first: u8, body: &[u8], on_message: &mut F) -> Result<(), Error>
    where
        F: FnMut(&str, &[u8]),
    {
        match first & 0xF0 {
            packet::PUBLISH => {
                let publish = match packet::decode_publish(first, body) {
                    Ok(publish) => publish,
                    Err(e) => {
                        warn!("mqtt: malformed PUBLISH, dropping connection");
                        self.drop_connection(State::ConnectionLost);
                        return Err(e);
                    }
                };
                trace!(
                    "mqtt: received [{}] {} bytes",
                    publish.topic,
                    publish.payload.len()
                );
                on_message(publish.topic, publish.payload);
                if let (QoS::AtLeastOnce, Some(id)) = (publish.qos, publish.packet_id) {
                    self.send(&packet::puback(id)?)?;
                }
            }
            packet::PINGREQ => self.send(&packet::pingresp()?)?,
            packet::PINGRESP => self.ping_outstanding = false,
            packet::PUBACK | packet::SUBACK | packet::UNSUBACK => {
                trace!("mqtt: ack type {}", first >> 4);
            }
            _ => debug!("mqtt: ignoring packet type {}", first >> 4),
        }
        Ok(())
    }
}

impl<N, K> ProtocolClient for Client<N, K>
where
    N: Connect + SecureTransport,
    N::Connection: Read<Error = Error> + Write<Error = Error>,
    K: Clock,
{
    type Transport = N;

    fn set_server(&mut self, host: &str, port: u16) -> Result<(), Error> {
        if host.is_empty() || port == 0 {
            return Err(Error::InvalidAddress);
        }
        let mut owned = String::new();
        owned.push_str(host).map_err(|_| Error::InvalidAddress)?;
        self.host = owned;
        self.port = port;
        Ok(())
    }

    fn transport(&self) -> &N {
        &self.connector
    }

    fn transport_mut(&mut self) -> &mut N {
        &mut self.connector
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some() && self.state == State::Connected
    }

    fn state(&self) -> State {
        self.state
    }

    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), Error> {
        self.drop_connection(State::Disconnected);

        if self.host.is_empty() {
            self.state = State::ConnectFailed;
            return Err(Error::InvalidAddress);
        }

        let frame = match packet::connect(options) {
            Ok(frame) => frame,
            Err(e) => {
                self.state = State::ConnectFailed;
                return Err(e);
            }
        };

        let mut connection = match self.connector.connect(&self.host, self.port) {
            Ok(connection) => connection,
            Err(_) => {
                debug!("mqtt: transport could not reach {}:{}", self.host.as_str(), self.port);
                self.state = State::ConnectFailed;
                return Err(Error::ConnectionRefused);
            }
        };

        if let Err(e) = frame.write_to(&mut connection) {
            let _ = connection.close();
            self.state = State::ConnectFailed;
            return Err(e);
        }

        let mut connack = [0u8; 4];
        if let Err(e) = read_exact(&mut connection, &mut connack) {
            let _ = connection.close();
            self.state = if e == Error::Timeout {
                State::ConnectionTimeout
            } else {
                State::ConnectFailed
            };
            return Err(e);
        }

        let code = match packet::decode_connack(&connack) {
            Ok(code) => code,
            Err(e) => {
                let _ = connection.close();
                self.state = State::ConnectFailed;
                return Err(e);
            }
        };

        if code != 0 {
            let _ = connection.close();
            return match State::from_return_code(code) {
                Some(refused) => {
                    self.state = refused;
                    Err(Error::ConnectionRefused)
                }
                None => {
                    self.state = State::ConnectFailed;
                    Err(Error::ProtocolError)
                }
            };
        }

        let now = self.clock.now_ms();
        self.connection = Some(connection);
        self.state = State::Connected;
        self.keep_alive_ms = u64::from(options.keep_alive_seconds) * 1000;
        self.last_inbound_ms = now;
        self.last_outbound_ms = now;
        self.ping_outstanding = false;
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotOpen);
        }
        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            _ => self.next_packet_id(),
        };
        let frame = packet::publish(topic, payload, qos, retained, packet_id)?;
        self.send(&frame)
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotOpen);
        }
        let packet_id = self.next_packet_id();
        let frame = packet::subscribe(topic, qos, packet_id)?;
        self.send(&frame)
    }

    fn poll<F>(&mut self, on_message: &mut F) -> Result<(), Error>
    where
        F: FnMut(&str, &[u8]),
    {
        if !self.is_connected() {
            return Ok(());
        }
        self.keep_alive()?;
        for _ in 0..MAX_PACKETS_PER_POLL {
            if !self.read_packet(on_message)? {
                break;
            }
        }
        Ok(())
    }
}

fn read_exact<C>(connection: &mut C, mut buf: &mut [u8]) -> Result<(), Error>
where
    C: Read<Error = Error>,
{
    while !buf.is_empty() {
        match connection.read(buf) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => buf = &mut buf[n..],
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn read_byte<C>(connection: &mut C) -> Result<Option<u8>, Error>
where
    C: Read<Error = Error>,
{
    let mut byte = [0u8; 1];
    match connection.read(&mut byte) {
        Ok(0) => Err(Error::ConnectionClosed),
        Ok(_) => Ok(Some(byte[0])),
        Err(Error::Timeout) => Ok(None),
        Err(e) => Err(e),
    }
}

fn receive<C>(connection: &mut C, partial: &mut Partial) -> Result<Received, Error>
where
    C: Read<Error = Error>,
{
    let first = match partial.first {
        Some(first) => first,
        None => {
            let Some(byte) = read_byte(connection)? else {
                return Ok(Received::Nothing);
            };
            partial.first = Some(byte);
            byte
        }
    };

    let size = loop {
        if let Some(size) = partial.size {
            break size;
        }
        let Some(byte) = read_byte(connection)? else {
            return Ok(Received::Nothing);
        };
        if let Some(size) = partial.length.push(byte)? {
            if size <= MAX_PACKET_SIZE {
                partial
                    .body
                    .resize(size, 0)
                    .map_err(|_| Error::PacketTooLarge)?;
            }
            partial.size = Some(size);
        }
    };

    // oversized packets are read into scratch space and thrown away
    while partial.read < size {
        let result = if size > MAX_PACKET_SIZE {
            let mut scratch = [0u8; 64];
            let chunk = (size - partial.read).min(scratch.len());
            connection.read(&mut scratch[..chunk])
        } else {
            connection.read(&mut partial.body[partial.read..])
        };
        match result {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => partial.read += n,
            Err(Error::Timeout) => return Ok(Received::Nothing),
            Err(e) => return Err(e),
        }
    }

    if size > MAX_PACKET_SIZE {
        Ok(Received::Discarded(first, size))
    } else {
        Ok(Received::Packet(first))
    }
}
