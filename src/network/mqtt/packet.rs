//! MQTT 3.1.1 packet framing.
//!
//! Every outgoing packet is built into a [`Frame`]: a fixed header of at most
//! five bytes plus a body in a fixed-size buffer. Nothing here touches the
//! network except [`Frame::write_to`].

use super::{ConnectOptions, QoS};
use crate::network::Write;
use crate::network::error::Error;
use heapless::Vec;

// MQTT Control Packet types - these are the fixed header packet type values
/// MQTT CONNECT packet type identifier.
pub const CONNECT: u8 = 0x10;
/// MQTT CONNACK packet type identifier.
pub const CONNACK: u8 = 0x20;
/// MQTT PUBLISH packet type identifier.
pub const PUBLISH: u8 = 0x30;
/// MQTT PUBACK packet type identifier.
pub const PUBACK: u8 = 0x40;
/// MQTT SUBSCRIBE packet type identifier, including the mandatory flags.
pub const SUBSCRIBE: u8 = 0x82;
/// MQTT SUBACK packet type identifier.
pub const SUBACK: u8 = 0x90;
/// MQTT UNSUBACK packet type identifier.
pub const UNSUBACK: u8 = 0xB0;
/// MQTT PINGREQ packet type identifier.
pub const PINGREQ: u8 = 0xC0;
/// MQTT PINGRESP packet type identifier.
pub const PINGRESP: u8 = 0xD0;
/// MQTT DISCONNECT packet type identifier.
pub const DISCONNECT: u8 = 0xE0;

/// MQTT protocol name as defined in the specification.
const PROTOCOL_NAME: &str = "MQTT";
/// MQTT protocol level for version 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

const FLAG_USERNAME: u8 = 0x80;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_CLEAN_SESSION: u8 = 0x02;

/// Largest packet body, in either direction, the client handles.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Largest value the variable-length encoding can carry.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// An outgoing packet.
#[derive(Debug, Clone)]
pub struct Frame {
    header: Vec<u8, 5>,
    body: Vec<u8, MAX_PACKET_SIZE>,
}

impl Frame {
    fn new(packet_type: u8) -> Self {
        let mut header = Vec::new();
        // An empty Vec<u8, 5> always has room for one byte.
        let _ = header.push(packet_type);
        Self {
            header,
            body: Vec::new(),
        }
    }

    /// Fixed header: packet type, flags and the encoded remaining length.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Variable header and payload.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Total number of bytes on the wire.
    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    /// Whether the frame is empty. Never true for a finished frame.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.body
            .extend_from_slice(bytes)
            .map_err(|_| Error::PacketTooLarge)
    }

    fn put_u8(&mut self, value: u8) -> Result<(), Error> {
        self.body.push(value).map_err(|_| Error::PacketTooLarge)
    }

    fn put_u16(&mut self, value: u16) -> Result<(), Error> {
        self.put(&value.to_be_bytes())
    }

    fn put_str(&mut self, value: &str) -> Result<(), Error> {
        let len = u16::try_from(value.len()).map_err(|_| Error::PacketTooLarge)?;
        self.put_u16(len)?;
        self.put(value.as_bytes())
    }

    fn finish(mut self) -> Result<Self, Error> {
        encode_remaining_length(&mut self.header, self.body.len())?;
        Ok(self)
    }

    /// Write the whole frame and flush.
    pub fn write_to<W>(&self, writer: &mut W) -> Result<(), Error>
    where
        W: Write<Error = Error>,
    {
        write_all(writer, &self.header)?;
        write_all(writer, &self.body)?;
        writer.flush()
    }
}

fn write_all<W>(writer: &mut W, mut buf: &[u8]) -> Result<(), Error>
where
    W: Write<Error = Error>,
{
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => return Err(Error::WriteError),
            Ok(n) => buf = &buf[n..],
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Encode the remaining length field for an MQTT packet.
///
/// The remaining length field is a variable-length encoding: each byte
/// carries seven bits, the high bit says another byte follows. Up to four
/// bytes, so values from 0 to 268,435,455.
pub fn encode_remaining_length<const N: usize>(
    buf: &mut Vec<u8, N>,
    mut len: usize,
) -> Result<(), Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::PacketTooLarge);
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| Error::PacketTooLarge)?;
        if len == 0 {
            return Ok(());
        }
    }
}

/// Decode a remaining length field, pulling one byte at a time from `next`.
///
/// ```rust
/// use mqtt_session::network::mqtt::packet::decode_remaining_length;
///
/// let mut bytes = [0xC1, 0x02].into_iter();
/// let len = decode_remaining_length(|| Ok(bytes.next().unwrap())).unwrap();
/// assert_eq!(len, 321);
/// ```
pub fn decode_remaining_length<F>(mut next: F) -> Result<usize, Error>
where
    F: FnMut() -> Result<u8, Error>,
{
    let mut decoder = RemainingLength::default();
    loop {
        if let Some(len) = decoder.push(next()?)? {
            return Ok(len);
        }
    }
}

/// Remaining length decoder fed one byte at a time.
///
/// Keeps its progress between calls, so a length field split across reads
/// can be resumed later.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemainingLength {
    value: usize,
    count: u32,
}

impl RemainingLength {
    /// Feed the next byte. Returns the length once its last byte was seen.
    pub fn push(&mut self, byte: u8) -> Result<Option<usize>, Error> {
        if self.count >= 4 {
            return Err(Error::ProtocolError);
        }
        self.value += usize::from(byte & 0x7F) << (7 * self.count);
        self.count += 1;
        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else if self.count == 4 {
            Err(Error::ProtocolError)
        } else {
            Ok(None)
        }
    }
}

/// Build a CONNECT packet.
pub fn connect(options: &ConnectOptions<'_>) -> Result<Frame, Error> {
    let mut frame = Frame::new(CONNECT);

    let mut flags = 0;
    if options.clean_session {
        flags |= FLAG_CLEAN_SESSION;
    }
    let send_username = !options.username.is_empty();
    let send_password = send_username && !options.password.is_empty();
    if send_username {
        flags |= FLAG_USERNAME;
    }
    if send_password {
        flags |= FLAG_PASSWORD;
    }

    // --- Variable Header ---
    frame.put_str(PROTOCOL_NAME)?;
    frame.put_u8(PROTOCOL_LEVEL)?;
    frame.put_u8(flags)?;
    frame.put_u16(options.keep_alive_seconds)?;

    // --- Payload ---
    frame.put_str(options.client_id)?;
    if send_username {
        frame.put_str(options.username)?;
    }
    if send_password {
        frame.put_str(options.password)?;
    }

    frame.finish()
}

/// Validate a CONNACK and return its return code.
///
/// `Ok(0)` means the session was accepted.
pub fn decode_connack(buf: &[u8; 4]) -> Result<u8, Error> {
    if buf[0] != CONNACK || buf[1] != 2 {
        return Err(Error::ProtocolError);
    }
    Ok(buf[3])
}

/// Build a PUBLISH packet.
///
/// `packet_id` is required for QoS 1 and 2 and ignored for QoS 0. Topic names
/// must be non-empty and must not contain wildcards.
pub fn publish(
    topic: &str,
    payload: &[u8],
    qos: QoS,
    retained: bool,
    packet_id: u16,
) -> Result<Frame, Error> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(Error::ProtocolError);
    }

    let mut flags = PUBLISH | ((qos as u8) << 1);
    if retained {
        flags |= 0x01;
    }
    let mut frame = Frame::new(flags);

    frame.put_str(topic)?;
    if qos != QoS::AtMostOnce {
        if packet_id == 0 {
            return Err(Error::ProtocolError);
        }
        frame.put_u16(packet_id)?;
    }
    frame.put(payload)?;

    frame.finish()
}

/// Build a SUBSCRIBE packet for a single topic filter.
pub fn subscribe(topic: &str, qos: QoS, packet_id: u16) -> Result<Frame, Error> {
    if topic.is_empty() || packet_id == 0 {
        return Err(Error::ProtocolError);
    }
    let mut frame = Frame::new(SUBSCRIBE);
    frame.put_u16(packet_id)?;
    frame.put_str(topic)?;
    frame.put_u8(qos as u8)?;
    frame.finish()
}

/// Build a PUBACK for an inbound QoS 1 publish.
pub fn puback(packet_id: u16) -> Result<Frame, Error> {
    let mut frame = Frame::new(PUBACK);
    frame.put_u16(packet_id)?;
    frame.finish()
}

/// Build a PINGREQ.
pub fn pingreq() -> Result<Frame, Error> {
    Frame::new(PINGREQ).finish()
}

/// Build a PINGRESP.
pub fn pingresp() -> Result<Frame, Error> {
    Frame::new(PINGRESP).finish()
}

/// Build a DISCONNECT.
pub fn disconnect() -> Result<Frame, Error> {
    Frame::new(DISCONNECT).finish()
}

/// An incoming PUBLISH, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    /// Topic the message was published on.
    pub topic: &'a str,
    /// Message payload.
    pub payload: &'a [u8],
    /// Delivery QoS chosen by the broker.
    pub qos: QoS,
    /// Whether this is a retained message.
    pub retain: bool,
    /// Packet identifier, present for QoS 1 and 2.
    pub packet_id: Option<u16>,
}

/// Decode the body of a PUBLISH whose fixed header byte is `first_byte`.
pub fn decode_publish(first_byte: u8, body: &[u8]) -> Result<Publish<'_>, Error> {
    let qos = QoS::from_bits((first_byte >> 1) & 0x03).ok_or(Error::ProtocolError)?;
    let retain = first_byte & 0x01 != 0;

    if body.len() < 2 {
        return Err(Error::ProtocolError);
    }
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic_end = 2 + topic_len;
    let topic_bytes = body.get(2..topic_end).ok_or(Error::ProtocolError)?;
    let topic = core::str::from_utf8(topic_bytes).map_err(|_| Error::ProtocolError)?;

    let (packet_id, payload_start) = if qos == QoS::AtMostOnce {
        (None, topic_end)
    } else {
        let id = body
            .get(topic_end..topic_end + 2)
            .ok_or(Error::ProtocolError)?;
        (Some(u16::from_be_bytes([id[0], id[1]])), topic_end + 2)
    };

    Ok(Publish {
        topic,
        payload: &body[payload_start..],
        qos,
        retain,
        packet_id,
    })
}
