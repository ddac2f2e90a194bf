#![allow(dead_code)]

use mqtt_session::network::error::Error;
use mqtt_session::network::mqtt::{ConnectOptions, ProtocolClient, QoS, State};
use mqtt_session::network::tls::{SecureTransport, TlsError};
use mqtt_session::network::{Close, Connect, Connection, Read, Write};
use mqtt_session::time::Clock;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// A clock the test moves by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u64) {
        self.0.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn now(&self) -> u64 {
        self.0.get()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// Trust settings recorded by a mock secure socket.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Trust {
    #[default]
    Unset,
    Insecure,
    Pinned(String),
}

#[derive(Debug, Default)]
pub struct MockTls {
    pub trust: Trust,
    pub last_error: Option<TlsError>,
}

impl SecureTransport for MockTls {
    fn set_insecure(&mut self) {
        self.trust = Trust::Insecure;
    }

    fn set_fingerprint(&mut self, fingerprint: &str) {
        self.trust = Trust::Pinned(fingerprint.to_string());
    }

    fn last_error(&self) -> Option<TlsError> {
        self.last_error.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub at_ms: u64,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub clean_session: bool,
    pub keep_alive_seconds: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
}

/// A protocol client that records every call and answers from a script.
#[derive(Debug)]
pub struct RecordingClient {
    clock: ManualClock,
    pub server: Option<(String, u16)>,
    pub tls: MockTls,
    pub connected: bool,
    pub state: State,
    /// Outcomes for upcoming connect calls; an empty script fails.
    pub connect_script: VecDeque<Result<(), State>>,
    pub attempts: Vec<Attempt>,
    pub subscriptions: Vec<(String, QoS)>,
    pub published: Vec<Published>,
    pub inbound: VecDeque<(String, Vec<u8>)>,
    pub polls: usize,
}

impl RecordingClient {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            server: None,
            tls: MockTls::default(),
            connected: false,
            state: State::Disconnected,
            connect_script: VecDeque::new(),
            attempts: Vec::new(),
            subscriptions: Vec::new(),
            published: Vec::new(),
            inbound: VecDeque::new(),
            polls: 0,
        }
    }

    pub fn script(mut self, outcomes: &[Result<(), State>]) -> Self {
        self.connect_script.extend(outcomes.iter().cloned());
        self
    }

    /// Simulate the broker dropping the connection.
    pub fn drop_link(&mut self) {
        self.connected = false;
        self.state = State::ConnectionLost;
    }

    pub fn attempt_times(&self) -> Vec<u64> {
        self.attempts.iter().map(|a| a.at_ms).collect()
    }

    pub fn subscribed_topics(&self) -> Vec<&str> {
        self.subscriptions.iter().map(|(t, _)| t.as_str()).collect()
    }
}

impl ProtocolClient for RecordingClient {
    type Transport = MockTls;

    fn set_server(&mut self, host: &str, port: u16) -> Result<(), Error> {
        if host.is_empty() {
            return Err(Error::InvalidAddress);
        }
        self.server = Some((host.to_string(), port));
        Ok(())
    }

    fn transport(&self) -> &MockTls {
        &self.tls
    }

    fn transport_mut(&mut self) -> &mut MockTls {
        &mut self.tls
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn state(&self) -> State {
        self.state
    }

    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), Error> {
        self.attempts.push(Attempt {
            at_ms: self.clock.now_ms(),
            client_id: options.client_id.to_string(),
            username: options.username.to_string(),
            password: options.password.to_string(),
            clean_session: options.clean_session,
            keep_alive_seconds: options.keep_alive_seconds,
        });
        match self
            .connect_script
            .pop_front()
            .unwrap_or(Err(State::ConnectFailed))
        {
            Ok(()) => {
                self.connected = true;
                self.state = State::Connected;
                Ok(())
            }
            Err(state) => {
                self.connected = false;
                self.state = state;
                Err(Error::ConnectionRefused)
            }
        }
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotOpen);
        }
        self.published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retained,
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotOpen);
        }
        self.subscriptions.push((topic.to_string(), qos));
        Ok(())
    }

    fn poll<F: FnMut(&str, &[u8])>(&mut self, on_message: &mut F) -> Result<(), Error> {
        self.polls += 1;
        if !self.connected {
            return Ok(());
        }
        while let Some((topic, payload)) = self.inbound.pop_front() {
            on_message(&topic, &payload);
        }
        Ok(())
    }
}

/// One scripted result of a `read` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    Timeout,
    Closed,
    Fail,
}

/// Shared state between a test and the connection it handed to the client.
#[derive(Debug, Default)]
pub struct Wire {
    pub inbound: VecDeque<Chunk>,
    pub written: Vec<u8>,
    pub closed: bool,
    pub fail_writes: bool,
}

impl Wire {
    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbound.push_back(Chunk::Data(bytes.to_vec()));
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

#[derive(Debug)]
pub struct ScriptedConnection {
    wire: Rc<RefCell<Wire>>,
}

impl Read for ScriptedConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut wire = self.wire.borrow_mut();
        match wire.inbound.pop_front() {
            None | Some(Chunk::Timeout) => Err(Error::Timeout),
            Some(Chunk::Closed) => Ok(0),
            Some(Chunk::Fail) => Err(Error::ReadError),
            Some(Chunk::Data(mut data)) => {
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    wire.inbound.push_front(Chunk::Data(rest));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.fail_writes {
            return Err(Error::WriteError);
        }
        wire.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl Close for ScriptedConnection {
    type Error = Error;

    fn close(self) -> Result<(), Error> {
        self.wire.borrow_mut().closed = true;
        Ok(())
    }
}

impl Connection for ScriptedConnection {}

/// Hands out connections over one shared [`Wire`].
#[derive(Debug)]
pub struct ScriptedConnector {
    pub wire: Rc<RefCell<Wire>>,
    pub tls: MockTls,
    pub refuse: bool,
    pub dialed: Vec<(String, u16)>,
}

impl ScriptedConnector {
    pub fn new() -> (Self, Rc<RefCell<Wire>>) {
        let wire = Rc::new(RefCell::new(Wire::default()));
        (
            Self {
                wire: wire.clone(),
                tls: MockTls::default(),
                refuse: false,
                dialed: Vec::new(),
            },
            wire,
        )
    }
}

impl Connect for ScriptedConnector {
    type Connection = ScriptedConnection;
    type Error = Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<ScriptedConnection, Error> {
        self.dialed.push((host.to_string(), port));
        if self.refuse {
            return Err(Error::ConnectionRefused);
        }
        self.wire.borrow_mut().closed = false;
        Ok(ScriptedConnection {
            wire: self.wire.clone(),
        })
    }
}

impl SecureTransport for ScriptedConnector {
    fn set_insecure(&mut self) {
        self.tls.set_insecure();
    }

    fn set_fingerprint(&mut self, fingerprint: &str) {
        self.tls.set_fingerprint(fingerprint);
    }

    fn last_error(&self) -> Option<TlsError> {
        self.tls.last_error()
    }
}

pub const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

pub fn connack(code: u8) -> [u8; 4] {
    [0x20, 0x02, 0x00, code]
}

/// An inbound PUBLISH frame as the broker would send it.
pub fn publish_frame(topic: &str, payload: &[u8], qos: u8, packet_id: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    body.extend_from_slice(topic.as_bytes());
    if qos > 0 {
        body.extend_from_slice(&packet_id.to_be_bytes());
    }
    body.extend_from_slice(payload);

    let mut frame = vec![0x30 | (qos << 1)];
    let mut len = body.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        frame.push(byte);
        if len == 0 {
            break;
        }
    }
    frame.extend_from_slice(&body);
    frame
}
