use mqtt_session::network::error::Error;
use mqtt_session::network::tls::{SecureTransport, TlsError};
use mqtt_session::network::{Close, Connect, Connection, Read, Write};
use mqtt_session::time::Clock;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub mod mqtt;

pub const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

/// Bytes queued for the client to read.
pub type Inbound = Rc<RefCell<VecDeque<u8>>>;

/// In-memory connection; writes are dropped, reads drain the shared queue.
pub struct MemoryConnection {
    inbound: Inbound,
}

impl Read for MemoryConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut inbound = self.inbound.borrow_mut();
        if inbound.is_empty() {
            return Err(Error::Timeout);
        }
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MemoryConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for MemoryConnection {}

/// Connector that answers every connect with an accepted CONNACK.
pub struct MemoryConnector {
    inbound: Inbound,
}

impl MemoryConnector {
    pub fn new() -> (Self, Inbound) {
        let inbound = Inbound::default();
        (
            Self {
                inbound: inbound.clone(),
            },
            inbound,
        )
    }
}

impl Connect for MemoryConnector {
    type Connection = MemoryConnection;
    type Error = Error;

    fn connect(&mut self, _host: &str, _port: u16) -> Result<MemoryConnection, Error> {
        self.inbound.borrow_mut().extend(CONNACK_ACCEPTED);
        Ok(MemoryConnection {
            inbound: self.inbound.clone(),
        })
    }
}

impl SecureTransport for MemoryConnector {
    fn set_insecure(&mut self) {}

    fn set_fingerprint(&mut self, _fingerprint: &str) {}

    fn last_error(&self) -> Option<TlsError> {
        None
    }
}

/// A clock that never moves, so keep-alive never fires.
#[derive(Clone, Copy)]
pub struct FrozenClock;

impl Clock for FrozenClock {
    fn now_ms(&self) -> u64 {
        0
    }
}
