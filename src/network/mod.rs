//! A network abstraction layer for embedded systems
//!
//! This module provides the traits the session layer is written against. A
//! platform plugs in its own socket (plain TCP, a TLS socket on top of a Wi-Fi
//! stack, a modem AT channel, ...) by implementing [`Connect`] for its
//! connector and [`Read`], [`Write`] and [`Close`] for the connection it hands
//! out.
//!
//! # Read semantics
//!
//! The MQTT client polls the connection, so implementations must distinguish
//! "nothing to read yet" from "the peer went away":
//!
//! - `Ok(n)` with `n > 0`: `n` bytes were read.
//! - `Ok(0)`: the peer closed the stream.
//! - `Err(Error::Timeout)`: no data is available right now (would block or the
//!   socket's read timeout elapsed).
//! - any other error: the connection is unusable.

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// MQTT 3.1.1 protocol client
pub mod mqtt;

/// TLS trust configuration and diagnostics
pub mod tls;

/// Re-exports of common traits
pub mod prelude {
    pub use super::tls::SecureTransport;
    pub use super::{Close, Connect, Connection, Read, Write};
}

/// Byte-oriented read half of a connection.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Byte-oriented write half of a connection.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// A connection that can be torn down.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// A synchronous connector (client side).
///
/// For TLS the connector performs the handshake inside [`Connect::connect`]
/// using the trust mode configured through
/// [`SecureTransport`](tls::SecureTransport).
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `host:port`
    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Connection, Self::Error>;
}
