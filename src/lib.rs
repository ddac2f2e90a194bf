//! # mqtt-session - persistent MQTT sessions for microcontrollers
//!
//! A small `no_std` crate that keeps an MQTT session alive from a cooperative
//! main loop. It reconnects with a fixed backoff when the connection drops,
//! re-subscribes a fixed topic list after every reconnect and forwards
//! publish/subscribe calls with logging.
//!
//! ## Layers
//!
//! - [`session`]: the [`ConnectionManager`](session::ConnectionManager), the
//!   part applications talk to
//! - [`config`]: broker address, credentials, device id, topics, TLS trust
//! - [`network`]: transport traits, TLS trust configuration and a bundled
//!   MQTT 3.1.1 client
//! - [`time`]: the millisecond clock used for backoff and keep-alive
//!
//! TLS handshakes, certificate checks and link management belong to the
//! platform. Plug them in by implementing [`network::Connect`] and
//! [`network::tls::SecureTransport`] for your socket.
//!
//! ## Usage
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
//! # struct WifiTls;
//! # impl Connect for WifiTls {
//! #     type Connection = Socket;
//! #     type Error = Error;
//! #     fn connect(&mut self, _host: &str, _port: u16) -> Result<Socket, Error> { Ok(Socket) }
//! # }
//! # impl SecureTransport for WifiTls {
//! #     fn set_insecure(&mut self) {}
//! #     fn set_fingerprint(&mut self, _fingerprint: &str) {}
//! #     fn last_error(&self) -> Option<TlsError> { None }
//! # }
//! # #[derive(Clone, Copy)]
//! # struct Millis;
//! # impl Clock for Millis { fn now_ms(&self) -> u64 { 0 } }
//!
//! let config = Config::from_json(
//!     br#"{"host":"mqtt.example.net","port":8883,"device_id":"garage-door",
//!          "username":"garage","password":"s3cret",
//!          "topics":["garage/door/set"],"fingerprint":"3E:A1:77:0B"}"#,
//! )
//! .unwrap();
//!
//! let client = Client::new(WifiTls, Millis);
//! let mut mqtt = ConnectionManager::new(config, client, Millis, |topic: &str, payload: &[u8]| {
//!     // handle commands
//!     let _ = (topic, payload);
//! })?;
//!
//! loop {
//!     mqtt.tick();
//!     if !mqtt.publish("garage/door/state", b"closed") {
//!         // dropped; publish again on the next pass if it matters
//!     }
//! #   break;
//! }
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Optional Features
//!
//! - `std`: `SystemClock` backed by `std::time::Instant`
//! - `defmt`: log through `defmt` instead of the `log` facade, and derive
//!   `defmt::Format` for the public error types

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Connection configuration.
pub mod config;

/// Network abstraction layer: transport traits, TLS trust and the MQTT client.
pub mod network;

/// Reconnect-and-resubscribe session management.
pub mod session;

/// Monotonic millisecond clock.
pub mod time;
