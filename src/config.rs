//! Connection configuration.
//!
//! A [`Config`] is created once at start-up and handed to the
//! [`ConnectionManager`](crate::session::ConnectionManager), which keeps it
//! for the rest of the program. All strings are borrowed, typically from
//! `'static` constants or a flash-resident JSON blob.
//!
//! ```rust
//! use mqtt_session::config::Config;
//! use mqtt_session::network::tls::TlsMode;
//!
//! let config = Config::new("broker.local", 8883, "kitchen-sensor")
//!     .with_credentials("device", "hunter2")
//!     .with_fingerprint("4F:9A:11:0C")
//!     .with_topics(&["kitchen/light/set", "kitchen/fan/set"])
//!     .unwrap();
//!
//! assert_eq!(config.topics.len(), 2);
//! assert_eq!(config.tls_mode(), TlsMode::Fingerprint("4F:9A:11:0C"));
//! ```

use crate::network::mqtt::MAX_HOST_LEN;
use crate::network::tls::TlsMode;
use heapless::Vec;
use serde::Deserialize;

/// Maximum number of topics re-subscribed on every reconnect.
pub const MAX_TOPICS: usize = 16;

/// Keep-alive used when none is configured, in seconds.
pub const DEFAULT_KEEP_ALIVE_SECONDS: u16 = 15;

fn default_keep_alive() -> u16 {
    DEFAULT_KEEP_ALIVE_SECONDS
}

/// Everything needed to reach and identify with the broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config<'a> {
    /// Broker host name or address.
    pub host: &'a str,
    /// Broker port.
    pub port: u16,
    /// Device identifier, used as the MQTT client id.
    pub device_id: &'a str,
    /// User name, empty for anonymous access.
    #[serde(default)]
    pub username: &'a str,
    /// Password, empty when not needed.
    #[serde(default)]
    pub password: &'a str,
    /// Topic filters subscribed after every successful connect, in order.
    #[serde(borrow, default)]
    pub topics: Vec<&'a str, MAX_TOPICS>,
    /// Pinned certificate fingerprint; empty disables verification.
    #[serde(default)]
    pub fingerprint: &'a str,
    /// MQTT keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u16,
}

/// Reasons a [`Config`] is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The host is empty.
    EmptyHost,
    /// The host is longer than the client can store.
    HostTooLong,
    /// Port 0.
    InvalidPort,
    /// The device id is empty.
    EmptyDeviceId,
    /// A topic is empty.
    EmptyTopic,
    /// More than [`MAX_TOPICS`] topics.
    TooManyTopics,
    /// A password without a user name cannot be sent over MQTT 3.1.1.
    PasswordWithoutUsername,
    /// The JSON document could not be parsed.
    Parse,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            ConfigError::EmptyHost => "host is empty",
            ConfigError::HostTooLong => "host is too long",
            ConfigError::InvalidPort => "port must be non-zero",
            ConfigError::EmptyDeviceId => "device id is empty",
            ConfigError::EmptyTopic => "topic is empty",
            ConfigError::TooManyTopics => "too many topics",
            ConfigError::PasswordWithoutUsername => "password set without username",
            ConfigError::Parse => "malformed configuration",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConfigError::EmptyHost => defmt::write!(f, "EmptyHost"),
            ConfigError::HostTooLong => defmt::write!(f, "HostTooLong"),
            ConfigError::InvalidPort => defmt::write!(f, "InvalidPort"),
            ConfigError::EmptyDeviceId => defmt::write!(f, "EmptyDeviceId"),
            ConfigError::EmptyTopic => defmt::write!(f, "EmptyTopic"),
            ConfigError::TooManyTopics => defmt::write!(f, "TooManyTopics"),
            ConfigError::PasswordWithoutUsername => defmt::write!(f, "PasswordWithoutUsername"),
            ConfigError::Parse => defmt::write!(f, "Parse"),
        }
    }
}

impl<'a> Config<'a> {
    /// Anonymous, insecure configuration without topics.
    pub fn new(host: &'a str, port: u16, device_id: &'a str) -> Self {
        Self {
            host,
            port,
            device_id,
            username: "",
            password: "",
            topics: Vec::new(),
            fingerprint: "",
            keep_alive_seconds: DEFAULT_KEEP_ALIVE_SECONDS,
        }
    }

    /// Set user name and password.
    pub fn with_credentials(mut self, username: &'a str, password: &'a str) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// Pin the broker certificate. An empty string keeps insecure mode.
    pub fn with_fingerprint(mut self, fingerprint: &'a str) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Set the MQTT keep-alive interval.
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive_seconds = seconds;
        self
    }

    /// Add one topic to the subscription list.
    pub fn with_topic(mut self, topic: &'a str) -> Result<Self, ConfigError> {
        self.topics
            .push(topic)
            .map_err(|_| ConfigError::TooManyTopics)?;
        Ok(self)
    }

    /// Add several topics, keeping their order.
    pub fn with_topics(mut self, topics: &[&'a str]) -> Result<Self, ConfigError> {
        self.topics
            .extend_from_slice(topics)
            .map_err(|_| ConfigError::TooManyTopics)?;
        Ok(self)
    }

    /// Parse and validate a JSON configuration, borrowing strings from `json`.
    ///
    /// Strings must not contain JSON escape sequences, since they are
    /// borrowed rather than copied.
    ///
    /// ```rust
    /// use mqtt_session::config::Config;
    ///
    /// let json = br#"{"host":"broker.local","port":8883,"device_id":"dev-1","topics":["a/b"]}"#;
    /// let config = Config::from_json(json).unwrap();
    /// assert_eq!(config.device_id, "dev-1");
    /// assert_eq!(config.keep_alive_seconds, 15);
    /// ```
    pub fn from_json(json: &'a [u8]) -> Result<Self, ConfigError> {
        let (config, _) =
            serde_json_core::from_slice::<Config<'a>>(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that can never connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.host.len() > MAX_HOST_LEN {
            return Err(ConfigError::HostTooLong);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.device_id.is_empty() {
            return Err(ConfigError::EmptyDeviceId);
        }
        if self.username.is_empty() && !self.password.is_empty() {
            return Err(ConfigError::PasswordWithoutUsername);
        }
        if self.topics.iter().any(|topic| topic.is_empty()) {
            return Err(ConfigError::EmptyTopic);
        }
        Ok(())
    }

    /// The TLS trust mode implied by [`fingerprint`](Self::fingerprint).
    pub fn tls_mode(&self) -> TlsMode<'a> {
        TlsMode::from_fingerprint(self.fingerprint)
    }
}
