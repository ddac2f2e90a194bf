//! TLS trust configuration.
//!
//! The handshake and certificate checks belong to the platform's secure
//! socket. This module only describes how that socket should decide whether
//! to trust the broker, and how it reports why a handshake failed.

use heapless::String;

/// Capacity of [`TlsError::description`].
pub const MAX_TLS_ERROR_LEN: usize = 96;

/// How the secure socket decides to trust the broker's certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode<'a> {
    /// No verification at all. The caller explicitly accepts the risk.
    Insecure,
    /// Accept only a certificate whose fingerprint matches this value.
    Fingerprint(&'a str),
}

impl<'a> TlsMode<'a> {
    /// Pick the trust mode from a configured fingerprint.
    ///
    /// An empty string means no fingerprint was configured and the connection
    /// runs in [`TlsMode::Insecure`].
    ///
    /// ```rust
    /// use mqtt_session::network::tls::TlsMode;
    ///
    /// assert_eq!(TlsMode::from_fingerprint(""), TlsMode::Insecure);
    /// assert_eq!(
    ///     TlsMode::from_fingerprint("AB:CD"),
    ///     TlsMode::Fingerprint("AB:CD")
    /// );
    /// ```
    pub fn from_fingerprint(fingerprint: &'a str) -> Self {
        if fingerprint.is_empty() {
            TlsMode::Insecure
        } else {
            TlsMode::Fingerprint(fingerprint)
        }
    }

    /// Whether certificate pinning is active.
    pub fn is_pinned(&self) -> bool {
        matches!(self, TlsMode::Fingerprint(_))
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TlsMode<'_> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            TlsMode::Insecure => defmt::write!(f, "Insecure"),
            TlsMode::Fingerprint(fp) => defmt::write!(f, "Fingerprint({})", fp),
        }
    }
}

/// The last error reported by a secure socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsError {
    /// Library specific error code.
    pub code: i32,
    /// Human-readable description, truncated to [`MAX_TLS_ERROR_LEN`] bytes.
    pub description: String<MAX_TLS_ERROR_LEN>,
}

impl TlsError {
    /// Build an error, truncating `description` on a character boundary if
    /// it does not fit.
    ///
    /// ```rust
    /// use mqtt_session::network::tls::TlsError;
    ///
    /// let err = TlsError::new(-9984, "X509 - Certificate verification failed");
    /// assert_eq!(err.code, -9984);
    /// assert_eq!(err.description.as_str(), "X509 - Certificate verification failed");
    /// ```
    pub fn new(code: i32, description: &str) -> Self {
        let mut owned = String::new();
        for ch in description.chars() {
            if owned.push(ch).is_err() {
                break;
            }
        }
        Self {
            code,
            description: owned,
        }
    }
}

impl core::fmt::Display for TlsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.description, self.code)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TlsError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} ({})", self.description.as_str(), self.code)
    }
}

/// Trust configuration and diagnostics of a TLS-capable socket.
///
/// Implemented by the platform's connector next to
/// [`Connect`](crate::network::Connect). Both setters only record the mode;
/// the handshake happens on the next connect.
pub trait SecureTransport {
    /// Skip certificate verification entirely.
    fn set_insecure(&mut self);

    /// Only accept a certificate matching `fingerprint`.
    fn set_fingerprint(&mut self, fingerprint: &str);

    /// The error of the most recent failed handshake, if any.
    fn last_error(&self) -> Option<TlsError>;

    /// Apply a [`TlsMode`].
    fn apply(&mut self, mode: TlsMode<'_>) {
        match mode {
            TlsMode::Insecure => self.set_insecure(),
            TlsMode::Fingerprint(fingerprint) => self.set_fingerprint(fingerprint),
        }
    }
}
