//! Base error type shared by every wire-protocol driver built on this crate.
//!
//! A concrete driver (e.g. `pgwire-postgres`) defines its own server-error
//! type implementing [`DatabaseError`] and its own top-level `Error` enum
//! that wraps this one, the same way `sqlx::Error` wraps `sqlx_core::Error`.

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};

/// Errors that can occur outside of the database server itself: transport,
/// framing, and local misuse.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error while reading from or writing to the socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent something that doesn't conform to the wire protocol:
    /// an unexpected message tag, a truncated message, or a malformed field.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// TLS negotiation or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// The caller tried to use the connection in a way the protocol or this
    /// library's invariants forbid (e.g. issuing a second command before the
    /// first reached `ReadyForQuery`).
    #[error("interface error: {0}")]
    Interface(String),

    /// A configuration value (DSN, TLS mode, target-session-attrs, ...) was
    /// invalid before any socket work began.
    #[error("configuration error: {0}")]
    Configuration(Box<dyn StdError + Send + Sync + 'static>),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn interface(msg: impl Into<String>) -> Self {
        Error::Interface(msg.into())
    }

    pub fn configuration(err: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Error::Configuration(err.into())
    }
}

/// Implemented by a driver's server-error type (e.g. `PgDatabaseError`) so
/// that shared code can inspect the SQLSTATE-equivalent code without
/// depending on the concrete driver crate.
pub trait DatabaseError: StdError + Send + Sync + 'static {
    /// The 5-character SQLSTATE (or equivalent) the server attached to the
    /// error, if any.
    fn code(&self) -> Option<&str>;

    /// Human-readable primary message.
    fn message(&self) -> &str;

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static);
}

impl Display for dyn DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}
