//! Shared, protocol-agnostic plumbing for wire-protocol database drivers.
//!
//! Nothing in this crate knows about PostgreSQL specifically. It provides:
//!
//! - [`error`] — a base [`Error`](error::Error) type and [`DatabaseError`](error::DatabaseError)
//!   trait that a concrete driver's server-error type implements.
//! - [`io`] — a `Codec` trait plus a buffered, length-delimited framing
//!   reader/writer on top of any `AsyncRead + AsyncWrite` socket.
//! - [`net`] — TCP/Unix-domain-socket connection helpers.
//! - [`common`] — a generic bounded LRU keyed by query text, used by the
//!   driver's statement cache.

pub mod common;
pub mod error;
pub mod io;
pub mod net;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Alias kept in one place so a faster hasher can be swapped in later
/// without touching call sites.
pub type HashMap<K, V> = std::collections::HashMap<K, V>;
