//! An asynchronous PostgreSQL wire-protocol (3.0) client: connection
//! establishment and authentication, the simple and extended query
//! protocols, prepared statement caching, type introspection, `COPY`,
//! `LISTEN`/`NOTIFY`, cursors, transactions/savepoints, and a connection
//! pool, all built on tokio.
//!
//! Most applications only need [`PgConnection::connect`] (or
//! [`pool::Pool::connect`] for a pool) plus the [`query::Query`] builder;
//! [`Transaction`], [`cursor::Cursor`], and [`copy`] cover the less common
//! paths.

pub mod connection;
pub mod copy;
pub mod cursor;
pub mod error;
pub mod message;
pub mod options;
pub mod pool;
pub mod query;
pub mod row;
pub mod transaction;
pub mod types;
pub mod value;

pub use connection::{CancelToken, Connection, PgConnection, PreparedStatement};
pub use copy::{copy_records_to_table, CopyField, CopyIn, CopyOut};
pub use cursor::Cursor;
pub use error::{Error, ErrorKind, PgDatabaseError};
pub use options::PgConnectOptions;
pub use query::{query, Query};
pub use row::{ColumnIndex, PgColumns, PgRow};
pub use transaction::{IsolationLevel, Transaction};
pub use types::PgTypeInfo;

/// This crate's `Result`, aliasing [`Error`] the way `sqlx_core::Result`
/// aliases `sqlx_core::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Opens a single connection from a DSN, applying the environment and OS
/// defaults for anything the DSN leaves unset (spec.md §4.7). For more than
/// one connection, use [`pool::Pool::connect`] instead.
pub async fn connect(url: &str) -> Result<PgConnection> {
    PgConnection::connect(PgConnectOptions::parse(url)?).await
}
