//! Asynchronous PostgreSQL wire-protocol client.
//!
//! This crate is a thin facade over [`pgwire_postgres`]; see that crate's
//! documentation for the connection, pool, and query APIs. It exists so
//! that downstream crates depend on a stable `pgwire` name while the
//! protocol implementation and pool live in their own crate, the same way
//! the `sqlx` facade re-exports `sqlx-postgres`.

pub use pgwire_postgres::{
    connect, options::PgConnectOptions, pool::Pool, pool::PoolOptions, types::PgTypeInfo,
    Connection, Error, PgConnection, PgRow, Result, Transaction,
};

pub mod prelude {
    //! Common imports for applications using the high-level API.
    pub use crate::{connect, Connection, Error, PgConnectOptions, PgConnection, PgRow, Result};
}
