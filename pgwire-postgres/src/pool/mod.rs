//! A connection pool (spec.md §4.6), grounded on asyncpg's `pool.py`
//! min/max-size, idle-queue-plus-semaphore design and the
//! `alexogeny-ormkit` `PgPool`/`PooledConnection` shape.

mod connection;
mod inner;
mod options;

pub use connection::PoolConnection;
pub use options::PoolOptions;

use std::sync::Arc;

use crate::options::PgConnectOptions;
use crate::Result;

use self::inner::PoolInner;

/// A cheaply-`Clone`-able handle to a set of pooled [`crate::PgConnection`]s.
/// `acquire` hands out a [`PoolConnection`] that returns itself to the pool
/// when dropped.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Connects using [`PoolOptions::default`].
    pub async fn connect(url: &str) -> Result<Self> {
        PoolOptions::new().connect(url).await
    }

    pub async fn connect_with(options: PgConnectOptions) -> Result<Self> {
        PoolOptions::new().connect_with(options).await
    }

    /// Checks out a connection, reusing an idle one when available and
    /// opening a fresh one otherwise, blocked by `max_connections` and
    /// timed out by `acquire_timeout` (spec.md §4.6).
    pub async fn acquire(&self) -> Result<PoolConnection> {
        let (managed, permit) = self.inner.acquire().await?;
        let mut conn = PoolConnection::new(self.inner.clone(), managed, permit);

        if self.inner.options.test_before_acquire {
            if let Err(err) = conn.ping().await {
                conn.close().await.ok();
                return Err(err);
            }
        }

        Ok(conn)
    }

    /// Closes every idle connection and refuses further `acquire` calls.
    /// Connections already checked out are closed as they're released.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    pub async fn idle(&self) -> usize {
        self.inner.idle_count().await
    }

    /// Total connections currently checked out or idle (bounded by
    /// `max_connections`).
    pub fn size(&self) -> u32 {
        self.inner.size()
    }
}
