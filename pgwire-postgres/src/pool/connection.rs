//! `PoolConnection` -- a checked-out connection that returns itself to the
//! pool on drop (spec.md §4.6, grounded on asyncpg's
//! `PooledConnectionProxy`/`_ConnectionProxy` and the teacher-adjacent
//! `alexogeny-ormkit` `PooledConnection`).

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::connection::{Connection, PgConnection};
use crate::error::Error;
use crate::message::TransactionStatus;
use crate::Result;

use super::inner::{Managed, PoolInner};

/// A [`PgConnection`] borrowed from a [`super::Pool`]. Dereferences to
/// `PgConnection`, so every connection-level API (`prepare`, `execute_prepared`,
/// `simple_query`, and the `Query`/`Transaction`/`Cursor`/`CopyIn`/`CopyOut`
/// helpers that take `&mut PgConnection`) works unchanged.
///
/// Dropping returns the connection to the pool asynchronously -- release may
/// need to roll back an unresolved transaction, which can't happen inside a
/// synchronous `Drop`, so it is spawned onto the runtime (asyncpg instead
/// resets eagerly inside an awaited `release()`; spawning is the idiomatic
/// tokio equivalent when release must happen from `Drop`).
pub struct PoolConnection {
    pool: Arc<PoolInner>,
    managed: Option<Managed>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PoolConnection {
    pub(super) fn new(pool: Arc<PoolInner>, managed: Managed, permit: OwnedSemaphorePermit) -> Self {
        PoolConnection { pool, managed: Some(managed), permit: Some(permit) }
    }

    fn managed(&self) -> &Managed {
        self.managed.as_ref().expect("PoolConnection used after release")
    }

    fn managed_mut(&mut self) -> &mut Managed {
        self.managed.as_mut().expect("PoolConnection used after release")
    }

    /// A round trip proving the connection is alive (spec.md §4.6
    /// `test_before_acquire`).
    pub async fn ping(&mut self) -> Result<()> {
        self.managed_mut().conn.ping().await
    }

    /// Detaches the underlying connection from the pool permanently -- it is
    /// dropped (and its socket closed) instead of being returned to the idle
    /// queue. Used when a connection fails `test_before_acquire` or is
    /// otherwise known to be broken.
    pub async fn close(mut self) -> Result<()> {
        let managed = self.managed.take().ok_or_else(|| Error::interface("connection already released"))?;
        self.permit.take();
        managed.conn.close().await
    }
}

impl Deref for PoolConnection {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        &self.managed().conn
    }
}

impl DerefMut for PoolConnection {
    fn deref_mut(&mut self) -> &mut PgConnection {
        &mut self.managed_mut().conn
    }
}

impl Connection for PoolConnection {
    async fn ping(&mut self) -> Result<()> {
        PoolConnection::ping(self).await
    }

    async fn close(self) -> Result<()> {
        PoolConnection::close(self).await
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.managed().conn.transaction_status()
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        let (Some(managed), Some(permit)) = (self.managed.take(), self.permit.take()) else {
            return;
        };
        let pool = self.pool.clone();
        tokio::spawn(async move {
            pool.release(managed, permit).await;
        });
    }
}
