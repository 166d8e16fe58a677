//! Shared pool state: the idle queue and the semaphore bounding total
//! connection count (spec.md §4.6, grounded on the teacher-adjacent
//! `alexogeny-ormkit` pool module's `PgPoolInner`/`OwnedSemaphorePermit`
//! shape and asyncpg's `pool.py` idle/lifetime bookkeeping).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::connection::PgConnection;
use crate::error::Error;
use crate::options::PgConnectOptions;
use crate::Result;

use super::options::PoolOptions;

/// An idle or checked-out connection plus the timestamps needed to decide
/// whether it has aged out (spec.md §4.6 `idle_timeout`/`max_lifetime`).
pub(super) struct Managed {
    pub(super) conn: PgConnection,
    created_at: Instant,
    idle_since: Instant,
}

pub(super) struct PoolInner {
    pub(super) options: PoolOptions,
    connect_options: PgConnectOptions,
    idle: Mutex<VecDeque<Managed>>,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
}

impl PoolInner {
    pub(super) async fn new(connect_options: PgConnectOptions, options: PoolOptions) -> Result<Arc<Self>> {
        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(options.max_connections as usize)),
            idle: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            connect_options,
            options,
        });

        for _ in 0..inner.options.min_connections {
            let now = Instant::now();
            let conn = PgConnection::connect(inner.connect_options.clone()).await?;
            inner
                .idle
                .lock()
                .await
                .push_back(Managed { conn, created_at: now, idle_since: now });
        }

        Ok(inner)
    }

    fn is_expired(&self, managed: &Managed) -> bool {
        if let Some(max) = self.options.max_lifetime {
            if managed.created_at.elapsed() > max {
                return true;
            }
        }
        if let Some(idle) = self.options.idle_timeout {
            if managed.idle_since.elapsed() > idle {
                return true;
            }
        }
        false
    }

    /// Pulls an idle connection (discarding any that aged out) or opens a
    /// fresh one, gated by the semaphore permit that bounds `max_connections`
    /// (spec.md §4.6 `acquire`).
    pub(super) async fn acquire(self: &Arc<Self>) -> Result<(Managed, OwnedSemaphorePermit)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::interface("pool is closed"));
        }

        let permit = timeout(self.options.acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|_| Error::interface("pool is closed"))?;

        loop {
            let candidate = self.idle.lock().await.pop_front();
            match candidate {
                Some(managed) if self.is_expired(&managed) => continue,
                Some(managed) => return Ok((managed, permit)),
                None => {
                    let now = Instant::now();
                    let conn = PgConnection::connect(self.connect_options.clone()).await?;
                    return Ok((Managed { conn, created_at: now, idle_since: now }, permit));
                }
            }
        }
    }

    /// Returns a checked-out connection to the idle queue, rolling back any
    /// transaction the caller forgot to resolve first (spec.md §4.6 "reset
    /// to close all open cursors/transactions except prepared statements",
    /// after asyncpg's `pool_connection_proxy.py` release path).
    pub(super) async fn release(self: Arc<Self>, mut managed: Managed, _permit: OwnedSemaphorePermit) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        if managed.conn.is_in_transaction() || managed.conn.is_aborted() {
            let _ = managed.conn.simple_query("ROLLBACK").await;
            managed.conn.clear_aborted();
        }

        if let Some(max) = self.options.max_queries {
            if managed.conn.queries_executed() >= max {
                let _ = managed.conn.close().await;
                return;
            }
        }

        managed.idle_since = Instant::now();
        self.idle.lock().await.push_back(managed);
    }

    pub(super) async fn close(self: &Arc<Self>) {
        self.closed.store(true, Ordering::Release);
        let drained: VecDeque<Managed> = std::mem::take(&mut *self.idle.lock().await);
        for managed in drained {
            let _ = managed.conn.close().await;
        }
    }

    pub(super) async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }

    pub(super) fn size(&self) -> u32 {
        self.options.max_connections - u32::try_from(self.semaphore.available_permits()).unwrap_or(0)
    }
}
