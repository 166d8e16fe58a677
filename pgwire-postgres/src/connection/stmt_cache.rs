//! Per-connection bounded LRU of prepared statements (spec.md §3
//! `PreparedStatementState`, §4.4).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pgwire_core::common::StatementCache;

use crate::row::PgColumns;

/// Shared state backing every live handle (a `PreparedStatement` or
/// `Cursor`) to one server-side statement. `ref_count` is bumped by
/// [`Handle::clone`] and dropped by [`Handle`]'s `Drop` impl; eviction from
/// the cache only queues the server-side `Close` once it reaches zero
/// (spec.md §3).
#[derive(Debug)]
pub struct PreparedStatementState {
    pub name: String,
    pub query: String,
    pub parameter_oids: Vec<u32>,
    pub columns: Arc<PgColumns>,
    ref_count: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    created_at: Instant,
}

impl PreparedStatementState {
    fn new(name: String, query: String, parameter_oids: Vec<u32>, columns: Arc<PgColumns>) -> Self {
        PreparedStatementState {
            name,
            query,
            parameter_oids,
            columns,
            ref_count: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            created_at: Instant::now(),
        }
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// A new live reference (e.g. a `PreparedStatement` or `Cursor`) to this
    /// statement.
    pub fn acquire(&self) -> StatementHandle {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
        StatementHandle {
            name: self.name.clone(),
            ref_count: self.ref_count.clone(),
            closed: self.closed.clone(),
        }
    }
}

/// A live reference to a cached or anonymous statement. Dropping the last
/// handle to a statement that has already been evicted queues its
/// server-side `Close` (spec.md §3: "on last drop while not in the cache").
#[derive(Debug)]
pub struct StatementHandle {
    pub name: String,
    ref_count: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl Drop for StatementHandle {
    fn drop(&mut self) {
        self.ref_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl StatementHandle {
    pub fn should_close_on_drop(&self) -> bool {
        self.closed.load(Ordering::Acquire) && self.ref_count.load(Ordering::Acquire) == 0
    }
}

/// Wraps the generic [`StatementCache`] with the prepare-specific
/// bookkeeping from spec.md §4.4: a monotonic name counter, a queue of
/// statements evicted while still referenced, and the size/lifetime bounds.
pub struct StmtCache {
    cache: StatementCache<Arc<PreparedStatementState>>,
    pending_close: Vec<String>,
    next_id: u64,
    max_cacheable_statement_size: usize,
    max_cached_statement_lifetime: Option<Duration>,
}

impl StmtCache {
    pub fn new(capacity: usize, max_cacheable_statement_size: usize) -> Self {
        StmtCache {
            cache: StatementCache::new(capacity),
            pending_close: Vec::new(),
            next_id: 0,
            max_cacheable_statement_size,
            max_cached_statement_lifetime: None,
        }
    }

    pub fn set_max_lifetime(&mut self, lifetime: Option<Duration>) {
        self.max_cached_statement_lifetime = lifetime;
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    pub fn too_large_to_cache(&self, query: &str) -> bool {
        query.len() > self.max_cacheable_statement_size
    }

    fn next_name(&mut self) -> String {
        self.next_id += 1;
        format!("pgwire_s{}", self.next_id)
    }

    /// Looks up `query`. Expired entries (per
    /// `max_cached_statement_lifetime`) are treated as a miss and evicted.
    pub fn get(&mut self, query: &str) -> Option<Arc<PreparedStatementState>> {
        if let Some(lifetime) = self.max_cached_statement_lifetime {
            let expired = self
                .cache
                .get_mut(query)
                .map(|state| state.created_at.elapsed() > lifetime)
                .unwrap_or(false);
            if expired {
                if let Some(state) = self.cache.remove(query) {
                    self.queue_close(&state);
                }
                return None;
            }
        }

        let state = self.cache.get_mut(query)?.clone();
        if state.is_closed() {
            return None;
        }
        Some(state)
    }

    /// The name to `Parse` a new statement for `query` under -- empty for
    /// anonymous (cache disabled, or `query` too large to cache). Must be
    /// called, and the resulting name sent in `Parse`, before
    /// [`Self::insert`] -- the server needs the name that's actually on the
    /// wire, not one picked after the fact.
    pub fn reserve_name(&mut self, query: &str) -> String {
        if !self.is_enabled() || self.too_large_to_cache(query) {
            String::new()
        } else {
            self.next_name()
        }
    }

    /// Records the now-parsed statement under `name` (as returned by
    /// [`Self::reserve_name`]). A non-empty name is stored in the LRU;
    /// an empty one is anonymous and not cached.
    pub fn insert(
        &mut self,
        query: &str,
        name: String,
        parameter_oids: Vec<u32>,
        columns: Arc<PgColumns>,
    ) -> Arc<PreparedStatementState> {
        let anonymous = name.is_empty();
        let state = Arc::new(PreparedStatementState::new(name, query.to_owned(), parameter_oids, columns));

        if !anonymous {
            if let Some((_, evicted)) = self.cache.insert(query, state.clone()) {
                self.queue_close(&evicted);
            }
        }

        state
    }

    fn queue_close(&mut self, state: &Arc<PreparedStatementState>) {
        state.mark_closed();
        if state.ref_count() == 0 && !state.name.is_empty() {
            self.pending_close.push(state.name.clone());
        }
    }

    /// Drains the queue of statement names due for a server-side `Close`,
    /// issued after every prepare (spec.md §4.4 step 4).
    pub fn drain_pending_close(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_close)
    }

    pub fn invalidate(&mut self, query: &str) {
        if let Some(state) = self.cache.remove(query) {
            self.queue_close(&state);
        }
    }

    pub fn clear(&mut self) {
        for (_, state) in self.cache.clear() {
            self.queue_close(&state);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Arc<PgColumns> {
        Arc::new(PgColumns::new(crate::message::RowDescription { fields: Vec::new() }))
    }

    #[test]
    fn reserve_name_then_insert_round_trip() {
        let mut cache = StmtCache::new(4, 1024);
        let name = cache.reserve_name("SELECT 1");
        assert!(!name.is_empty());
        let state = cache.insert("SELECT 1", name.clone(), Vec::new(), columns());
        assert_eq!(state.name, name);
        assert_eq!(cache.len(), 1);

        let cached = cache.get("SELECT 1").expect("cache hit");
        assert_eq!(cached.name, name);
    }

    #[test]
    fn disabled_cache_always_reserves_anonymous_names() {
        let mut cache = StmtCache::new(0, 1024);
        assert_eq!(cache.reserve_name("SELECT 1"), "");
        let state = cache.insert("SELECT 1", String::new(), Vec::new(), columns());
        assert!(state.name.is_empty());
        assert_eq!(cache.len(), 0);
        assert!(cache.get("SELECT 1").is_none());
    }

    #[test]
    fn oversized_statement_is_not_cached() {
        let mut cache = StmtCache::new(4, 4);
        assert_eq!(cache.reserve_name("SELECT 1234567890"), "");
    }

    #[test]
    fn eviction_with_no_live_handles_queues_close_immediately() {
        let mut cache = StmtCache::new(1, 1024);
        let name1 = cache.reserve_name("SELECT 1");
        cache.insert("SELECT 1", name1.clone(), Vec::new(), columns());

        let name2 = cache.reserve_name("SELECT 2");
        cache.insert("SELECT 2", name2, Vec::new(), columns());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.drain_pending_close(), vec![name1]);
    }

    #[test]
    fn eviction_with_a_live_handle_defers_close_until_drop() {
        let mut cache = StmtCache::new(1, 1024);
        let name1 = cache.reserve_name("SELECT 1");
        let state1 = cache.insert("SELECT 1", name1.clone(), Vec::new(), columns());
        let handle = state1.acquire();

        let name2 = cache.reserve_name("SELECT 2");
        cache.insert("SELECT 2", name2, Vec::new(), columns());

        assert!(cache.drain_pending_close().is_empty());
        assert!(!handle.should_close_on_drop());

        drop(handle);
        assert!(state1.is_closed());
    }

    #[test]
    fn invalidate_queues_close_for_an_unreferenced_statement() {
        let mut cache = StmtCache::new(4, 1024);
        let name = cache.reserve_name("SELECT 1");
        cache.insert("SELECT 1", name.clone(), Vec::new(), columns());

        cache.invalidate("SELECT 1");
        assert!(cache.get("SELECT 1").is_none());
        assert_eq!(cache.drain_pending_close(), vec![name]);
    }
}
