//! [`PoolOptions`] — the builder for [`super::Pool`] (spec.md §4.6 pool
//! configuration: min/max size, acquire timeout, idle reaping).

use std::time::Duration;

use crate::options::PgConnectOptions;
use crate::Result;

use super::inner::PoolInner;
use super::Pool;

/// Tuning knobs for a [`super::Pool`]. Defaults follow the same ballpark as
/// asyncpg's `create_pool` (`min_size=10, max_size=10`) loosened to a more
/// permissive `min_connections = 0` so an idle application doesn't hold
/// connections it never uses.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub(crate) max_connections: u32,
    pub(crate) min_connections: u32,
    pub(crate) acquire_timeout: Duration,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) max_lifetime: Option<Duration>,
    pub(crate) max_queries: Option<u64>,
    pub(crate) test_before_acquire: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            max_queries: None,
            test_before_acquire: true,
        }
    }
}

impl PoolOptions {
    pub fn new() -> Self {
        PoolOptions::default()
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// `None` disables idle reaping -- connections are kept until
    /// `max_lifetime` or the pool closes.
    pub fn idle_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.idle_timeout = timeout.into();
        self
    }

    pub fn max_lifetime(mut self, lifetime: impl Into<Option<Duration>>) -> Self {
        self.max_lifetime = lifetime.into();
        self
    }

    /// `None` (the default) never discards a connection for having served
    /// too many queries; `Some(n)` discards it on release once it has
    /// completed `n` or more (spec.md §4.6).
    pub fn max_queries(mut self, n: impl Into<Option<u64>>) -> Self {
        self.max_queries = n.into();
        self
    }

    /// Whether `acquire` pings a connection pulled from the idle queue
    /// before handing it out (spec.md §4.6).
    pub fn test_before_acquire(mut self, yes: bool) -> Self {
        self.test_before_acquire = yes;
        self
    }

    pub async fn connect(self, url: &str) -> Result<Pool> {
        self.connect_with(PgConnectOptions::parse(url)?).await
    }

    pub async fn connect_with(self, options: PgConnectOptions) -> Result<Pool> {
        let inner = PoolInner::new(options, self).await?;
        Ok(Pool { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = PoolOptions::default();
        assert_eq!(options.max_connections, 10);
        assert_eq!(options.min_connections, 0);
        assert_eq!(options.acquire_timeout, Duration::from_secs(30));
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(10 * 60)));
        assert_eq!(options.max_lifetime, Some(Duration::from_secs(30 * 60)));
        assert_eq!(options.max_queries, None);
        assert!(options.test_before_acquire);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let options = PoolOptions::new()
            .max_connections(5)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(1))
            .idle_timeout(None)
            .max_lifetime(Duration::from_secs(60))
            .max_queries(1000)
            .test_before_acquire(false);

        assert_eq!(options.max_connections, 5);
        assert_eq!(options.min_connections, 2);
        assert_eq!(options.acquire_timeout, Duration::from_secs(1));
        assert_eq!(options.idle_timeout, None);
        assert_eq!(options.max_lifetime, Some(Duration::from_secs(60)));
        assert_eq!(options.max_queries, Some(1000));
        assert!(!options.test_before_acquire);
    }
}
