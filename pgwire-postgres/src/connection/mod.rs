//! `PgConnection` — one live session: transport, protocol state, type
//! registry, statement cache, and notification listeners (spec.md §3
//! `Connection`).

mod cancel;
mod codec;
mod establish;
pub(crate) mod executor;
mod listen;
mod stmt_cache;
mod stream;
mod tls;

pub use cancel::CancelToken;
pub use listen::{quote_ident, ListenerFn};
pub use stmt_cache::{PreparedStatementState, StatementHandle};

use std::sync::Arc;

use futures_channel::mpsc::UnboundedReceiver;

use crate::error::Error;
use crate::message::{CloseKind, FormatCode, Notification, TransactionStatus};
use crate::options::PgConnectOptions;
use crate::row::PgColumns;
use crate::types::TypeRegistry;
use crate::Result;

use self::stream::PgStream;

/// A prepared statement handle returned by [`PgConnection::prepare`]:
/// the cached/anonymous name plus enough metadata to bind parameters and
/// decode rows without another round trip (spec.md §4.4).
pub struct PreparedStatement {
    state: Arc<PreparedStatementState>,
    _handle: StatementHandle,
}

impl PreparedStatement {
    pub fn parameter_oids(&self) -> &[u32] {
        &self.state.parameter_oids
    }

    pub fn columns(&self) -> &Arc<PgColumns> {
        &self.state.columns
    }

    pub(crate) fn name(&self) -> &str {
        &self.state.name
    }
}

/// Common operations shared by a direct [`PgConnection`] and a connection
/// checked out from a [`crate::pool::Pool`] (spec.md §4.6 — the pool wraps
/// rather than reimplements connection behavior).
pub trait Connection: Send {
    fn ping(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;
    fn close(self) -> impl std::future::Future<Output = Result<()>> + Send;
    fn transaction_status(&self) -> TransactionStatus;
}

impl Connection for PgConnection {
    async fn ping(&mut self) -> Result<()> {
        PgConnection::ping(self).await
    }

    async fn close(self) -> Result<()> {
        PgConnection::close(self).await
    }

    fn transaction_status(&self) -> TransactionStatus {
        PgConnection::transaction_status(self)
    }
}

pub struct PgConnection {
    stream: PgStream,
    options: PgConnectOptions,
    registry: TypeRegistry,
    stmt_cache: stmt_cache::StmtCache,
    cancel_token: CancelToken,

    /// Depth of the savepoint stack a [`crate::transaction::Transaction`]
    /// maintains; zero means not inside a transaction (spec.md §3 `top_xact`).
    pub(crate) transaction_depth: u32,

    next_portal_id: u64,
    aborted: bool,

    /// Completed round trips, for [`crate::pool::PoolOptions::max_queries`]
    /// (spec.md §4.6). Counts `simple_query` and `execute_prepared` calls,
    /// not the retried attempt a stale-plan recovery makes internally.
    queries_executed: u64,
}

impl PgConnection {
    /// Opens a new connection, performing the full handshake described in
    /// spec.md §4.2 steps 1-4.
    pub async fn connect(options: PgConnectOptions) -> Result<Self> {
        let stream = establish::establish(&options).await?;

        let cancel_token = stream
            .backend_key_data
            .map(CancelToken::from_backend_key_data)
            .ok_or_else(|| Error::protocol("server never sent BackendKeyData"))?;

        Ok(PgConnection {
            stream,
            stmt_cache: stmt_cache::StmtCache::new(
                options.statement_cache_capacity,
                options.max_cacheable_statement_size,
            ),
            registry: TypeRegistry::bootstrap(),
            cancel_token,
            transaction_depth: 0,
            next_portal_id: 0,
            aborted: false,
            queries_executed: 0,
            options,
        })
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.stream.transaction_status()
    }

    pub fn is_in_transaction(&self) -> bool {
        !matches!(self.transaction_status(), TransactionStatus::Idle)
    }

    pub(crate) fn queries_executed(&self) -> u64 {
        self.queries_executed
    }

    /// A round trip that only proves the connection is still alive
    /// (spec.md §4.6 pool `test_before_acquire`).
    pub async fn ping(&mut self) -> Result<()> {
        self.simple_query("SELECT 1").await.map(|_| ())
    }

    pub fn server_parameter(&self, name: &str) -> Option<&str> {
        self.stream.parameter(name)
    }

    pub fn server_version_num(&self) -> Option<u32> {
        self.stream.server_version_num
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel_token
    }

    /// Issues a cancel request on a brand-new connection (spec.md §4.2
    /// `cancel()`). Does not affect `self`'s own transport.
    pub async fn cancel_query(&self) -> Result<()> {
        self.cancel_token.send(&self.options).await
    }

    fn next_portal_name(&mut self) -> String {
        self.next_portal_id += 1;
        format!("pgwire_portal{}", self.next_portal_id)
    }

    /// Runs the simple query protocol (spec.md §4.2): no parameters, every
    /// column comes back as text, and multiple `;`-separated statements are
    /// all executed.
    pub async fn simple_query(&mut self, sql: &str) -> Result<(Vec<crate::row::PgRow>, String)> {
        self.queries_executed += 1;
        let result = executor::simple_query(&mut self.stream, sql).await;
        self.resync_on_error(&result).await;
        result
    }

    /// Prepares `sql`, reusing a cached statement when available. Unknown
    /// parameter/result type oids are introspected in one extra round trip
    /// (spec.md §4.3, §4.4).
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        if let Some(state) = self.stmt_cache.get(sql) {
            let handle = state.acquire();
            return Ok(PreparedStatement { state, _handle: handle });
        }

        let name = self.stmt_cache.reserve_name(sql);

        let parse_result = executor::parse(&mut self.stream, &name, sql, &[]).await;
        let outcome = match parse_result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.note_possible_abort(&err);
                return Err(err);
            }
        };

        // Collect the oids needing introspection from both the parameter
        // list and the row description (spec.md §4.3: one recursive round
        // trip per prepare, not one per oid).
        let mut oids: Vec<u32> = outcome.parameter_oids.clone();
        if let Some(columns) = &outcome.columns {
            oids.extend(columns.type_oids());
        }
        let missing = self.registry.missing(&oids);
        if !missing.is_empty() {
            executor::introspect(&mut self.stream, &mut self.registry, &missing).await?;
        }

        let columns = outcome
            .columns
            .unwrap_or_else(|| Arc::new(PgColumns::new(crate::message::RowDescription { fields: Vec::new() })));

        let state = self.stmt_cache.insert(sql, name, outcome.parameter_oids, columns);
        self.drain_pending_closes().await?;

        let handle = state.acquire();
        Ok(PreparedStatement { state, _handle: handle })
    }

    async fn drain_pending_closes(&mut self) -> Result<()> {
        for name in self.stmt_cache.drain_pending_close() {
            executor::close(&mut self.stream, CloseKind::Statement, &name).await?;
        }
        Ok(())
    }

    /// Binds `params` (already wire-encoded) to `statement` on a fresh
    /// portal and executes it to completion (spec.md §4.2 extended query).
    ///
    /// Outside a transaction, a stale cached plan (spec.md §4.3) is
    /// recovered transparently: the offending statement is evicted and
    /// re-prepared, and the bind/execute is retried exactly once. Inside a
    /// transaction the error surfaces as-is -- the transaction is already
    /// aborted and only `ROLLBACK` can recover it (spec.md scenario 3).
    pub async fn execute_prepared(
        &mut self,
        statement: &PreparedStatement,
        param_formats: &[FormatCode],
        params: &[Option<&[u8]>],
        result_formats: &[FormatCode],
    ) -> Result<executor::ExecResult> {
        self.queries_executed += 1;
        let result = self
            .execute_prepared_once(statement, param_formats, params, result_formats)
            .await;

        match result {
            Err(Error::InvalidCachedStatement) if !self.is_in_transaction() => {
                self.stmt_cache.invalidate(&statement.state.query);
                let reprepared = self.prepare(&statement.state.query).await?;
                self.execute_prepared_once(&reprepared, param_formats, params, result_formats)
                    .await
            }
            Err(Error::OutdatedSchemaCache(_)) if !self.is_in_transaction() => {
                self.invalidate_statement_types(&statement.state);
                self.stmt_cache.invalidate(&statement.state.query);
                let reprepared = self.prepare(&statement.state.query).await?;
                self.execute_prepared_once(&reprepared, param_formats, params, result_formats)
                    .await
            }
            other => other,
        }
    }

    async fn execute_prepared_once(
        &mut self,
        statement: &PreparedStatement,
        param_formats: &[FormatCode],
        params: &[Option<&[u8]>],
        result_formats: &[FormatCode],
    ) -> Result<executor::ExecResult> {
        let portal = self.next_portal_name();
        let result = executor::bind_execute(
            &mut self.stream,
            statement.name(),
            &portal,
            param_formats,
            params,
            result_formats,
            0,
            Some(statement.state.columns.clone()),
        )
        .await;
        self.resync_on_error(&result).await;
        result
    }

    /// Drops every type-registry entry (and its transitive dependents --
    /// array/range/composite members) that `statement`'s parameters or
    /// result columns reference, so the next `prepare` of the same query
    /// re-introspects rather than reusing descriptors the server has
    /// already told us are stale (spec.md §4.3).
    fn invalidate_statement_types(&mut self, statement: &PreparedStatementState) {
        let mut oids = statement.parameter_oids.clone();
        oids.extend(statement.columns.type_oids());
        self.registry.invalidate_dependents(&oids);
    }

    /// Binds `params` to a fresh portal on `statement` without executing it,
    /// returning the portal's name (spec.md §4.5 cursor open: `Bind`+`Sync`,
    /// rows pulled later by repeated `Execute(limit)`).
    pub(crate) async fn open_portal(
        &mut self,
        statement: &PreparedStatement,
        param_formats: &[FormatCode],
        params: &[Option<&[u8]>],
    ) -> Result<String> {
        let portal = self.next_portal_name();
        let result = executor::bind_only(&mut self.stream, statement.name(), &portal, param_formats, params).await;
        self.resync_on_error(&result).await;
        result.map(|()| portal)
    }

    /// Terminates the connection gracefully (spec.md §4.2 `close()`).
    pub async fn close(mut self) -> Result<()> {
        self.stream.send(&crate::message::Terminate).await?;
        self.stream.shutdown().await
    }

    pub fn add_listener(&mut self, channel: impl Into<String>, callback: ListenerFn) {
        self.stream.listeners.add(channel, callback);
    }

    pub fn remove_listener(&mut self, channel: &str) {
        self.stream.listeners.remove(channel);
    }

    /// Registers the channel that `LISTEN`/`UNLISTEN`-driven
    /// `NotificationResponse`s are pushed to, returning the receiving half
    /// (spec.md §4.5 `PgListener`-style API).
    pub fn take_notification_receiver(&mut self) -> UnboundedReceiver<Notification> {
        let (sender, receiver) = listen::notification_channel();
        self.stream.notifications = Some(sender);
        receiver
    }

    /// After an extended-query error, the server enters the failed
    /// sub-transaction state and `Sync` alone restores `ReadyForQuery`; this
    /// was already consumed by the `executor` call, so here we only track
    /// the aborted flag for the owning `Transaction` (spec.md §4.5 FAILED).
    async fn resync_on_error<T>(&mut self, result: &Result<T>) {
        if let Err(err) = result {
            self.note_possible_abort(err);
        }
    }

    fn note_possible_abort(&mut self, err: &Error) {
        let poisons_transaction = matches!(
            err,
            Error::Database { .. } | Error::InvalidCachedStatement | Error::OutdatedSchemaCache(_)
        );
        if poisons_transaction && self.transaction_depth > 0 {
            self.aborted = true;
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub(crate) fn clear_aborted(&mut self) {
        self.aborted = false;
    }

    pub(crate) fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub(crate) fn stream_mut(&mut self) -> &mut PgStream {
        &mut self.stream
    }
}
