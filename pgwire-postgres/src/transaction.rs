//! `Transaction` — a `BEGIN`/`COMMIT`/`ROLLBACK` scope with nested
//! savepoints (spec.md §3 `Transaction`, §4.5).

use crate::connection::PgConnection;
use crate::error::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[non_exhaustive]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
    Started,
    Committed,
    RolledBack,
    Failed,
}

/// A transaction or nested savepoint scope over a `&mut PgConnection`. Drop
/// without calling `commit`/`rollback` leaves the scope open on the server;
/// callers are expected to explicitly resolve it (spec.md §4.5 state
/// machine: NEW -> STARTED -> COMMITTED/ROLLED_BACK/FAILED).
pub struct Transaction<'c> {
    conn: &'c mut PgConnection,
    depth: u32,
    savepoint_name: Option<String>,
    state: State,
}

impl<'c> Transaction<'c> {
    /// Starts a new top-level transaction, or a nested savepoint if `conn`
    /// is already inside one (spec.md §4.5 "nested begin => savepoint").
    pub async fn begin(conn: &'c mut PgConnection) -> Result<Transaction<'c>> {
        Transaction::begin_with(conn, None).await
    }

    pub async fn begin_with_isolation(
        conn: &'c mut PgConnection,
        isolation: IsolationLevel,
    ) -> Result<Transaction<'c>> {
        Transaction::begin_with(conn, Some(isolation)).await
    }

    async fn begin_with(conn: &'c mut PgConnection, isolation: Option<IsolationLevel>) -> Result<Transaction<'c>> {
        if conn.is_aborted() {
            return Err(Error::InFailedTransaction);
        }

        let depth = conn.transaction_depth;
        let savepoint_name = if depth > 0 { Some(format!("pgwire_sp{depth}")) } else { None };

        let sql = match (&savepoint_name, isolation) {
            (Some(name), _) => format!("SAVEPOINT {name}"),
            (None, Some(level)) => format!("BEGIN ISOLATION LEVEL {}", level.sql()),
            (None, None) => "BEGIN".to_owned(),
        };

        conn.simple_query(&sql).await?;
        conn.transaction_depth += 1;

        Ok(Transaction {
            conn,
            depth: depth + 1,
            savepoint_name,
            state: State::Started,
        })
    }

    pub async fn commit(mut self) -> Result<()> {
        self.finish(true).await
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finish(false).await
    }

    async fn finish(&mut self, commit: bool) -> Result<()> {
        if self.state != State::Started {
            return Err(Error::interface("transaction already resolved"));
        }

        let aborted = self.conn.is_aborted();
        let sql = match (&self.savepoint_name, commit, aborted) {
            (Some(name), true, false) => format!("RELEASE SAVEPOINT {name}"),
            (Some(name), _, _) => format!("ROLLBACK TO SAVEPOINT {name}"),
            (None, true, false) => "COMMIT".to_owned(),
            (None, _, _) => "ROLLBACK".to_owned(),
        };

        let result = self.conn.simple_query(&sql).await;
        self.conn.transaction_depth -= 1;

        if self.depth == 1 {
            self.conn.clear_aborted();
        }

        self.state = if commit && !aborted { State::Committed } else { State::RolledBack };

        result.map(|_| ())
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        self.conn
    }

    pub fn is_aborted(&self) -> bool {
        self.conn.is_aborted()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == State::Started {
            self.state = State::Failed;
            tracing::warn!(
                target: "pgwire::postgres::transaction",
                depth = self.depth,
                "transaction dropped without commit or rollback; left open on the server"
            );
        }
    }
}
