//! `Cursor` — a paginated, server-side portal fetched a batch at a time
//! (spec.md §4.5 "awaitable cursor and async-iterator modes").

use std::sync::Arc;

use crate::connection::{executor, PgConnection};
use crate::error::Error;
use crate::message::FormatCode;
use crate::row::{PgColumns, PgRow};
use crate::Result;

/// A cursor bound to a portal on `conn`. `fetch_next` pulls up to
/// `prefetch` rows at a time; once the server reports the portal exhausted
/// (no `PortalSuspended`), further calls return an empty batch.
pub struct Cursor<'c> {
    conn: &'c mut PgConnection,
    portal: String,
    columns: Arc<PgColumns>,
    prefetch: i32,
    exhausted: bool,
}

impl<'c> Cursor<'c> {
    /// Prepares `sql`, binds `params`, and opens a portal without executing
    /// it yet -- rows are only pulled by `fetch_next`.
    pub async fn open(
        conn: &'c mut PgConnection,
        sql: &str,
        params: &[Option<&[u8]>],
        param_formats: &[FormatCode],
        prefetch: i32,
    ) -> Result<Cursor<'c>> {
        if prefetch < 1 {
            return Err(Error::interface(format!("cursor prefetch must be at least 1, got {prefetch}")));
        }

        let statement = conn.prepare(sql).await?;
        if statement.parameter_oids().len() != params.len() {
            return Err(Error::interface(format!(
                "cursor expects {} parameters, {} were bound",
                statement.parameter_oids().len(),
                params.len()
            )));
        }

        let portal = conn.open_portal(&statement, param_formats, params).await?;
        let columns = statement.columns().clone();

        Ok(Cursor { conn, portal, columns, prefetch, exhausted: false })
    }

    pub async fn fetch_next(&mut self) -> Result<Vec<PgRow>> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        let result = executor::execute_portal(
            self.conn.stream_mut(),
            &self.portal,
            self.prefetch,
            self.columns.clone(),
        )
        .await?;
        if !result.suspended {
            self.exhausted = true;
        }
        Ok(result.rows)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
