//! The ergonomic `execute`/`fetch*` surface built on top of
//! [`crate::connection::PgConnection::prepare`]/`execute_prepared` (spec.md
//! §4.5 high-level query API).

use crate::connection::PgConnection;
use crate::error::Error;
use crate::message::FormatCode;
use crate::row::PgRow;
use crate::value::Encode;
use crate::Result;

struct BoundParam {
    bytes: Option<Vec<u8>>,
    format: FormatCode,
}

/// A query plus its bound parameters, built up with [`Query::bind`] and run
/// with one of `execute`/`fetch_all`/`fetch_one`/`fetch_optional` (spec.md
/// §4.5: "parameters are positional, `$1`.. in the SQL text").
pub struct Query<'q> {
    sql: &'q str,
    params: Vec<BoundParam>,
}

impl<'q> Query<'q> {
    pub fn new(sql: &'q str) -> Self {
        Query { sql, params: Vec::new() }
    }

    /// Appends the next positional parameter, encoded immediately in its
    /// preferred wire format ([`Encode::format`]).
    pub fn bind<T: Encode>(mut self, value: T) -> Self {
        let mut bytes = Vec::new();
        value.encode(&mut bytes);
        self.params.push(BoundParam { bytes: Some(bytes), format: T::format() });
        self
    }

    pub fn bind_null(mut self, format: FormatCode) -> Self {
        self.params.push(BoundParam { bytes: None, format });
        self
    }

    async fn run(self, conn: &mut PgConnection) -> Result<crate::connection::executor::ExecResult> {
        let statement = conn.prepare(self.sql).await?;

        if statement.parameter_oids().len() != self.params.len() {
            return Err(Error::interface(format!(
                "query expects {} parameters, {} were bound",
                statement.parameter_oids().len(),
                self.params.len()
            )));
        }

        let formats: Vec<FormatCode> = self.params.iter().map(|p| p.format).collect();
        let values: Vec<Option<&[u8]>> = self.params.iter().map(|p| p.bytes.as_deref()).collect();

        conn.execute_prepared(&statement, &formats, &values, &[]).await
    }

    /// Runs the query, discarding any rows and returning the affected-row
    /// count from `CommandComplete`.
    pub async fn execute(self, conn: &mut PgConnection) -> Result<u64> {
        let result = self.run(conn).await?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(self, conn: &mut PgConnection) -> Result<Vec<PgRow>> {
        let result = self.run(conn).await?;
        Ok(result.rows)
    }

    pub async fn fetch_optional(self, conn: &mut PgConnection) -> Result<Option<PgRow>> {
        let mut rows = self.fetch_all(conn).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            _ => Err(Error::interface("fetch_optional: query returned more than one row")),
        }
    }

    pub async fn fetch_one(self, conn: &mut PgConnection) -> Result<PgRow> {
        self.fetch_optional(conn)
            .await?
            .ok_or_else(|| Error::interface("fetch_one: query returned no rows"))
    }
}

/// Shorthand for `Query::new(sql)`.
pub fn query(sql: &str) -> Query<'_> {
    Query::new(sql)
}
