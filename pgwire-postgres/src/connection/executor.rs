//! The steady-state protocol operations of spec.md §4.2: simple query,
//! extended query (parse/bind/execute/close), and the introspection
//! round-trip that backs the statement cache.

use std::sync::Arc;

use crate::error::Error;
use crate::message::{
    Bind, BindComplete, BackendMessageFormat, Close, CloseComplete, CloseKind, CommandComplete,
    DataRow, Describe, DescribeKind, Execute, FormatCode, NoData, ParameterDescription, Parse,
    ParseComplete, PortalSuspended, Query, ReadyForQuery, RowDescription, SyncMessage,
};
use crate::row::{PgColumns, PgRow};
use crate::types::introspect::INTROSPECT_TYPES_QUERY;
use crate::types::{parse_oid_array, parse_text_array, IntrospectedTypeRow, TypeRegistry};
use crate::Result;

use super::stream::PgStream;

/// The outcome of one `bind_execute`/`execute_portal` round: the rows
/// produced, whether the portal was exhausted, and the command tag (empty
/// if the portal is still open).
pub struct ExecResult {
    pub rows: Vec<PgRow>,
    pub suspended: bool,
    pub command_tag: String,
}

impl ExecResult {
    pub fn rows_affected(&self) -> u64 {
        CommandComplete { tag: self.command_tag.clone() }.rows_affected()
    }
}

/// Builds a row, catching the shape drift spec.md §4.3 calls out: a cached
/// `RowDescription` whose column count no longer matches the `DataRow`
/// actually sent (e.g. a `VIEW` or composite type altered after the
/// statement was prepared). `recover_to_ready` drains the rest of the
/// extended-query response regardless of why its caller's `Result` is an
/// `Err`, so raising here composes with it exactly like a genuine
/// `ErrorResponse` does.
fn build_row(columns: Arc<PgColumns>, values: Vec<Option<bytes::Bytes>>) -> Result<PgRow> {
    if values.len() != columns.len() {
        return Err(Error::OutdatedSchemaCache(format!(
            "server returned {} columns but {} were described",
            values.len(),
            columns.len()
        )));
    }
    Ok(PgRow::new(columns, values))
}

/// An `ErrorResponse` mid-extended-query puts the server in a failed
/// sub-transaction state it only leaves on the next `ReadyForQuery`; since
/// `PgStream::recv` surfaces that error immediately rather than returning
/// the message, the caller must keep draining (ignoring everything but the
/// eventual `ReadyForQuery`) before reporting the original error upward, or
/// the next command would read a stale `ReadyForQuery` instead of its own
/// first reply (spec.md §4.2, §4.5 FAILED state).
async fn recover_to_ready(stream: &mut PgStream, first_err: Error) -> Error {
    loop {
        match stream.recv().await {
            Ok(message) if message.format == BackendMessageFormat::ReadyForQuery => return first_err,
            Ok(_) => continue,
            Err(_) => return first_err,
        }
    }
}

/// `Query(sql)` -- consumes everything up to `ReadyForQuery` (spec.md §4.2).
/// Returns the status tag of the last `CommandComplete` and any rows from
/// the final `RowDescription`/`DataRow` group (simple query only ever
/// returns text-format columns).
pub async fn simple_query(stream: &mut PgStream, sql: &str) -> Result<(Vec<PgRow>, String)> {
    match simple_query_inner(stream, sql).await {
        Ok(v) => Ok(v),
        Err(err) => Err(recover_to_ready(stream, err).await),
    }
}

async fn simple_query_inner(stream: &mut PgStream, sql: &str) -> Result<(Vec<PgRow>, String)> {
    stream.send(&Query(sql)).await?;

    let mut columns: Option<Arc<PgColumns>> = None;
    let mut rows = Vec::new();
    let mut tag = String::new();

    loop {
        let message = stream.recv().await?;
        match message.format {
            BackendMessageFormat::RowDescription => {
                let description: RowDescription = message.decode()?;
                columns = Some(Arc::new(PgColumns::new(description)));
            }
            BackendMessageFormat::DataRow => {
                let DataRow { values } = message.decode()?;
                let cols = columns
                    .clone()
                    .ok_or_else(|| Error::protocol("DataRow before RowDescription"))?;
                rows.push(build_row(cols, values)?);
            }
            BackendMessageFormat::CommandComplete => {
                let complete: CommandComplete = message.decode()?;
                tag = complete.tag;
            }
            BackendMessageFormat::EmptyQueryResponse => {}
            BackendMessageFormat::ReadyForQuery => {
                let _: ReadyForQuery = message.decode()?;
                return Ok((rows, tag));
            }
            _ => {}
        }
    }
}

pub struct ParseOutcome {
    pub parameter_oids: Vec<u32>,
    pub columns: Option<Arc<PgColumns>>,
}

/// `Parse` + `Describe(S, name)` + `Sync` (spec.md §4.2).
pub async fn parse(stream: &mut PgStream, name: &str, sql: &str, expected: &[u32]) -> Result<ParseOutcome> {
    match parse_inner(stream, name, sql, expected).await {
        Ok(v) => Ok(v),
        Err(err) => Err(recover_to_ready(stream, err).await),
    }
}

async fn parse_inner(stream: &mut PgStream, name: &str, sql: &str, expected: &[u32]) -> Result<ParseOutcome> {
    stream.enqueue(&Parse { statement: name, sql, param_types: expected })?;
    stream.enqueue(&Describe { kind: DescribeKind::Statement, name })?;
    stream.enqueue(&SyncMessage)?;
    stream.flush().await?;

    let _: ParseComplete = stream.recv_expect().await?;

    let parameter_oids = stream.recv_expect::<ParameterDescription>().await?.param_types;

    let message = stream.recv().await?;
    let columns = match message.format {
        BackendMessageFormat::RowDescription => {
            let description: RowDescription = message.decode()?;
            Some(Arc::new(PgColumns::new(description)))
        }
        BackendMessageFormat::NoData => {
            let _: NoData = message.decode()?;
            None
        }
        other => return Err(Error::protocol(format!("unexpected message {other:?} after ParameterDescription"))),
    };

    let _: ReadyForQuery = stream.recv_expect().await?;

    Ok(ParseOutcome { parameter_oids, columns })
}

/// `Bind` + `Execute(limit)` + `Sync`, streaming `DataRow`s until
/// `CommandComplete` or `PortalSuspended` (spec.md §4.2).
#[allow(clippy::too_many_arguments)]
pub async fn bind_execute(
    stream: &mut PgStream,
    statement: &str,
    portal: &str,
    param_formats: &[FormatCode],
    param_values: &[Option<&[u8]>],
    result_formats: &[FormatCode],
    row_limit: i32,
    columns: Option<Arc<PgColumns>>,
) -> Result<ExecResult> {
    match bind_execute_inner(stream, statement, portal, param_formats, param_values, result_formats, row_limit, columns).await {
        Ok(v) => Ok(v),
        Err(err) => Err(recover_to_ready(stream, err).await),
    }
}

#[allow(clippy::too_many_arguments)]
async fn bind_execute_inner(
    stream: &mut PgStream,
    statement: &str,
    portal: &str,
    param_formats: &[FormatCode],
    param_values: &[Option<&[u8]>],
    result_formats: &[FormatCode],
    row_limit: i32,
    columns: Option<Arc<PgColumns>>,
) -> Result<ExecResult> {
    stream.enqueue(&Bind {
        portal,
        statement,
        param_formats,
        param_values,
        result_formats,
    })?;
    stream.enqueue(&Execute { portal, max_rows: row_limit })?;
    stream.enqueue(&SyncMessage)?;
    stream.flush().await?;

    let _: BindComplete = stream.recv_expect().await?;

    let mut rows = Vec::new();
    let mut suspended = false;
    let mut tag = String::new();

    loop {
        let message = stream.recv().await?;
        match message.format {
            BackendMessageFormat::DataRow => {
                let DataRow { values } = message.decode()?;
                let cols = columns
                    .clone()
                    .ok_or_else(|| Error::protocol("DataRow without a known RowDescription"))?;
                rows.push(build_row(cols, values)?);
            }
            BackendMessageFormat::CommandComplete => {
                tag = message.decode::<CommandComplete>()?.tag;
            }
            BackendMessageFormat::PortalSuspended => {
                let _: PortalSuspended = message.decode()?;
                suspended = true;
            }
            BackendMessageFormat::EmptyQueryResponse => {}
            BackendMessageFormat::ReadyForQuery => {
                let _: ReadyForQuery = message.decode()?;
                return Ok(ExecResult { rows, suspended, command_tag: tag });
            }
            _ => {}
        }
    }
}

/// `Bind` + `Sync` with no `Execute` -- opens a portal without pulling any
/// rows yet, for callers (cursors) that issue their own `Execute(limit)`
/// rounds afterward (spec.md §4.5 cursor open).
pub async fn bind_only(
    stream: &mut PgStream,
    statement: &str,
    portal: &str,
    param_formats: &[FormatCode],
    param_values: &[Option<&[u8]>],
) -> Result<()> {
    match bind_only_inner(stream, statement, portal, param_formats, param_values).await {
        Ok(v) => Ok(v),
        Err(err) => Err(recover_to_ready(stream, err).await),
    }
}

async fn bind_only_inner(
    stream: &mut PgStream,
    statement: &str,
    portal: &str,
    param_formats: &[FormatCode],
    param_values: &[Option<&[u8]>],
) -> Result<()> {
    stream.enqueue(&Bind {
        portal,
        statement,
        param_formats,
        param_values,
        result_formats: &[],
    })?;
    stream.enqueue(&SyncMessage)?;
    stream.flush().await?;

    let _: BindComplete = stream.recv_expect().await?;
    let _: ReadyForQuery = stream.recv_expect().await?;
    Ok(())
}

/// `Execute` + `Sync` against an already-bound portal -- used by cursors for
/// paginated fetch (spec.md §4.2 `execute_portal`).
pub async fn execute_portal(
    stream: &mut PgStream,
    portal: &str,
    row_limit: i32,
    columns: Arc<PgColumns>,
) -> Result<ExecResult> {
    match execute_portal_inner(stream, portal, row_limit, columns).await {
        Ok(v) => Ok(v),
        Err(err) => Err(recover_to_ready(stream, err).await),
    }
}

async fn execute_portal_inner(
    stream: &mut PgStream,
    portal: &str,
    row_limit: i32,
    columns: Arc<PgColumns>,
) -> Result<ExecResult> {
    stream.enqueue(&Execute { portal, max_rows: row_limit })?;
    stream.enqueue(&SyncMessage)?;
    stream.flush().await?;

    let mut rows = Vec::new();
    let mut suspended = false;
    let mut tag = String::new();

    loop {
        let message = stream.recv().await?;
        match message.format {
            BackendMessageFormat::DataRow => {
                let DataRow { values } = message.decode()?;
                rows.push(build_row(columns.clone(), values)?);
            }
            BackendMessageFormat::CommandComplete => {
                tag = message.decode::<CommandComplete>()?.tag;
            }
            BackendMessageFormat::PortalSuspended => {
                let _: PortalSuspended = message.decode()?;
                suspended = true;
            }
            BackendMessageFormat::ReadyForQuery => {
                let _: ReadyForQuery = message.decode()?;
                return Ok(ExecResult { rows, suspended, command_tag: tag });
            }
            _ => {}
        }
    }
}

/// `Close(kind, name)` + `Sync` (spec.md §4.2).
pub async fn close(stream: &mut PgStream, kind: CloseKind, name: &str) -> Result<()> {
    match close_inner(stream, kind, name).await {
        Ok(v) => Ok(v),
        Err(err) => Err(recover_to_ready(stream, err).await),
    }
}

async fn close_inner(stream: &mut PgStream, kind: CloseKind, name: &str) -> Result<()> {
    stream.enqueue(&Close { kind, name })?;
    stream.enqueue(&SyncMessage)?;
    stream.flush().await?;

    let _: CloseComplete = stream.recv_expect().await?;
    let _: ReadyForQuery = stream.recv_expect().await?;
    Ok(())
}

/// Runs the fixed introspection query (spec.md §6) for `oids` in a single
/// recursive round trip and folds the resulting rows into `registry` (spec.md
/// §4.3: "a single recursive round-trip per prepare, not one per oid").
pub async fn introspect(stream: &mut PgStream, registry: &mut TypeRegistry, oids: &[u32]) -> Result<()> {
    if oids.is_empty() {
        return Ok(());
    }

    let literal = oid_array_literal(oids);
    let query = INTROSPECT_TYPES_QUERY.replacen("$1::oid[]", &literal, 1);

    let (rows, _) = simple_query(stream, &query).await?;

    let mut parsed = Vec::with_capacity(rows.len());
    for row in &rows {
        parsed.push(decode_introspection_row(row)?);
    }
    registry.insert_rows(parsed)?;
    Ok(())
}

fn oid_array_literal(oids: &[u32]) -> String {
    let mut s = String::from("'{");
    for (i, oid) in oids.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&oid.to_string());
    }
    s.push_str("}'::oid[]");
    s
}

fn decode_introspection_row(row: &PgRow) -> Result<IntrospectedTypeRow> {
    let get_text = |idx: usize| -> Result<Option<String>> {
        if row.is_null(idx) {
            Ok(None)
        } else {
            row.try_get::<String, usize>(idx).map(Some)
        }
    };

    let oid: String = get_text(0)?.ok_or_else(|| Error::protocol("introspection row missing oid"))?;
    let ns = get_text(1)?.unwrap_or_default();
    let name = get_text(2)?.unwrap_or_default();
    let kind = get_text(3)?.unwrap_or_default();
    let basetype = get_text(4)?;
    let elemtype = get_text(5)?;
    let range_subtype = get_text(6)?;
    let elem_has_bin_input = get_text(7)?.map(|s| s == "t").unwrap_or(false);
    let elem_has_bin_output = get_text(8)?.map(|s| s == "t").unwrap_or(false);
    let attrtypoids = get_text(9)?;
    let attrnames = get_text(10)?;

    Ok(IntrospectedTypeRow {
        oid: oid.parse().map_err(|_| Error::protocol("malformed oid in introspection row"))?,
        namespace: ns,
        name,
        kind: kind.chars().next().unwrap_or('b'),
        base_oid: basetype.and_then(|s| parse_optional_oid(&s)),
        elem_oid: elemtype.and_then(|s| parse_optional_oid(&s)),
        range_subtype: range_subtype.and_then(|s| parse_optional_oid(&s)),
        elem_has_bin_input,
        elem_has_bin_output,
        attr_type_oids: attrtypoids.map(|s| parse_oid_array(&s)).transpose()?.unwrap_or_default(),
        attr_names: attrnames.map(|s| parse_text_array(&s)).transpose()?.unwrap_or_default(),
    })
}

fn parse_optional_oid(s: &str) -> Option<u32> {
    let parsed: u32 = s.parse().ok()?;
    if parsed == 0 {
        None
    } else {
        Some(parsed)
    }
}
