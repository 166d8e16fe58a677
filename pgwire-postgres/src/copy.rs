//! The `COPY` protocol: bulk `COPY TO`/`COPY FROM` over `CopyData` messages
//! (spec.md §4.2/§4.5 `copy_out`/`copy_in`).

use bytes::Bytes;

use crate::connection::PgConnection;
use crate::error::Error;
use crate::message::{
    BackendMessageFormat, CopyData, CopyDataChunk, CopyDone, CopyDoneAck, CopyFail, CopyInResponse,
    CopyOutResponse, Query, ReadyForQuery,
};
use crate::Result;

/// The 11-byte signature every binary-format `COPY` stream starts with,
/// followed by a 4-byte flags field and a 4-byte header extension length
/// (both zero here, since no extension is used).
pub const BINARY_COPY_SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";

/// `COPY ... TO STDOUT` -- streams the server's output a chunk at a time.
/// Callers drive this with `next_chunk` in a loop until it returns `None`.
pub struct CopyOut<'c> {
    conn: &'c mut PgConnection,
    done: bool,
}

impl<'c> CopyOut<'c> {
    pub async fn begin(conn: &'c mut PgConnection, sql: &str) -> Result<Self> {
        let stream = conn.stream_mut();
        stream.send(&Query(sql)).await?;

        loop {
            let message = stream.recv().await?;
            match message.format {
                BackendMessageFormat::CopyOutResponse => {
                    let _: CopyOutResponse = message.decode()?;
                    return Ok(CopyOut { conn, done: false });
                }
                BackendMessageFormat::ReadyForQuery => {
                    return Err(Error::interface("query did not start a COPY TO STDOUT stream"));
                }
                _ => {}
            }
        }
    }

    /// Returns the next chunk of copied data, or `None` once the stream and
    /// the trailing `CommandComplete`/`ReadyForQuery` have been consumed.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        let stream = self.conn.stream_mut();
        loop {
            let message = stream.recv().await?;
            match message.format {
                BackendMessageFormat::CopyData => {
                    let CopyDataChunk(data) = message.decode()?;
                    return Ok(Some(data));
                }
                BackendMessageFormat::CopyDone => {
                    let _: CopyDoneAck = message.decode()?;
                }
                BackendMessageFormat::CommandComplete => {}
                BackendMessageFormat::ReadyForQuery => {
                    let _: ReadyForQuery = message.decode()?;
                    self.done = true;
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

/// `COPY ... FROM STDIN` -- callers push chunks with `send_chunk`, then call
/// `finish` (or `fail` to abort with an error message instead).
pub struct CopyIn<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> CopyIn<'c> {
    pub async fn begin(conn: &'c mut PgConnection, sql: &str) -> Result<Self> {
        let stream = conn.stream_mut();
        stream.send(&Query(sql)).await?;

        loop {
            let message = stream.recv().await?;
            match message.format {
                BackendMessageFormat::CopyInResponse => {
                    let _: CopyInResponse = message.decode()?;
                    return Ok(CopyIn { conn });
                }
                BackendMessageFormat::ReadyForQuery => {
                    return Err(Error::interface("query did not start a COPY FROM STDIN stream"));
                }
                _ => {}
            }
        }
    }

    pub async fn send_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.conn.stream_mut().send(&CopyData(data)).await
    }

    /// Sends `CopyDone` and drains to `ReadyForQuery`, returning the
    /// affected row count.
    pub async fn finish(self) -> Result<u64> {
        let tag = self.finish_tag().await?;
        Ok(crate::message::CommandComplete { tag }.rows_affected())
    }

    /// Like [`Self::finish`], but returns the raw `CommandComplete` tag
    /// (e.g. `"COPY 100"`) rather than just the row count, for callers that
    /// want to surface it verbatim (spec.md scenario 8).
    async fn finish_tag(self) -> Result<String> {
        let stream = self.conn.stream_mut();
        stream.send(&CopyDone).await?;

        let mut tag = String::new();
        loop {
            let message = stream.recv().await?;
            match message.format {
                BackendMessageFormat::CommandComplete => {
                    tag = message.decode::<crate::message::CommandComplete>()?.tag;
                }
                BackendMessageFormat::ReadyForQuery => {
                    let _: ReadyForQuery = message.decode()?;
                    return Ok(tag);
                }
                _ => {}
            }
        }
    }

    /// Aborts the copy with `CopyFail`, draining the resulting
    /// `ErrorResponse` and `ReadyForQuery` (spec.md §4.5 `copy_in` error
    /// path).
    pub async fn fail(self, reason: &str) -> Result<()> {
        let stream = self.conn.stream_mut();
        let send_result = stream.send(&CopyFail(reason)).await;
        if let Err(err) = send_result {
            return Err(err);
        }

        loop {
            match stream.recv().await {
                Ok(message) if message.format == BackendMessageFormat::ReadyForQuery => return Ok(()),
                Ok(_) => continue,
                Err(_) => return Ok(()),
            }
        }
    }
}

/// One column value for [`copy_records_to_table`], pre-encoded the same way
/// [`crate::query::Query::bind`] pre-encodes a bound parameter -- except
/// binary `COPY`'s per-tuple framing has no per-column format flag, so every
/// field goes in its type's binary representation regardless of
/// [`crate::value::Encode::format`].
pub struct CopyField(Option<Vec<u8>>);

impl CopyField {
    pub fn new<T: crate::value::Encode>(value: T) -> Self {
        let mut bytes = Vec::new();
        value.encode(&mut bytes);
        CopyField(Some(bytes))
    }

    pub fn null() -> Self {
        CopyField(None)
    }
}

/// Bulk-inserts `records` into `table` over a single binary-format `COPY
/// FROM STDIN` (spec.md scenario 8, asyncpg's `copy_records_to_table`).
/// `columns`, when given, names the target columns in the order each
/// record's fields appear in; omitted, the table's own column order is
/// used. Returns the server's command tag, e.g. `"COPY 100"`.
pub async fn copy_records_to_table(
    conn: &mut PgConnection,
    table: &str,
    columns: Option<&[&str]>,
    records: &[Vec<CopyField>],
) -> Result<String> {
    let column_list = columns.map(|cols| format!(" ({})", cols.join(", "))).unwrap_or_default();
    let sql = format!("COPY {table}{column_list} FROM STDIN (FORMAT binary)");

    let mut copy_in = CopyIn::begin(conn, &sql).await?;

    let mut header = Vec::with_capacity(BINARY_COPY_SIGNATURE.len() + 8);
    header.extend_from_slice(BINARY_COPY_SIGNATURE);
    header.extend_from_slice(&0i32.to_be_bytes()); // flags
    header.extend_from_slice(&0i32.to_be_bytes()); // header extension length
    copy_in.send_chunk(&header).await?;

    for record in records {
        let mut tuple = Vec::new();
        let field_count: i16 = record
            .len()
            .try_into()
            .map_err(|_| Error::interface("record has too many fields for a binary COPY tuple"))?;
        tuple.extend_from_slice(&field_count.to_be_bytes());
        for field in record {
            match &field.0 {
                Some(bytes) => {
                    let len: i32 = bytes
                        .len()
                        .try_into()
                        .map_err(|_| Error::interface("field value too large for a binary COPY tuple"))?;
                    tuple.extend_from_slice(&len.to_be_bytes());
                    tuple.extend_from_slice(bytes);
                }
                None => tuple.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        copy_in.send_chunk(&tuple).await?;
    }

    copy_in.send_chunk(&(-1i16).to_be_bytes()).await?;

    copy_in.finish_tag().await
}
