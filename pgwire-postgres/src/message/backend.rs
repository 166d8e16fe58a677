use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::message::buf_ext::BufExt;
use crate::message::{BackendMessage, BackendMessageFormat};
use crate::Result;

/// A framed-but-undecoded message read off the wire. Call
/// [`decode`](Self::decode) with the expected [`BackendMessage`] type.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub format: BackendMessageFormat,
    pub contents: Bytes,
}

impl ReceivedMessage {
    pub fn decode<B: BackendMessage>(&self) -> Result<B> {
        if self.format != B::FORMAT {
            return Err(Error::protocol(format!(
                "expected {:?}, got {:?}",
                B::FORMAT,
                self.format
            )));
        }
        B::decode_body(self.contents.clone())
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticationSasl {
    pub mechanisms: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Md5PasswordSalt {
    pub salt: [u8; 4],
}

#[derive(Debug, Clone)]
pub enum Authentication {
    Ok,
    CleartextPassword,
    Md5Password(Md5PasswordSalt),
    Sasl(AuthenticationSasl),
    SaslContinue(Bytes),
    SaslFinal(Bytes),
    /// A method we don't speak; the raw sub-code is kept for the error
    /// message (spec: "Any other scheme -> fail with
    /// UnsupportedAuthenticationMethod").
    Unknown(u32),
}

impl BackendMessage for Authentication {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::Authentication;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let code = buf.get_u32();
        Ok(match code {
            0 => Authentication::Ok,
            3 => Authentication::CleartextPassword,
            5 => {
                if buf.remaining() < 4 {
                    return Err(Error::protocol("truncated AuthenticationMD5Password"));
                }
                let mut salt = [0u8; 4];
                buf.copy_to_slice(&mut salt);
                Authentication::Md5Password(Md5PasswordSalt { salt })
            }
            10 => {
                let mut mechanisms = Vec::new();
                while buf.has_remaining() && buf[0] != 0 {
                    let mechanism = buf.get_cstr()?;
                    mechanisms.push(String::from_utf8_lossy(&mechanism).into_owned());
                }
                Authentication::Sasl(AuthenticationSasl { mechanisms })
            }
            11 => Authentication::SaslContinue(buf),
            12 => Authentication::SaslFinal(buf),
            other => Authentication::Unknown(other),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackendKeyData {
    pub process_id: u32,
    pub secret_key: u32,
}

impl BackendMessage for BackendKeyData {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::BackendKeyData;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        Ok(BackendKeyData {
            process_id: buf.get_u32(),
            secret_key: buf.get_u32(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ParameterStatus {
    pub name: String,
    pub value: String,
}

impl BackendMessage for ParameterStatus {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::ParameterStatus;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let name = String::from_utf8_lossy(&buf.get_cstr()?).into_owned();
        let value = String::from_utf8_lossy(&buf.get_cstr()?).into_owned();
        Ok(ParameterStatus { name, value })
    }
}

/// Transaction status reported on every `ReadyForQuery`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransactionStatus {
    Idle,
    Transaction,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    pub transaction_status: TransactionStatus,
}

impl BackendMessage for ReadyForQuery {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::ReadyForQuery;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let status = buf.get_u8();
        let transaction_status = match status {
            b'I' => TransactionStatus::Idle,
            b'T' => TransactionStatus::Transaction,
            b'E' => TransactionStatus::Error,
            other => {
                return Err(Error::protocol(format!(
                    "unknown transaction status byte: {:?}",
                    other as char
                )))
            }
        };
        Ok(ReadyForQuery { transaction_status })
    }
}

#[derive(Debug, Clone)]
pub struct RowField {
    pub name: String,
    pub table_oid: u32,
    pub column_attr_number: i16,
    pub type_oid: u32,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: i16,
}

#[derive(Debug, Clone)]
pub struct RowDescription {
    pub fields: Vec<RowField>,
}

impl BackendMessage for RowDescription {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::RowDescription;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let count = buf.get_i16();
        let mut fields = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let name = String::from_utf8_lossy(&buf.get_cstr()?).into_owned();
            let table_oid = buf.get_u32();
            let column_attr_number = buf.get_i16();
            let type_oid = buf.get_u32();
            let type_size = buf.get_i16();
            let type_modifier = buf.get_i32();
            let format = buf.get_i16();
            fields.push(RowField {
                name,
                table_oid,
                column_attr_number,
                type_oid,
                type_size,
                type_modifier,
                format,
            });
        }
        Ok(RowDescription { fields })
    }
}

#[derive(Debug, Clone)]
pub struct ParameterDescription {
    pub param_types: Vec<u32>,
}

impl BackendMessage for ParameterDescription {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::ParameterDescription;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let count = buf.get_i16();
        let mut param_types = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            param_types.push(buf.get_u32());
        }
        Ok(ParameterDescription { param_types })
    }
}

#[derive(Debug, Clone)]
pub struct DataRow {
    pub values: Vec<Option<Bytes>>,
}

impl BackendMessage for DataRow {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::DataRow;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let count = buf.get_i16();
        let mut values = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let len = buf.get_i32();
            if len < 0 {
                values.push(None);
            } else {
                let len = len as usize;
                if buf.remaining() < len {
                    return Err(Error::protocol("DataRow column length exceeds message"));
                }
                values.push(Some(buf.copy_to_bytes(len)));
            }
        }
        Ok(DataRow { values })
    }
}

#[derive(Debug, Clone)]
pub struct CommandComplete {
    pub tag: String,
}

impl CommandComplete {
    /// Parses the trailing row count out of tags like `"INSERT 0 5"`,
    /// `"UPDATE 3"`, `"DELETE 2"`, `"SELECT 10"`, `"COPY 100"`. Commands with
    /// no row count (`"BEGIN"`, `"CREATE TABLE"`, ...) return `0`.
    pub fn rows_affected(&self) -> u64 {
        self.tag
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

impl BackendMessage for CommandComplete {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::CommandComplete;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let tag = String::from_utf8_lossy(&buf.get_cstr()?).into_owned();
        Ok(CommandComplete { tag })
    }
}

macro_rules! unit_message {
    ($name:ident, $format:ident) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl BackendMessage for $name {
            const FORMAT: BackendMessageFormat = BackendMessageFormat::$format;

            fn decode_body(_buf: Bytes) -> Result<Self> {
                Ok($name)
            }
        }
    };
}

unit_message!(ParseComplete, ParseComplete);
unit_message!(BindComplete, BindComplete);
unit_message!(CloseComplete, CloseComplete);
unit_message!(NoData, NoData);
unit_message!(PortalSuspended, PortalSuspended);
unit_message!(EmptyQueryResponse, EmptyQueryResponse);

#[derive(Debug, Clone)]
pub struct CopyResponseData {
    pub format: i8,
    pub num_columns: i16,
    pub format_codes: Vec<i16>,
}

impl CopyResponseData {
    fn parse(mut buf: Bytes) -> Result<Self> {
        let format = buf.get_i8();
        let num_columns = buf.get_i16();
        let mut format_codes = Vec::with_capacity(num_columns.max(0) as usize);
        for _ in 0..num_columns {
            format_codes.push(buf.get_i16());
        }
        Ok(CopyResponseData {
            format,
            num_columns,
            format_codes,
        })
    }
}

pub struct CopyInResponse(pub CopyResponseData);

impl BackendMessage for CopyInResponse {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::CopyInResponse;

    fn decode_body(buf: Bytes) -> Result<Self> {
        Ok(CopyInResponse(CopyResponseData::parse(buf)?))
    }
}

pub struct CopyOutResponse(pub CopyResponseData);

impl BackendMessage for CopyOutResponse {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::CopyOutResponse;

    fn decode_body(buf: Bytes) -> Result<Self> {
        Ok(CopyOutResponse(CopyResponseData::parse(buf)?))
    }
}

pub struct CopyBothResponse(pub CopyResponseData);

impl BackendMessage for CopyBothResponse {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::CopyBothResponse;

    fn decode_body(buf: Bytes) -> Result<Self> {
        Ok(CopyBothResponse(CopyResponseData::parse(buf)?))
    }
}

pub struct CopyDataChunk(pub Bytes);

impl BackendMessage for CopyDataChunk {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::CopyData;

    fn decode_body(buf: Bytes) -> Result<Self> {
        Ok(CopyDataChunk(buf))
    }
}

unit_message!(CopyDoneAck, CopyDone);

#[derive(Debug, Clone)]
pub struct Notification {
    pub process_id: u32,
    pub channel: Bytes,
    pub payload: Bytes,
}

impl BackendMessage for Notification {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::NotificationResponse;

    fn decode_body(mut buf: Bytes) -> Result<Self> {
        let process_id = buf.get_u32();
        let channel = buf.get_cstr()?;
        let payload = buf.get_cstr()?;
        Ok(Notification {
            process_id,
            channel,
            payload,
        })
    }
}

/// The set of named fields PostgreSQL attaches to an `ErrorResponse` or
/// `NoticeResponse`; see spec.md §7 for the full list this exposes.
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<String>,
    pub internal_position: Option<String>,
    pub internal_query: Option<String>,
    pub where_: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub data_type_name: Option<String>,
    pub constraint_name: Option<String>,
    pub server_source_filename: Option<String>,
    pub server_source_line: Option<String>,
    pub server_source_function: Option<String>,
}

impl ErrorFields {
    fn parse(mut buf: Bytes) -> Result<Self> {
        let mut fields = ErrorFields::default();

        loop {
            if !buf.has_remaining() {
                return Err(Error::protocol("ErrorResponse/NoticeResponse missing terminator"));
            }
            let field_type = buf.get_u8();
            if field_type == 0 {
                break;
            }
            let value = String::from_utf8_lossy(&buf.get_cstr()?).into_owned();
            match field_type {
                b'S' => fields.severity = value,
                b'C' => fields.code = value,
                b'M' => fields.message = value,
                b'D' => fields.detail = Some(value),
                b'H' => fields.hint = Some(value),
                b'P' => fields.position = Some(value),
                b'p' => fields.internal_position = Some(value),
                b'q' => fields.internal_query = Some(value),
                b'W' => fields.where_ = Some(value),
                b's' => fields.schema_name = Some(value),
                b't' => fields.table_name = Some(value),
                b'c' => fields.column_name = Some(value),
                b'd' => fields.data_type_name = Some(value),
                b'n' => fields.constraint_name = Some(value),
                b'F' => fields.server_source_filename = Some(value),
                b'L' => fields.server_source_line = Some(value),
                b'R' => fields.server_source_function = Some(value),
                // Localized severity ('V') and unknown fields are ignored.
                _ => {}
            }
        }

        Ok(fields)
    }
}

#[derive(Debug, Clone)]
pub struct ErrorResponse(pub ErrorFields);

impl BackendMessage for ErrorResponse {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::ErrorResponse;

    fn decode_body(buf: Bytes) -> Result<Self> {
        Ok(ErrorResponse(ErrorFields::parse(buf)?))
    }
}

#[derive(Debug, Clone)]
pub struct Notice(pub ErrorFields);

impl Notice {
    pub fn severity(&self) -> &str {
        &self.0.severity
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }
}

impl BackendMessage for Notice {
    const FORMAT: BackendMessageFormat = BackendMessageFormat::NoticeResponse;

    fn decode_body(buf: Bytes) -> Result<Self> {
        Ok(Notice(ErrorFields::parse(buf)?))
    }
}

/// Either variant, used by code paths (like the codec) that need to parse
/// the field list before deciding which backend error type to produce.
pub enum NoticeOrError {
    Notice(Notice),
    Error(ErrorResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_affected_parses_the_trailing_count() {
        assert_eq!(CommandComplete { tag: "INSERT 0 5".to_owned() }.rows_affected(), 5);
        assert_eq!(CommandComplete { tag: "UPDATE 3".to_owned() }.rows_affected(), 3);
        assert_eq!(CommandComplete { tag: "DELETE 2".to_owned() }.rows_affected(), 2);
        assert_eq!(CommandComplete { tag: "SELECT 10".to_owned() }.rows_affected(), 10);
        assert_eq!(CommandComplete { tag: "COPY 100".to_owned() }.rows_affected(), 100);
    }

    #[test]
    fn rows_affected_is_zero_for_tags_without_a_count() {
        assert_eq!(CommandComplete { tag: "BEGIN".to_owned() }.rows_affected(), 0);
        assert_eq!(CommandComplete { tag: "CREATE TABLE".to_owned() }.rows_affected(), 0);
    }

    #[test]
    fn command_complete_decodes_cstring_tag() {
        let buf = Bytes::from_static(b"INSERT 0 1\0");
        let parsed = CommandComplete::decode_body(buf).unwrap();
        assert_eq!(parsed.tag, "INSERT 0 1");
        assert_eq!(parsed.rows_affected(), 1);
    }

    #[test]
    fn ready_for_query_decodes_each_status_byte() {
        assert!(matches!(
            ReadyForQuery::decode_body(Bytes::from_static(b"I")).unwrap().transaction_status,
            TransactionStatus::Idle
        ));
        assert!(matches!(
            ReadyForQuery::decode_body(Bytes::from_static(b"T")).unwrap().transaction_status,
            TransactionStatus::Transaction
        ));
        assert!(matches!(
            ReadyForQuery::decode_body(Bytes::from_static(b"E")).unwrap().transaction_status,
            TransactionStatus::Error
        ));
    }

    #[test]
    fn ready_for_query_rejects_unknown_status_byte() {
        assert!(ReadyForQuery::decode_body(Bytes::from_static(b"?")).is_err());
    }
}
