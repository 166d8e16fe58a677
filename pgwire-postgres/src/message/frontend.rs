use crate::message::buf_ext::BufMutExt;
use crate::message::{FrontendMessage, CANCEL_REQUEST_MAGIC, SSL_REQUEST_MAGIC};
use crate::Result;

/// `SSLRequest` — 8-byte length + magic, no tag byte, sent before startup.
pub struct SslRequest;

impl SslRequest {
    /// The exact 8 bytes sent on the wire.
    pub fn to_bytes() -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&8u32.to_be_bytes());
        buf[4..8].copy_from_slice(&SSL_REQUEST_MAGIC.to_be_bytes());
        buf
    }
}

/// `CancelRequest` — 16-byte length + magic + pid + secret, no tag byte,
/// sent on a brand new connection to the same address.
pub struct CancelRequest {
    pub process_id: u32,
    pub secret_key: u32,
}

impl CancelRequest {
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&16u32.to_be_bytes());
        buf[4..8].copy_from_slice(&CANCEL_REQUEST_MAGIC.to_be_bytes());
        buf[8..12].copy_from_slice(&self.process_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.secret_key.to_be_bytes());
        buf
    }
}

/// The untagged startup message: `protocol version | (key, value)* | \0`.
pub struct Startup<'a> {
    pub username: Option<&'a str>,
    pub database: Option<&'a str>,
    pub params: &'a [(&'a str, &'a str)],
}

impl FrontendMessage for Startup<'_> {
    const TAG: Option<u8> = None;

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&super::STARTUP_MAGIC.to_be_bytes());

        if let Some(username) = self.username {
            buf.put_cstr("user");
            buf.put_cstr(username);
        }

        if let Some(database) = self.database {
            buf.put_cstr("database");
            buf.put_cstr(database);
        }

        for (key, value) in self.params {
            buf.put_cstr(key);
            buf.put_cstr(value);
        }

        buf.push(0);
        Ok(())
    }
}

pub enum Password<'a> {
    Cleartext(&'a str),
    Md5 {
        username: &'a str,
        password: &'a str,
        salt: [u8; 4],
    },
    SaslInitialResponse {
        mechanism: &'a str,
        data: &'a [u8],
    },
    SaslResponse(&'a [u8]),
}

impl FrontendMessage for Password<'_> {
    const TAG: Option<u8> = Some(b'p');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Password::Cleartext(password) => buf.put_cstr(password),
            Password::Md5 {
                username,
                password,
                salt,
            } => {
                let hashed = crate::message::scram::md5_password(username, password, salt);
                buf.put_cstr(&hashed);
            }
            Password::SaslInitialResponse { mechanism, data } => {
                buf.put_cstr(mechanism);
                buf.extend_from_slice(&(data.len() as i32).to_be_bytes());
                buf.extend_from_slice(data);
            }
            Password::SaslResponse(data) => {
                buf.extend_from_slice(data);
            }
        }
        Ok(())
    }
}

/// `Query` — the simple query protocol: one SQL string, possibly containing
/// multiple `;`-separated statements.
pub struct Query<'a>(pub &'a str);

impl FrontendMessage for Query<'_> {
    const TAG: Option<u8> = Some(b'Q');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_cstr(self.0);
        Ok(())
    }
}

/// `Parse` — create a (possibly anonymous) prepared statement.
pub struct Parse<'a> {
    pub statement: &'a str,
    pub sql: &'a str,
    pub param_types: &'a [u32],
}

impl FrontendMessage for Parse<'_> {
    const TAG: Option<u8> = Some(b'P');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_cstr(self.statement);
        buf.put_cstr(self.sql);
        buf.extend_from_slice(&(self.param_types.len() as i16).to_be_bytes());
        for oid in self.param_types {
            buf.extend_from_slice(&oid.to_be_bytes());
        }
        Ok(())
    }
}

/// Binary (`1`) or text (`0`) wire format for a parameter or result column.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FormatCode {
    Text,
    Binary,
}

impl FormatCode {
    fn code(self) -> i16 {
        match self {
            FormatCode::Text => 0,
            FormatCode::Binary => 1,
        }
    }
}

/// `Bind` — bind parameter values to a (possibly anonymous) portal.
pub struct Bind<'a> {
    pub portal: &'a str,
    pub statement: &'a str,
    pub param_formats: &'a [FormatCode],
    /// `None` means SQL `NULL`.
    pub param_values: &'a [Option<&'a [u8]>],
    pub result_formats: &'a [FormatCode],
}

impl FrontendMessage for Bind<'_> {
    const TAG: Option<u8> = Some(b'B');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_cstr(self.portal);
        buf.put_cstr(self.statement);

        buf.extend_from_slice(&(self.param_formats.len() as i16).to_be_bytes());
        for format in self.param_formats {
            buf.extend_from_slice(&format.code().to_be_bytes());
        }

        buf.extend_from_slice(&(self.param_values.len() as i16).to_be_bytes());
        for value in self.param_values {
            match value {
                Some(bytes) => {
                    buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    buf.extend_from_slice(bytes);
                }
                None => buf.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }

        buf.extend_from_slice(&(self.result_formats.len() as i16).to_be_bytes());
        for format in self.result_formats {
            buf.extend_from_slice(&format.code().to_be_bytes());
        }

        Ok(())
    }
}

/// `Execute` — run a portal, returning at most `max_rows` rows (`0` = no
/// limit).
pub struct Execute<'a> {
    pub portal: &'a str,
    pub max_rows: i32,
}

impl FrontendMessage for Execute<'_> {
    const TAG: Option<u8> = Some(b'E');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_cstr(self.portal);
        buf.extend_from_slice(&self.max_rows.to_be_bytes());
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DescribeKind {
    Statement,
    Portal,
}

impl DescribeKind {
    fn tag(self) -> u8 {
        match self {
            DescribeKind::Statement => b'S',
            DescribeKind::Portal => b'P',
        }
    }
}

/// `Describe` — ask for `ParameterDescription`/`RowDescription` of a
/// statement, or `RowDescription` of a portal.
pub struct Describe<'a> {
    pub kind: DescribeKind,
    pub name: &'a str,
}

impl FrontendMessage for Describe<'_> {
    const TAG: Option<u8> = Some(b'D');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.push(self.kind.tag());
        buf.put_cstr(self.name);
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CloseKind {
    Statement,
    Portal,
}

impl CloseKind {
    fn tag(self) -> u8 {
        match self {
            CloseKind::Statement => b'S',
            CloseKind::Portal => b'P',
        }
    }
}

/// `Close` — close a named (or anonymous) statement or portal.
pub struct Close<'a> {
    pub kind: CloseKind,
    pub name: &'a str,
}

impl FrontendMessage for Close<'_> {
    const TAG: Option<u8> = Some(b'C');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.push(self.kind.tag());
        buf.put_cstr(self.name);
        Ok(())
    }
}

/// `Sync` — ends a batch of extended-query messages, prompting a
/// `ReadyForQuery`.
pub struct Sync;

impl FrontendMessage for Sync {
    const TAG: Option<u8> = Some(b'S');

    fn encode_body(&self, _buf: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// `Terminate` — graceful close; the client closes the socket immediately
/// after sending this.
pub struct Terminate;

impl FrontendMessage for Terminate {
    const TAG: Option<u8> = Some(b'X');

    fn encode_body(&self, _buf: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

pub struct CopyData<'a>(pub &'a [u8]);

impl FrontendMessage for CopyData<'_> {
    const TAG: Option<u8> = Some(b'd');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self.0);
        Ok(())
    }
}

pub struct CopyDone;

impl FrontendMessage for CopyDone {
    const TAG: Option<u8> = Some(b'c');

    fn encode_body(&self, _buf: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

pub struct CopyFail<'a>(pub &'a str);

impl FrontendMessage for CopyFail<'_> {
    const TAG: Option<u8> = Some(b'f');

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_cstr(self.0);
        Ok(())
    }
}
