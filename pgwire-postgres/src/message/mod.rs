//! The PostgreSQL frontend/backend wire protocol, version 3.0.
//!
//! Every message is `(1-byte tag | 4-byte BE length-including-length |
//! payload)`, with two constant-shaped exceptions that have no tag byte:
//! the very first client message after an `SSLRequest` reply, and
//! `SSLRequest`/`CancelRequest` themselves (see [`ssl`] and [`cancel`]).

mod backend;
mod format;
mod frontend;
pub mod scram;

pub use backend::{
    Authentication, AuthenticationSasl, BackendKeyData, BindComplete, CloseComplete,
    CommandComplete, CopyBothResponse, CopyDataChunk, CopyDoneAck, CopyInResponse,
    CopyOutResponse, CopyResponseData, DataRow, EmptyQueryResponse, ErrorFields, ErrorResponse,
    Md5PasswordSalt, NoData, Notice, NoticeOrError, Notification, ParameterDescription,
    ParameterStatus, ParseComplete, PortalSuspended, ReadyForQuery, ReceivedMessage,
    RowDescription, RowField, TransactionStatus,
};
pub use format::BackendMessageFormat;
pub use frontend::{
    Bind, CancelRequest, Close, CloseKind, CopyData, CopyDone, CopyFail, Describe, DescribeKind,
    Execute, FormatCode, Parse, Password, Query, SslRequest, Startup, Sync as SyncMessage,
    Terminate,
};

use bytes::Bytes;

use crate::error::Error;
use crate::Result;

pub const PROTOCOL_VERSION_MAJOR: u16 = 3;
pub const PROTOCOL_VERSION_MINOR: u16 = 0;
/// `3 << 16 | 0`
pub const STARTUP_MAGIC: u32 = 196_608;
pub const SSL_REQUEST_MAGIC: u32 = 80_877_103;
pub const CANCEL_REQUEST_MAGIC: u32 = 80_877_102;

/// A message the client sends to the server.
pub trait FrontendMessage {
    /// `None` for the handful of untagged messages (`Startup`, `SSLRequest`,
    /// `CancelRequest`, and a `PasswordMessage` sent in response to one of
    /// those in very old protocol negotiations — here, always `Some`).
    const TAG: Option<u8>;

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()>;
}

/// Write `message`'s tag (if any), a placeholder length, the body, and then
/// patch the length in place — the same two-pass approach the teacher's
/// `EncodeMessage` wrapper uses.
pub fn encode_frontend<M: FrontendMessage>(message: &M, buf: &mut Vec<u8>) -> Result<()> {
    if let Some(tag) = M::TAG {
        buf.push(tag);
    }

    let len_idx = buf.len();
    buf.extend_from_slice(&[0u8; 4]);

    message.encode_body(buf)?;

    let len = u32::try_from(buf.len() - len_idx)
        .map_err(|_| Error::protocol("frontend message body exceeds i32::MAX bytes"))?;
    buf[len_idx..len_idx + 4].copy_from_slice(&len.to_be_bytes());

    Ok(())
}

/// A message the server sends to the client, already framed but not yet
/// interpreted.
pub trait BackendMessage: Sized {
    const FORMAT: BackendMessageFormat;

    fn decode_body(buf: Bytes) -> Result<Self>;
}

// --- Shared little-endian/big-endian + C-string helpers -------------------

pub(crate) mod buf_ext {
    use bytes::{Buf, BufMut, Bytes};

    use crate::error::Error;
    use crate::Result;

    pub trait BufMutExt: BufMut {
        fn put_cstr(&mut self, s: &str) {
            self.put_slice(s.as_bytes());
            self.put_u8(0);
        }
    }

    impl<T: BufMut> BufMutExt for T {}

    pub trait BufExt: Buf {
        /// Read a NUL-terminated string, advancing past the terminator.
        fn get_cstr(&mut self) -> Result<Bytes>
        where
            Self: Sized,
        {
            let chunk = self.chunk();
            let nul = memchr::memchr(0, chunk)
                .ok_or_else(|| Error::protocol("unterminated C-string in message"))?;
            let out = Bytes::copy_from_slice(&chunk[..nul]);
            self.advance(nul + 1);
            Ok(out)
        }
    }

    impl BufExt for Bytes {}
}
