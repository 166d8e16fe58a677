use bytes::BytesMut;

use crate::Result;

/// A length-delimited message codec for a particular wire protocol.
///
/// Implementors own only the encode/decode logic; buffering and the actual
/// socket I/O live in [`super::Framed`].
pub trait Codec {
    type Request;
    type Response;

    /// Append the wire bytes for `request` onto `buf`.
    fn encode(&mut self, buf: &mut Vec<u8>, request: Self::Request) -> Result<()>;

    /// Try to pull one complete message out of the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` doesn't yet contain a full message; the
    /// bytes already in `buf` are left untouched so the next read can append
    /// to them. Partial messages are never consumed.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Response>>;
}
