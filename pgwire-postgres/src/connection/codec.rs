//! [`PostgresCodec`] — wires the tagged-message framing of spec.md §4.1
//! into `pgwire_core::io::Codec`.

use bytes::{Buf, BytesMut};

use pgwire_core::io::Codec;

use crate::error::Error;
use crate::message::{BackendMessageFormat, ReceivedMessage};
use crate::Result;

/// `Request` is already-encoded bytes (built by [`crate::message::encode_frontend`]
/// or the constant-shaped `SSLRequest`/`CancelRequest`/raw startup payloads),
/// the same split the teacher's `Framed<S, C>` uses: callers build a
/// `Vec<u8>` via `EncodeMessage`/`encode_frontend` and hand it to the codec
/// to place on the wire.
#[derive(Default)]
pub struct PostgresCodec;

impl PostgresCodec {
    pub fn new() -> Self {
        PostgresCodec
    }
}

impl Codec for PostgresCodec {
    type Request = Vec<u8>;
    type Response = ReceivedMessage;

    fn encode(&mut self, buf: &mut Vec<u8>, request: Self::Request) -> Result<()> {
        buf.extend_from_slice(&request);
        Ok(())
    }

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Response>> {
        // tag (1) + length (4, includes itself but not the tag)
        if buf.len() < 5 {
            return Ok(None);
        }

        let tag = buf[0];
        let length = (&buf[1..5]).get_u32() as usize;
        if length < 4 {
            return Err(Error::protocol("backend message length smaller than its own field"));
        }

        let total = 1 + length;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }

        let format = BackendMessageFormat::from_tag(tag)?;
        let message_bytes = buf.split_to(total).freeze();
        let contents = message_bytes.slice(5..);

        Ok(Some(ReceivedMessage { format, contents }))
    }
}
