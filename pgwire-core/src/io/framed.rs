use tokio::io::{AsyncRead, AsyncWrite};

use crate::io::buffered::BufferedSocket;
use crate::io::codec::Codec;
use crate::Result;

/// Combines a [`Codec`] with a [`BufferedSocket`] to give a simple
/// send/receive API over a length-delimited protocol.
///
/// This mirrors the teacher's `Framed<S, C>` but exposes plain `async fn`s
/// instead of `Sink`/`Stream` polling, since every caller in this crate
/// awaits one message at a time on an otherwise-idle connection (see the
/// serialization invariant: at most one query operation in flight per
/// connection).
pub struct Framed<S, C> {
    socket: BufferedSocket<S>,
    codec: C,
}

impl<S, C> Framed<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Codec,
{
    pub fn new(socket: S, codec: C) -> Self {
        Framed {
            socket: BufferedSocket::new(socket),
            codec,
        }
    }

    pub fn write_buffer(&self) -> &[u8] {
        self.socket.write_buffer()
    }

    pub fn shrink_buffers(&mut self) {
        self.socket.shrink_buffers();
    }

    /// Queue `request` into the write buffer without flushing it to the
    /// socket yet. Callers batch several frontend messages (e.g.
    /// `Parse` + `Describe` + `Sync`) before calling [`Self::flush`].
    pub fn enqueue(&mut self, request: C::Request) -> Result<()> {
        let buf = self.socket.write_buffer_mut();
        self.codec.encode(buf, request)
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.socket.flush().await
    }

    pub async fn send(&mut self, request: C::Request) -> Result<()> {
        self.enqueue(request)?;
        self.flush().await
    }

    /// Read and decode the next message, pulling more bytes from the socket
    /// as needed. Returns `None` on a clean EOF with no partial message
    /// buffered.
    pub async fn next(&mut self) -> Result<Option<C::Response>> {
        loop {
            if let Some(response) = self.codec.decode(self.socket.read_buffer_mut())? {
                return Ok(Some(response));
            }

            if self.socket.fill_buf().await? == 0 {
                if self.socket.read_buffer_mut().is_empty() {
                    return Ok(None);
                }
                return Err(crate::Error::protocol(
                    "connection closed mid-message".to_string(),
                ));
            }
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.socket.shutdown().await
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.socket.get_mut()
    }
}
