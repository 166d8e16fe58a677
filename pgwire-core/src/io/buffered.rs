use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Result;

pub(super) const DEFAULT_BUF_SIZE: usize = 8 * 1024;

/// Wraps a raw socket with a growable read buffer and a write buffer,
/// amortizing both the syscall overhead and (when `S` is a trait object) the
/// dynamic dispatch overhead of small, frequent protocol messages.
pub struct BufferedSocket<S> {
    socket: S,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> BufferedSocket<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_SIZE),
            write_buf: Vec::with_capacity(DEFAULT_BUF_SIZE),
        }
    }

    pub fn write_buffer(&self) -> &[u8] {
        &self.write_buf
    }

    pub fn write_buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.write_buf
    }

    pub fn read_buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.read_buf
    }

    pub fn shrink_buffers(&mut self) {
        self.read_buf.reserve(DEFAULT_BUF_SIZE);
        self.read_buf.shrink_to(DEFAULT_BUF_SIZE);
        self.write_buf.shrink_to(DEFAULT_BUF_SIZE);
    }

    /// Read at least one more chunk of bytes from the socket into the read
    /// buffer. Returns the number of bytes read; `0` means the peer closed
    /// the connection.
    pub async fn fill_buf(&mut self) -> Result<usize> {
        let mut scratch = [0u8; DEFAULT_BUF_SIZE];
        let n = self.socket.read(&mut scratch).await?;
        if n > 0 {
            self.read_buf.extend_from_slice(&scratch[..n]);
        }
        Ok(n)
    }

    pub async fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            self.socket.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        self.socket.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.socket.shutdown().await?;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.socket
    }
}
