//! TCP / Unix-domain-socket connection helpers.
//!
//! These return a boxed `Socket` so that a driver can transparently swap a
//! plaintext transport for a TLS-wrapped one mid-handshake (see the
//! `SSLRequest` dance in the PostgreSQL protocol) without changing the type
//! callers hold.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::Result;

/// Anything that looks like a duplex byte stream. Implemented for
/// `TcpStream`, `UnixStream`, and TLS-wrapped variants of both.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

pub async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

pub async fn connect_uds(path: &Path) -> Result<UnixStream> {
    Ok(UnixStream::connect(path).await?)
}
