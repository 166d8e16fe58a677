//! `cancel()` — opens a fresh transport and sends `CancelRequest` (spec.md
//! §4.2, §5 "Cancellation").

use pgwire_core::net::{connect_tcp, connect_uds};
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::message::{BackendKeyData, CancelRequest};
use crate::options::{PgAddress, PgConnectOptions};
use crate::Result;

/// A lightweight copy of what's needed to issue a cancel independent of the
/// connection's lifetime -- a `Connection` stashes one of these at startup
/// (spec.md §4.2 step 4) so `cancel()` can run even while the main transport
/// is mid-read.
#[derive(Debug, Clone, Copy)]
pub struct CancelToken {
    pub process_id: u32,
    pub secret_key: u32,
}

impl CancelToken {
    pub fn from_backend_key_data(data: BackendKeyData) -> Self {
        CancelToken {
            process_id: data.process_id,
            secret_key: data.secret_key,
        }
    }

    /// Opens a brand new transport to `address` and sends `CancelRequest`,
    /// then closes it -- the effect on the main transport is asynchronous
    /// (spec.md §4.2 `cancel()`).
    pub async fn send(&self, options: &PgConnectOptions) -> Result<()> {
        let mut last_err = None;
        for address in &options.addresses {
            match self.send_to(address).await {
                Ok(()) => return Ok(()),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::configuration("no addresses to cancel on")))
    }

    async fn send_to(&self, address: &PgAddress) -> Result<()> {
        let request = CancelRequest {
            process_id: self.process_id,
            secret_key: self.secret_key,
        }
        .to_bytes();

        match address {
            PgAddress::Tcp { host, port } => {
                let mut socket = connect_tcp(host, *port).await.map_err(Error::Core)?;
                socket.write_all(&request).await.map_err(|e| Error::Core(e.into()))?;
                socket.shutdown().await.map_err(|e| Error::Core(e.into()))?;
            }
            PgAddress::Socket { path, .. } => {
                let mut socket = connect_uds(path).await.map_err(Error::Core)?;
                socket.write_all(&request).await.map_err(|e| Error::Core(e.into()))?;
                socket.shutdown().await.map_err(|e| Error::Core(e.into()))?;
            }
        }
        Ok(())
    }
}
