//! `PgStream` — the framed transport plus the bits of session state every
//! message that passes through it updates (spec.md §4.2 post-auth,
//! notifications).

use std::collections::BTreeMap;

use futures_channel::mpsc::UnboundedSender;
use tokio::io::{AsyncRead, AsyncWrite};

use pgwire_core::io::Framed;
use pgwire_core::net::Socket;

use crate::error::Error;
use crate::message::{
    encode_frontend, BackendKeyData, BackendMessage, BackendMessageFormat, FrontendMessage,
    Notice, Notification, ParameterStatus, ReadyForQuery, ReceivedMessage, TransactionStatus,
};
use crate::Result;

use super::codec::PostgresCodec;
use super::listen::ListenerRegistry;

/// The live transport to a PostgreSQL backend, plus accumulated session
/// state. A `PgConnection` is never without one: construction only
/// completes once startup/auth has finished (see `establish`).
pub struct PgStream {
    inner: Framed<Box<dyn Socket>, PostgresCodec>,

    /// Set once a `PgListener`-style registration exists on this
    /// connection; notifications are pushed here instead of surfacing as
    /// an unexpected message in the middle of a query (spec.md §4.2
    /// "Notifications").
    pub(crate) notifications: Option<UnboundedSender<Notification>>,

    pub(crate) parameter_statuses: BTreeMap<String, String>,
    pub(crate) backend_key_data: Option<BackendKeyData>,
    pub(crate) server_version_num: Option<u32>,
    pub(crate) transaction_status: TransactionStatus,

    /// `LISTEN`/`NOTIFY` callbacks, dispatched as `NotificationResponse`s
    /// pass through [`Self::recv`] (spec.md §4.5 `add_listener`).
    pub(crate) listeners: ListenerRegistry,
}

impl PgStream {
    pub(crate) fn new<S>(socket: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let boxed: Box<dyn Socket> = Box::new(socket);
        PgStream::new_boxed(boxed)
    }

    pub(crate) fn new_boxed(socket: Box<dyn Socket>) -> Self {
        PgStream {
            inner: Framed::new(socket, PostgresCodec::new()),
            notifications: None,
            parameter_statuses: BTreeMap::new(),
            backend_key_data: None,
            server_version_num: None,
            transaction_status: TransactionStatus::Idle,
            listeners: ListenerRegistry::default(),
        }
    }

    pub(crate) fn replace_socket(&mut self, socket: Box<dyn Socket>) {
        self.inner = Framed::new(socket, PostgresCodec::new());
    }

    /// Queues one frontend message without flushing — callers batch several
    /// (e.g. `Parse` + `Describe` + `Sync`) before [`Self::flush`].
    pub(crate) fn enqueue<M: FrontendMessage>(&mut self, message: &M) -> Result<()> {
        let mut buf = Vec::new();
        encode_frontend(message, &mut buf)?;
        self.inner.enqueue(buf)
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await
    }

    pub(crate) async fn send<M: FrontendMessage>(&mut self, message: &M) -> Result<()> {
        self.enqueue(message)?;
        self.flush().await
    }

    /// Sends a raw, already-framed payload -- used for the untagged
    /// `Startup`/`SSLRequest`/`CancelRequest` messages which aren't
    /// `FrontendMessage`s produced by `encode_frontend`.
    pub(crate) async fn send_raw(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.inner.send(bytes).await
    }

    pub(crate) async fn recv_expect<B: BackendMessage>(&mut self) -> Result<B> {
        self.recv().await?.decode()
    }

    async fn recv_unchecked(&mut self) -> Result<ReceivedMessage> {
        self.inner
            .next()
            .await?
            .ok_or_else(|| Error::protocol("connection closed unexpectedly"))
    }

    /// Pulls the next message, transparently handling the three kinds that
    /// can arrive at any time between commands: `ErrorResponse` (raised to
    /// the caller), `ParameterStatus` (merged into session state), and
    /// `NotificationResponse`/`NoticeResponse` (dispatched/logged), per
    /// spec.md §4.2.
    pub(crate) async fn recv(&mut self) -> Result<ReceivedMessage> {
        loop {
            let message = self.recv_unchecked().await?;

            match message.format {
                BackendMessageFormat::ErrorResponse => {
                    let fields = message.decode::<crate::message::ErrorResponse>()?.0;
                    return Err(Error::from_error_response(fields, None));
                }

                BackendMessageFormat::NotificationResponse => {
                    let notification: Notification = message.decode()?;
                    self.listeners.dispatch(&notification);
                    if let Some(sender) = &self.notifications {
                        let _ = sender.unbounded_send(notification);
                    }
                    continue;
                }

                BackendMessageFormat::ParameterStatus => {
                    let ParameterStatus { name, value } = message.decode()?;
                    if name == "server_version" {
                        self.server_version_num = parse_server_version(&value);
                    }
                    self.parameter_statuses.insert(name, value);
                    continue;
                }

                BackendMessageFormat::NoticeResponse => {
                    let notice: Notice = message.decode()?;
                    log_notice(&notice);
                    continue;
                }

                BackendMessageFormat::BackendKeyData => {
                    self.backend_key_data = Some(message.decode()?);
                }

                BackendMessageFormat::ReadyForQuery => {
                    let ReadyForQuery { transaction_status } = message.decode()?;
                    self.transaction_status = transaction_status;
                }

                _ => {}
            }

            return Ok(message);
        }
    }

    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await
    }

    pub(crate) fn parameter(&self, name: &str) -> Option<&str> {
        self.parameter_statuses.get(name).map(String::as_str)
    }

    pub(crate) fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }
}

fn log_notice(notice: &Notice) {
    let level = match notice.severity() {
        "ERROR" | "FATAL" | "PANIC" => tracing::Level::ERROR,
        "WARNING" => tracing::Level::WARN,
        "NOTICE" | "INFO" => tracing::Level::INFO,
        "DEBUG" => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    match level {
        tracing::Level::ERROR => tracing::error!(target: "pgwire::postgres::notice", message = notice.message()),
        tracing::Level::WARN => tracing::warn!(target: "pgwire::postgres::notice", message = notice.message()),
        tracing::Level::INFO => tracing::info!(target: "pgwire::postgres::notice", message = notice.message()),
        tracing::Level::DEBUG => tracing::debug!(target: "pgwire::postgres::notice", message = notice.message()),
        tracing::Level::TRACE => tracing::trace!(target: "pgwire::postgres::notice", message = notice.message()),
    }
}

fn parse_server_version(value: &str) -> Option<u32> {
    // e.g. "16.2 (Debian 16.2-1.pgdg120+2)" -> 160002
    let mut parts = value.split(|c: char| !c.is_ascii_digit()).filter(|s| !s.is_empty());
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    Some(major * 10_000 + minor * 100)
}
