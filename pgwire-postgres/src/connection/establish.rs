//! Drives a cold socket through SSL negotiation, startup, and
//! authentication up to the first `ReadyForQuery` (spec.md §4.2 steps 1-4).

use pgwire_core::net::{connect_tcp, connect_uds};

use crate::error::{Error, ErrorKind};
use crate::message::scram::{ChannelBinding, ScramSha256};
use crate::message::{encode_frontend, Authentication, BackendMessageFormat, Password, Startup, Terminate};
use crate::options::{PgAddress, PgConnectOptions, SslMode, TargetSessionAttrs};
use crate::Result;

use super::executor;
use super::stream::PgStream;
use super::tls;

/// Tries every configured address in order, keeping the first connection
/// whose session matches `target_session_attrs` (spec.md §4.7) and closing
/// every other candidate it opened along the way. `prefer-standby` is the
/// one mode that keeps a non-matching connection around as a fallback,
/// returned only if no standby is ever found (spec.md §9 Design Note).
pub(crate) async fn establish(options: &PgConnectOptions) -> Result<PgStream> {
    let mut last_err = None;
    let mut fallback: Option<PgStream> = None;

    for address in &options.addresses {
        let mut stream = match establish_one(options, address).await {
            Ok(stream) => stream,
            Err(err) => {
                last_err = Some(err);
                continue;
            }
        };

        match session_attrs_match(&mut stream, options.target_session_attrs).await {
            Ok(true) => {
                if let Some(surplus) = fallback.take() {
                    close_surplus(surplus).await;
                }
                return Ok(stream);
            }
            Ok(false) if options.target_session_attrs == TargetSessionAttrs::PreferStandby => {
                if let Some(surplus) = fallback.replace(stream) {
                    close_surplus(surplus).await;
                }
            }
            Ok(false) => close_surplus(stream).await,
            Err(err) => {
                last_err = Some(err);
                close_surplus(stream).await;
            }
        }
    }

    if let Some(stream) = fallback {
        return Ok(stream);
    }

    Err(last_err.unwrap_or_else(|| Error::configuration("no addresses to connect to")))
}

async fn close_surplus(mut stream: PgStream) {
    let _ = stream.send(&Terminate).await;
    let _ = stream.shutdown().await;
}

/// Evaluates whether `stream`'s server matches `attrs`, issuing the
/// `in_hot_standby`/`pg_is_in_recovery()`/`default_transaction_read_only`
/// round trips spec.md §4.7 describes only when `attrs` isn't `any`.
async fn session_attrs_match(stream: &mut PgStream, attrs: TargetSessionAttrs) -> Result<bool> {
    if attrs == TargetSessionAttrs::Any {
        return Ok(true);
    }

    let standby = is_in_recovery(stream).await?;
    Ok(match attrs {
        TargetSessionAttrs::Any => unreachable!(),
        TargetSessionAttrs::Primary => !standby,
        TargetSessionAttrs::Standby | TargetSessionAttrs::PreferStandby => standby,
        TargetSessionAttrs::ReadWrite => !standby && !is_read_only(stream).await?,
        TargetSessionAttrs::ReadOnly => standby || is_read_only(stream).await?,
    })
}

/// Prefers the `in_hot_standby` parameter PostgreSQL 14+ reports at startup;
/// older servers need the explicit query (spec.md §9 Design Note).
async fn is_in_recovery(stream: &mut PgStream) -> Result<bool> {
    if let Some(value) = stream.parameter("in_hot_standby") {
        return Ok(value == "on");
    }
    let (rows, _) = executor::simple_query(stream, "SELECT pg_is_in_recovery()").await?;
    let row = rows
        .first()
        .ok_or_else(|| Error::protocol("pg_is_in_recovery() returned no rows"))?;
    Ok(row.try_get::<String, usize>(0)? == "t")
}

async fn is_read_only(stream: &mut PgStream) -> Result<bool> {
    let (rows, _) = executor::simple_query(stream, "SHOW default_transaction_read_only").await?;
    let row = rows
        .first()
        .ok_or_else(|| Error::protocol("SHOW default_transaction_read_only returned no rows"))?;
    Ok(row.try_get::<String, usize>(0)? == "on")
}

async fn establish_one(options: &PgConnectOptions, address: &PgAddress) -> Result<PgStream> {
    if options.ssl_mode == SslMode::Allow {
        return match establish_attempt(options, address, false).await {
            Ok(stream) => Ok(stream),
            Err(err) if is_retryable_for_ssl_fallback(&err) => {
                establish_attempt(options, address, true).await
            }
            Err(err) => Err(err),
        };
    }

    establish_attempt(options, address, options.ssl_mode.sends_ssl_request()).await
}

/// The `allow`/`prefer` distinction from spec.md §4.7: `prefer` always tries
/// TLS first and falls back to plaintext on `'N'`, which `tls::maybe_upgrade`
/// already implements in one pass. `allow` instead tries plaintext first and
/// only retries with TLS forced if that attempt fails with an
/// authentication-spec or connection-exception class error -- never on a
/// later attempt's success, and never for any other failure (spec.md §4.7).
fn is_retryable_for_ssl_fallback(err: &Error) -> bool {
    match err {
        Error::Authentication(db) => {
            matches!(db.kind(), ErrorKind::InvalidAuthorizationSpecification | ErrorKind::ConnectionException)
        }
        Error::Database { source, .. } => {
            matches!(source.kind(), ErrorKind::InvalidAuthorizationSpecification | ErrorKind::ConnectionException)
        }
        Error::Core(pgwire_core::Error::Io(_)) => true,
        _ => false,
    }
}

async fn establish_attempt(options: &PgConnectOptions, address: &PgAddress, attempt_ssl: bool) -> Result<PgStream> {
    let socket = match address {
        PgAddress::Tcp { host, port } => {
            let stream = connect_tcp(host, *port)
                .await
                .map_err(|e| Error::Core(e))?;
            Box::new(stream) as Box<dyn pgwire_core::net::Socket>
        }
        PgAddress::Socket { path, .. } => {
            let stream = connect_uds(path).await.map_err(|e| Error::Core(e))?;
            Box::new(stream) as Box<dyn pgwire_core::net::Socket>
        }
    };

    let socket = tls::maybe_upgrade(socket, options, attempt_ssl).await?;
    let mut stream = PgStream::new_boxed(socket);

    send_startup(&mut stream, options).await?;
    authenticate(&mut stream, options).await?;
    drain_to_ready(&mut stream).await?;

    Ok(stream)
}

async fn send_startup(stream: &mut PgStream, options: &PgConnectOptions) -> Result<()> {
    let mut params: Vec<(&str, &str)> = options
        .server_settings
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    params.push(("client_encoding", "UTF8"));

    let startup = Startup {
        username: Some(&options.username),
        database: options.database.as_deref(),
        params: &params,
    };

    let mut buf = Vec::new();
    encode_startup(&startup, &mut buf)?;
    stream.send_raw(buf).await
}

/// `Startup` has no tag byte, so it can't go through [`encode_frontend`]
/// unmodified -- but it shares the same two-pass length patching.
fn encode_startup(startup: &Startup<'_>, buf: &mut Vec<u8>) -> Result<()> {
    encode_frontend(startup, buf)
}

async fn authenticate(stream: &mut PgStream, options: &PgConnectOptions) -> Result<()> {
    loop {
        let message = stream.recv().await?;
        if message.format != BackendMessageFormat::Authentication {
            return Err(Error::protocol("expected an Authentication message during startup"));
        }
        let auth: Authentication = message.decode()?;

        match auth {
            Authentication::Ok => return Ok(()),
            Authentication::CleartextPassword => {
                let password = resolve_password(options)?;
                stream.send(&Password::Cleartext(&password)).await?;
            }
            Authentication::Md5Password(salt) => {
                let password = resolve_password(options)?;
                stream
                    .send(&Password::Md5 {
                        username: &options.username,
                        password: &password,
                        salt: salt.salt,
                    })
                    .await?;
            }
            Authentication::Sasl(sasl) => {
                run_sasl(stream, options, &sasl.mechanisms).await?;
            }
            Authentication::SaslContinue(_) | Authentication::SaslFinal(_) => {
                return Err(Error::protocol("unexpected SASL message outside of an exchange"));
            }
            Authentication::Unknown(code) => {
                return Err(Error::Core(pgwire_core::Error::interface(format!(
                    "unsupported authentication method (code {code})"
                ))));
            }
        }
    }
}

fn resolve_password(options: &PgConnectOptions) -> Result<String> {
    options
        .password
        .resolve()?
        .ok_or_else(|| Error::configuration("server requires a password but none was supplied"))
}

async fn run_sasl(stream: &mut PgStream, options: &PgConnectOptions, mechanisms: &[String]) -> Result<()> {
    let use_plus = mechanisms.iter().any(|m| m == "SCRAM-SHA-256-PLUS");
    let mechanism_name = if use_plus { "SCRAM-SHA-256-PLUS" } else { "SCRAM-SHA-256" };
    if !mechanisms.iter().any(|m| m == mechanism_name) {
        return Err(Error::Core(pgwire_core::Error::interface(
            "server does not advertise a supported SASL mechanism (SCRAM-SHA-256)".to_owned(),
        )));
    }

    let password = resolve_password(options)?;
    // Channel binding data would come from the TLS session (RFC 5929
    // tls-server-end-point); not wired through the socket abstraction here,
    // so only the non-PLUS mechanism is actually attempted.
    let scram = ScramSha256::new(&password, ChannelBinding::Unsupported);

    stream
        .send(&Password::SaslInitialResponse {
            mechanism: scram.mechanism(),
            data: &scram.client_first(),
        })
        .await?;

    let message = stream.recv().await?;
    if message.format != BackendMessageFormat::Authentication {
        return Err(Error::protocol("expected AuthenticationSASLContinue"));
    }
    let Authentication::SaslContinue(data) = message.decode()? else {
        return Err(Error::protocol("expected AuthenticationSASLContinue"));
    };

    let server_first = scram.handle_server_first(&data)?;
    let (client_final, expected_signature) = scram.client_final(&server_first)?;

    stream.send(&Password::SaslResponse(&client_final)).await?;

    let message = stream.recv().await?;
    if message.format != BackendMessageFormat::Authentication {
        return Err(Error::protocol("expected AuthenticationSASLFinal"));
    }
    let Authentication::SaslFinal(data) = message.decode()? else {
        return Err(Error::protocol("expected AuthenticationSASLFinal"));
    };

    let text = std::str::from_utf8(&data)
        .map_err(|_| Error::protocol("AuthenticationSASLFinal is not valid UTF-8"))?;
    let server_signature = text
        .strip_prefix("v=")
        .ok_or_else(|| Error::protocol("AuthenticationSASLFinal missing server signature"))?;
    let server_signature = base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        server_signature,
    )
    .map_err(|_| Error::protocol("AuthenticationSASLFinal has invalid base64 signature"))?;

    if server_signature != expected_signature {
        return Err(Error::authentication(crate::message::ErrorFields {
            severity: "FATAL".to_owned(),
            code: "28000".to_owned(),
            message: "SCRAM server signature does not match; possible MITM".to_owned(),
            ..Default::default()
        }));
    }

    // Followed immediately by AuthenticationOk, consumed by the caller's loop.
    let message = stream.recv().await?;
    let auth: Authentication = message.decode()?;
    if !matches!(auth, Authentication::Ok) {
        return Err(Error::protocol("expected AuthenticationOk after SASL exchange"));
    }

    Ok(())
}

/// Accumulates `ParameterStatus`/`BackendKeyData`/`NoticeResponse` (handled
/// transparently by [`PgStream::recv`], which also updates
/// `transaction_status` from this very `ReadyForQuery`) until the first
/// `ReadyForQuery` (spec.md §4.2 step 4).
async fn drain_to_ready(stream: &mut PgStream) -> Result<()> {
    loop {
        let message = stream.recv().await?;
        if message.format == BackendMessageFormat::ReadyForQuery {
            return Ok(());
        }
    }
}
