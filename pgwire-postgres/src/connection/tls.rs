//! `SSLRequest` negotiation and the TLS upgrade itself (spec.md §4.2 step 1,
//! §4.7 TLS mode table).

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use pgwire_core::net::Socket;

use crate::error::Error;
use crate::message::SslRequest;
use crate::options::{PgConnectOptions, SslMode};
use crate::Result;

/// Negotiates TLS on an already-connected transport, per the table in
/// spec.md §4.7:
///
/// | mode | SSLRequest sent? | on 'N' |
/// |------|------------------|--------|
/// | disable | no | - |
/// | allow | on retry only (the caller tries plaintext first) | fall back to plain |
/// | prefer | yes | fall back to plain |
/// | require/verify-ca/verify-full | yes | fail |
///
/// `attempt_ssl` lets the caller drive `allow`'s two-attempt sequence: the
/// first `establish_one` call passes `false`, and only a retry after a
/// retryable failure passes `true`. Every other mode derives it from
/// `options.ssl_mode` directly.
///
/// Returns the (possibly upgraded) transport, boxed so the connection
/// machinery above doesn't care whether TLS happened.
pub async fn maybe_upgrade(
    socket: Box<dyn Socket>,
    options: &PgConnectOptions,
    attempt_ssl: bool,
) -> Result<Box<dyn Socket>> {
    if options.direct_tls {
        return Ok(Box::new(upgrade(socket, options).await?));
    }

    if !attempt_ssl {
        return Ok(socket);
    }

    let mut socket = socket;
    let request = SslRequest::to_bytes();
    socket
        .write_all(&request)
        .await
        .map_err(|e| Error::Core(pgwire_core::Error::from(e)))?;

    let mut response = [0u8; 1];
    socket
        .read_exact(&mut response)
        .await
        .map_err(|e| Error::Core(pgwire_core::Error::from(e)))?;

    match response[0] {
        b'S' => Ok(Box::new(upgrade(socket, options).await?)),
        b'N' => {
            if options.ssl_mode.allows_plaintext_fallback() {
                Ok(socket)
            } else {
                Err(Error::Core(pgwire_core::Error::Tls(
                    "server does not support TLS and sslmode requires it".to_owned(),
                )))
            }
        }
        other => Err(Error::protocol(format!(
            "unexpected byte {other:#04x} in response to SSLRequest"
        ))),
    }
}

#[cfg(feature = "tls-rustls")]
async fn upgrade<S>(socket: S, options: &PgConnectOptions) -> Result<tokio_rustls::client::TlsStream<S>>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let config = build_rustls_config(options)?;
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));

    let server_name = server_name(options)?;

    connector
        .connect(server_name, socket)
        .await
        .map_err(|e| Error::Core(pgwire_core::Error::Tls(e.to_string())))
}

#[cfg(feature = "tls-rustls")]
fn server_name(options: &PgConnectOptions) -> Result<rustls::pki_types::ServerName<'static>> {
    let host = options
        .addresses
        .iter()
        .find_map(|addr| match addr {
            crate::options::PgAddress::Tcp { host, .. } => Some(host.clone()),
            crate::options::PgAddress::Socket { .. } => None,
        })
        .unwrap_or_else(|| "localhost".to_owned());

    rustls::pki_types::ServerName::try_from(host)
        .map_err(|_| Error::Core(pgwire_core::Error::Tls("invalid server name for TLS SNI".to_owned())))
}

#[cfg(feature = "tls-rustls")]
fn build_rustls_config(options: &PgConnectOptions) -> Result<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();

    if let Some(path) = &options.ssl_root_cert {
        let pem = std::fs::read(path).map_err(|e| Error::Core(pgwire_core::Error::from(e)))?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::Core(pgwire_core::Error::Tls("invalid root certificate PEM".to_owned())))?;
        for cert in certs {
            roots
                .add(cert)
                .map_err(|e| Error::Core(pgwire_core::Error::Tls(e.to_string())))?;
        }
    } else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = roots.add(cert);
        }
    }

    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    if !options.ssl_mode.verify_peer() {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerify));
    }

    Ok(config)
}

/// Used for `require` (and `allow`/`prefer` when TLS is selected), which
/// negotiate encryption without verifying the peer's certificate (spec.md
/// §4.7 table: "no (unless a CA is configured)").
#[cfg(feature = "tls-rustls")]
#[derive(Debug)]
struct NoVerify;

#[cfg(feature = "tls-rustls")]
impl rustls::client::danger::ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(not(feature = "tls-rustls"))]
async fn upgrade<S>(_socket: S, _options: &PgConnectOptions) -> Result<S> {
    Err(Error::Core(pgwire_core::Error::Tls(
        "TLS was requested but this build has no TLS backend enabled".to_owned(),
    )))
}
