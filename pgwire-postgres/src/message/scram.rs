//! SCRAM-SHA-256 client-side exchange (RFC 5802 / RFC 7677) and the legacy
//! MD5 challenge-response used by `AuthenticationMD5Password`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::Result;

type HmacSha256 = Hmac<Sha256>;

/// `md5(md5(password + username) + salt)`, hex-encoded and prefixed `md5`,
/// exactly as `AuthenticationMD5Password` expects it back.
pub fn md5_password(username: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = md5_hex(&[password.as_bytes(), username.as_bytes()]);
    let outer = md5_hex(&[inner.as_bytes(), salt]);
    format!("md5{outer}")
}

fn md5_hex(parts: &[&[u8]]) -> String {
    use md5::{Digest as _, Md5};
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Client-side state machine for one SCRAM-SHA-256 exchange.
pub struct ScramSha256 {
    client_nonce: String,
    client_first_bare: String,
    password: String,
    channel_binding: ChannelBinding,
}

/// Whether this exchange uses channel binding (`SCRAM-SHA-256-PLUS`) and, if
/// so, the TLS `tls-server-end-point` binding data.
pub enum ChannelBinding {
    Unsupported,
    Supported { cbind_data: Vec<u8> },
}

pub struct ServerFirst {
    server_nonce: String,
    salt: Vec<u8>,
    iterations: u32,
}

impl ScramSha256 {
    pub fn new(password: &str, channel_binding: ChannelBinding) -> Self {
        let client_nonce = generate_nonce();
        let client_first_bare = format!("n={},r={}", "", client_nonce);
        ScramSha256 {
            client_nonce,
            client_first_bare,
            password: password.to_owned(),
            channel_binding,
        }
    }

    fn gs2_header(&self) -> String {
        match &self.channel_binding {
            ChannelBinding::Unsupported => "n,,".to_owned(),
            ChannelBinding::Supported { .. } => "p=tls-server-end-point,,".to_owned(),
        }
    }

    /// The SASL mechanism name to send in `AuthenticationSASL`'s initial
    /// response.
    pub fn mechanism(&self) -> &'static str {
        match self.channel_binding {
            ChannelBinding::Unsupported => "SCRAM-SHA-256",
            ChannelBinding::Supported { .. } => "SCRAM-SHA-256-PLUS",
        }
    }

    /// `client-first-message`, sent as the SASL initial response.
    pub fn client_first(&self) -> Vec<u8> {
        format!("{}{}", self.gs2_header(), self.client_first_bare).into_bytes()
    }

    /// Parses `server-first-message` out of an `AuthenticationSASLContinue`.
    pub fn handle_server_first(&self, data: &[u8]) -> Result<ServerFirst> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::protocol("SCRAM server-first-message is not valid UTF-8"))?;

        let mut server_nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in text.split(',') {
            if let Some(nonce) = part.strip_prefix("r=") {
                server_nonce = Some(nonce.to_owned());
            } else if let Some(s) = part.strip_prefix("s=") {
                salt = Some(
                    BASE64
                        .decode(s)
                        .map_err(|_| Error::protocol("SCRAM server-first-message has invalid salt"))?,
                );
            } else if let Some(i) = part.strip_prefix("i=") {
                iterations = Some(
                    i.parse()
                        .map_err(|_| Error::protocol("SCRAM server-first-message has invalid iteration count"))?,
                );
            }
        }

        let server_nonce =
            server_nonce.ok_or_else(|| Error::protocol("SCRAM server-first-message missing nonce"))?;
        if !server_nonce.starts_with(&self.client_nonce) {
            return Err(Error::protocol("SCRAM server nonce does not extend client nonce"));
        }

        Ok(ServerFirst {
            server_nonce,
            salt: salt.ok_or_else(|| Error::protocol("SCRAM server-first-message missing salt"))?,
            iterations: iterations
                .ok_or_else(|| Error::protocol("SCRAM server-first-message missing iteration count"))?,
        })
    }

    /// Builds `client-final-message` and the expected `ServerSignature`,
    /// which the caller must compare against `AuthenticationSASLFinal`.
    pub fn client_final(&self, server_first: &ServerFirst) -> Result<(Vec<u8>, Vec<u8>)> {
        let salted_password =
            hi(self.password.as_bytes(), &server_first.salt, server_first.iterations);

        let client_key = hmac(&salted_password, b"Client Key");
        let stored_key = sha256(&client_key);
        let server_key = hmac(&salted_password, b"Server Key");

        let cbind_input = match &self.channel_binding {
            ChannelBinding::Unsupported => self.gs2_header().into_bytes(),
            ChannelBinding::Supported { cbind_data } => {
                let mut v = self.gs2_header().into_bytes();
                v.extend_from_slice(cbind_data);
                v
            }
        };
        let channel_binding = format!("c={}", BASE64.encode(cbind_input));
        let client_final_no_proof = format!("{},r={}", channel_binding, server_first.server_nonce);

        let auth_message = format!(
            "{},r={},s={},i={},{}",
            self.client_first_bare,
            server_first.server_nonce,
            BASE64.encode(&server_first.salt),
            server_first.iterations,
            client_final_no_proof,
        );

        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let server_signature = hmac(&server_key, auth_message.as_bytes());

        let client_final = format!("{},p={}", client_final_no_proof, BASE64.encode(&client_proof));
        Ok((client_final.into_bytes(), server_signature))
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

fn hi(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(password).expect("HMAC accepts keys of any length");
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u = mac.finalize().into_bytes();

    let mut result = u;
    for _ in 1..iterations {
        let mut mac = HmacSha256::new_from_slice(password).expect("HMAC accepts keys of any length");
        mac.update(&u);
        u = mac.finalize().into_bytes();
        for (r, u_byte) in result.iter_mut().zip(u.iter()) {
            *r ^= u_byte;
        }
    }
    result.to_vec()
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}
