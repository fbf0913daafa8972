//! AWS Signature Version 4 request signing.
//!
//! Only what the registry store needs: header-based signing of requests with
//! an empty query string.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::env;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Signing failed before a signature could be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    /// The MAC rejected a derived key.
    #[error("HMAC key of {length} bytes was rejected")]
    InvalidKeyLength {
        /// Length of the rejected key.
        length: usize,
    },
}

/// Access key pair used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Read credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and
    /// `AWS_SESSION_TOKEN`.
    ///
    /// Returns `None` unless both the key id and secret are set and non-empty.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let non_empty = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());
        Some(Self {
            access_key_id: non_empty("AWS_ACCESS_KEY_ID")?,
            secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY")?,
            session_token: non_empty("AWS_SESSION_TOKEN"),
        })
    }

    /// Placeholder credentials accepted by local table emulators.
    #[must_use]
    pub fn local() -> Self {
        Self {
            access_key_id: "local".to_owned(),
            secret_access_key: "local".to_owned(),
            session_token: None,
        }
    }
}

/// The scope a signature is valid for.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    /// Credentials to sign with.
    pub credentials: &'a Credentials,
    /// AWS region, e.g. `us-east-2`.
    pub region: &'a str,
    /// Service name, e.g. `dynamodb`.
    pub service: &'a str,
    /// Request time.
    pub time: DateTime<Utc>,
}

/// Sign a request and return the full header list to send.
///
/// `headers` must include `host`. The returned list adds `x-amz-date`,
/// `x-amz-security-token` (for temporary credentials), and `authorization`.
/// Header names are lower-cased.
///
/// # Errors
///
/// Returns [`SigningError`] if a derived key is rejected by the MAC.
pub fn sign(
    params: &SigningParams<'_>,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    payload: &[u8],
) -> Result<Vec<(String, String)>, SigningError> {
    let amz_date = params.time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = params.time.format("%Y%m%d").to_string();

    let mut signed: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_owned()))
        .collect();
    signed.push(("x-amz-date".to_owned(), amz_date.clone()));
    if let Some(token) = &params.credentials.session_token {
        signed.push(("x-amz-security-token".to_owned(), token.clone()));
    }
    signed.sort();

    let canonical_headers: String = signed
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = signed
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = [
        method,
        path,
        "",
        &canonical_headers,
        &signed_headers,
        &hex::encode(Sha256::digest(payload)),
    ]
    .join("\n");

    let scope = format!(
        "{date}/{}/{}/aws4_request",
        params.region, params.service
    );
    let string_to_sign = [
        ALGORITHM,
        &amz_date,
        &scope,
        &hex::encode(Sha256::digest(canonical_request.as_bytes())),
    ]
    .join("\n");

    let key = signing_key(
        &params.credentials.secret_access_key,
        &date,
        params.region,
        params.service,
    )?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    signed.push((
        "authorization".to_owned(),
        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            params.credentials.access_key_id
        ),
    ));
    Ok(signed)
}

fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| SigningError::InvalidKeyLength { length: key.len() })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
