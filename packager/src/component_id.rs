//! Component ids derived from public keys.
//!
//! Chromium identifies an extension by the first 128 bits of the SHA-256 of
//! its DER-encoded public key, written as 32 characters where each hex
//! nibble `n` becomes the letter `'a' + n`. The registry is keyed by this id.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Number of characters in a component id.
const ID_LEN: usize = 32;

/// Errors raised when constructing a [`ComponentId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentIdError {
    /// The public key is not valid base64.
    #[error("public key is not valid base64: {0}")]
    InvalidKeyEncoding(String),

    /// An id string does not have the expected shape.
    #[error("invalid component id \"{value}\": expected 32 characters in a-p")]
    InvalidId {
        /// The rejected id.
        value: String,
    },
}

/// A Chromium component id such as `cchgndhfgmkkfmhjhmdenpgdbcdjfmgh`.
///
/// # Examples
///
/// ```
/// use crx_packager::component_id::ComponentId;
///
/// let id = ComponentId::try_from("oldkbaailkiinmopalbhaidpjdndifpa")?;
/// assert_eq!(id.as_str().len(), 32);
/// # Ok::<(), crx_packager::component_id::ComponentIdError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentId(String);

impl ComponentId {
    /// Derive the id from a base64-encoded DER public key.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentIdError::InvalidKeyEncoding`] if the key does not
    /// decode.
    pub fn from_public_key(base64_key: &str) -> Result<Self, ComponentIdError> {
        let der = BASE64
            .decode(base64_key.trim())
            .map_err(|e| ComponentIdError::InvalidKeyEncoding(e.to_string()))?;
        Ok(Self::from_der(&der))
    }

    /// Derive the id from raw DER public key bytes.
    #[must_use]
    pub fn from_der(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        let id = hex::encode(digest)
            .chars()
            .take(ID_LEN)
            .map(nibble_to_letter)
            .collect();
        Self(id)
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Map a lowercase hex digit onto `a`..=`p`.
fn nibble_to_letter(hex_digit: char) -> char {
    let value = hex_digit.to_digit(16).unwrap_or(0);
    char::from_u32(u32::from('a') + value).unwrap_or('a')
}

impl TryFrom<&str> for ComponentId {
    type Error = ComponentIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let well_formed =
            value.len() == ID_LEN && value.bytes().all(|b| (b'a'..=b'p').contains(&b));
        if !well_formed {
            return Err(ComponentIdError::InvalidId {
                value: value.to_owned(),
            });
        }
        Ok(Self(value.to_owned()))
    }
}

impl AsRef<str> for ComponentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
