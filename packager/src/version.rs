//! Component version values.
//!
//! A component version is one or more dot-separated unsigned integers, the
//! form Chromium accepts in an extension manifest. Versions issued by the
//! registry only ever grow.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The string was empty.
    #[error("version is empty")]
    Empty,

    /// A dot-separated part is not an unsigned integer.
    #[error("version part \"{part}\" is not an unsigned integer")]
    InvalidPart {
        /// The offending part.
        part: String,
    },

    /// Incrementing the last part would overflow.
    #[error("version part {value} cannot be incremented")]
    Overflow {
        /// The part at its maximum value.
        value: u64,
    },
}

/// A dotted component version such as `1.2.3`.
///
/// Ordering compares parts numerically from left to right; when one version
/// is a prefix of the other the shorter one sorts first.
///
/// # Examples
///
/// ```
/// use crx_packager::version::ComponentVersion;
///
/// let current: ComponentVersion = "1.2.3".parse()?;
/// let next = current.next()?;
/// assert_eq!(next.to_string(), "1.2.4");
/// assert!(next > current);
/// # Ok::<(), crx_packager::version::VersionError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentVersion(Vec<u64>);

impl ComponentVersion {
    /// The version issued for a component the registry has never seen.
    #[must_use]
    pub fn seed() -> Self {
        Self(vec![1, 0, 0])
    }

    /// Return the version that follows this one.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::Overflow`] if the last part is `u64::MAX`.
    pub fn next(&self) -> Result<Self, VersionError> {
        let mut parts = self.0.clone();
        if let Some(last) = parts.last_mut() {
            *last = last
                .checked_add(1)
                .ok_or(VersionError::Overflow { value: *last })?;
        }
        Ok(Self(parts))
    }

    /// Return the numeric parts.
    #[must_use]
    pub fn parts(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for ComponentVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        trimmed
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(VersionError::InvalidPart {
                        part: part.to_owned(),
                    });
                }
                part.parse::<u64>().map_err(|_| VersionError::InvalidPart {
                    part: part.to_owned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Ord for ComponentVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for ComponentVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ComponentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.0.iter();
        if let Some(first) = parts.next() {
            write!(f, "{first}")?;
        }
        for part in parts {
            write!(f, ".{part}")?;
        }
        Ok(())
    }
}
