//! Error types for the CRX packager.
//!
//! Every variant belongs to one [`ErrorClass`]. Configuration errors are
//! raised before any network or filesystem work begins; the other classes
//! abort only the identity whose pipeline raised them.

use crate::component_id::ComponentId;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Broad category of a [`PackagerError`], used for reporting and exit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing binary, key material, credentials, or an unknown component type.
    Configuration,
    /// The version registry could not be reached or returned bad data.
    Registry,
    /// Source files or manifest templates were not usable.
    Staging,
    /// The external packager failed.
    Packaging,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Registry => "registry",
            Self::Staging => "staging",
            Self::Packaging => "packaging",
        };
        f.write_str(label)
    }
}

/// Errors that can occur while packaging components.
#[derive(Debug, Error)]
pub enum PackagerError {
    /// The requested component type has no resolver rule.
    #[error("unrecognized component type \"{name}\"; expected one of: {expected}")]
    UnknownComponentType {
        /// The rejected type name.
        name: String,
        /// Comma-separated list of accepted type names.
        expected: String,
    },

    /// The packager executable could not be found.
    #[error("packager binary not found: {path}")]
    MissingBinary {
        /// Path or program name that was given.
        path: Utf8PathBuf,
    },

    /// Neither the key file nor the keys directory exists.
    #[error("missing or invalid private key file/directory: {reason}")]
    MissingKeyMaterial {
        /// Which locations were tried.
        reason: String,
    },

    /// A private key file is absent or cannot be read.
    #[error("private key {path} is not readable: {reason}")]
    PrivateKeyUnreadable {
        /// Path to the key file.
        path: Utf8PathBuf,
        /// Description of the underlying failure.
        reason: String,
    },

    /// Registry credentials are required but not configured.
    #[error("no AWS credentials for {endpoint}; set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY")]
    MissingCredentials {
        /// Endpoint that requires signed requests.
        endpoint: String,
    },

    /// A manifest template is missing or malformed.
    #[error("invalid manifest {path}: {reason}")]
    InvalidManifest {
        /// Path to the manifest template.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A component public key is not valid base64.
    #[error("invalid public key for {component}: {reason}")]
    InvalidPublicKey {
        /// Component identity the key belongs to.
        component: String,
        /// Description of the decode failure.
        reason: String,
    },

    /// The registry stayed unreachable after the retry policy was exhausted.
    #[error("registry unavailable after {attempts} attempt(s): {reason}")]
    RegistryUnavailable {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        reason: String,
    },

    /// The registry refused a request for a non-transient reason.
    #[error("registry rejected {operation}: {reason}")]
    RegistryRejected {
        /// The store operation that was refused.
        operation: &'static str,
        /// Error details returned by the service.
        reason: String,
    },

    /// The stored version for a component cannot be parsed.
    #[error("registry holds corrupt version \"{value}\" for {id}: {reason}")]
    CorruptVersion {
        /// Component id whose entry is corrupt.
        id: ComponentId,
        /// The stored value.
        value: String,
        /// Why it could not be parsed.
        reason: String,
    },

    /// Concurrent writers kept winning the conditional write.
    #[error("version for {id} still contended after {attempts} conditional write(s)")]
    RegistryContention {
        /// Component id being reserved.
        id: ComponentId,
        /// Number of conditional writes attempted.
        attempts: u32,
    },

    /// A payload file or directory does not exist.
    #[error("source not found: {path}")]
    SourceMissing {
        /// The missing path.
        path: Utf8PathBuf,
    },

    /// The manifest template does not hold exactly one version placeholder.
    #[error(
        "manifest {path} must contain the version placeholder \"{placeholder}\" exactly once, found {occurrences}"
    )]
    PlaceholderMismatch {
        /// Path to the template.
        path: Utf8PathBuf,
        /// The placeholder token.
        placeholder: &'static str,
        /// How many times it occurred.
        occurrences: usize,
    },

    /// A filesystem operation failed while staging.
    #[error("staging failed: {reason}")]
    StagingFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The packager subprocess exited unsuccessfully.
    #[error("packager exited with {status}: {stderr}")]
    PackagerFailed {
        /// Exit status as reported by the OS.
        status: String,
        /// The subprocess's stderr, verbatim.
        stderr: String,
    },

    /// The packager exited successfully without producing the archive.
    #[error("packager reported success but did not produce {path}")]
    ArchiveMissing {
        /// Where the archive was expected.
        path: Utf8PathBuf,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackagerError {
    /// Return the class this error belongs to.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownComponentType { .. }
            | Self::MissingBinary { .. }
            | Self::MissingKeyMaterial { .. }
            | Self::PrivateKeyUnreadable { .. }
            | Self::MissingCredentials { .. }
            | Self::InvalidManifest { .. }
            | Self::InvalidPublicKey { .. } => ErrorClass::Configuration,
            Self::RegistryUnavailable { .. }
            | Self::RegistryRejected { .. }
            | Self::CorruptVersion { .. }
            | Self::RegistryContention { .. } => ErrorClass::Registry,
            Self::SourceMissing { .. }
            | Self::PlaceholderMismatch { .. }
            | Self::StagingFailed { .. }
            | Self::Io(_) => ErrorClass::Staging,
            Self::PackagerFailed { .. } | Self::ArchiveMissing { .. } => ErrorClass::Packaging,
        }
    }
}

/// Result type alias using [`PackagerError`].
pub type Result<T> = std::result::Result<T, PackagerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn unknown_component_type_lists_expected_names() {
        let err = PackagerError::UnknownComponentType {
            name: "ad-block".to_owned(),
            expected: "ethereum-remote-client, speedreader-updater".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ad-block"));
        assert!(msg.contains("speedreader-updater"));
    }

    #[test]
    fn packager_failed_keeps_stderr_verbatim() {
        let err = PackagerError::PackagerFailed {
            status: "exit status: 21".to_owned(),
            stderr: "Private key is invalid.\n".to_owned(),
        };
        assert!(err.to_string().contains("Private key is invalid.\n"));
    }

    #[test]
    fn placeholder_mismatch_reports_occurrences() {
        let err = PackagerError::PlaceholderMismatch {
            path: Utf8PathBuf::from("manifest.json"),
            placeholder: "0.0.0",
            occurrences: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("exactly once"));
        assert!(msg.contains("found 2"));
    }

    #[rstest]
    #[case::binary(
        PackagerError::MissingBinary { path: Utf8PathBuf::from("/opt/chrome") },
        ErrorClass::Configuration
    )]
    #[case::unavailable(
        PackagerError::RegistryUnavailable { attempts: 3, reason: "timeout".to_owned() },
        ErrorClass::Registry
    )]
    #[case::source(
        PackagerError::SourceMissing { path: Utf8PathBuf::from("Greaselion.json") },
        ErrorClass::Staging
    )]
    #[case::packager(
        PackagerError::PackagerFailed { status: "1".to_owned(), stderr: String::new() },
        ErrorClass::Packaging
    )]
    fn errors_report_their_class(#[case] err: PackagerError, #[case] expected: ErrorClass) {
        assert_eq!(err.class(), expected);
    }
}
