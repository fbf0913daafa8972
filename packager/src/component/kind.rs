//! The closed set of packageable component types.

use crate::error::PackagerError;
use std::fmt;
use std::str::FromStr;

/// A component type with a known resolver rule.
///
/// Adding a type means adding a variant here and its rule in
/// [`super::rules`]; there is no configuration-driven fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Crypto wallet bundle shipped as a pre-built directory.
    EthereumRemoteClient,
    /// HTTPS Everywhere rule set (leveldb snapshot).
    HttpsEverywhereUpdater,
    /// Autoplay, extension, referrer, and Greaselion data files.
    LocalDataFilesUpdater,
    /// Speedreader classifier data.
    SpeedreaderUpdater,
    /// Per-locale client model parameters.
    ClientModelParameters,
}

impl ComponentType {
    /// Every known component type.
    pub const ALL: [Self; 5] = [
        Self::EthereumRemoteClient,
        Self::HttpsEverywhereUpdater,
        Self::LocalDataFilesUpdater,
        Self::SpeedreaderUpdater,
        Self::ClientModelParameters,
    ];

    /// Return the canonical command-line name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EthereumRemoteClient => "ethereum-remote-client",
            Self::HttpsEverywhereUpdater => "https-everywhere-updater",
            Self::LocalDataFilesUpdater => "local-data-files-updater",
            Self::SpeedreaderUpdater => "speedreader-updater",
            Self::ClientModelParameters => "client-model-parameters",
        }
    }

    /// Whether the type ships a pre-built directory rather than data files.
    #[must_use]
    pub const fn copies_whole_directory(self) -> bool {
        matches!(
            self,
            Self::EthereumRemoteClient | Self::ClientModelParameters
        )
    }

    fn expected_names() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for ComponentType {
    type Err = PackagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PackagerError::UnknownComponentType {
                name: s.to_owned(),
                expected: Self::expected_names(),
            })
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
