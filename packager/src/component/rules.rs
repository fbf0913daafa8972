//! Static resolver rules per component type.
//!
//! Paths are relative to the source root (the checkout that holds
//! `node_modules/` and `manifests/`) unless noted otherwise.

use super::kind::ComponentType;

/// Variant name shared by data files that map onto one default component.
pub const DEFAULT_VARIANT: &str = "default";

/// Raw data file stems that are published under [`DEFAULT_VARIANT`].
const DEFAULT_STEMS: &[&str] = &[
    "ABPFilterParserData",
    "httpse.leveldb",
    "ReferrerWhitelist",
    "ExtensionWhitelist",
    "Greaselion",
    "AutoplayWhitelist",
];

/// Map a raw data file stem onto the name it is staged and published under.
///
/// Unknown stems pass through unchanged.
///
/// # Examples
///
/// ```
/// use crx_packager::component::rules::normalized_data_file_name;
///
/// assert_eq!(normalized_data_file_name("Greaselion"), "default");
/// assert_eq!(normalized_data_file_name("speedreader-updater"), "speedreader-updater");
/// ```
#[must_use]
pub fn normalized_data_file_name(stem: &str) -> &str {
    if DEFAULT_STEMS.contains(&stem) {
        DEFAULT_VARIANT
    } else {
        stem
    }
}

/// Raw data files for a file-based component type.
#[must_use]
pub const fn data_files(component_type: ComponentType) -> &'static [&'static str] {
    match component_type {
        ComponentType::HttpsEverywhereUpdater => {
            &["node_modules/https-everywhere-builder/out/httpse.leveldb.zip"]
        }
        ComponentType::LocalDataFilesUpdater => &[
            "node_modules/autoplay-whitelist/data/AutoplayWhitelist.dat",
            "node_modules/extension-whitelist/data/ExtensionWhitelist.dat",
            "node_modules/brave-site-specific-scripts/Greaselion.json",
            "node_modules/referrer-whitelist/data/ReferrerWhitelist.json",
        ],
        ComponentType::SpeedreaderUpdater => &["node_modules/speedreader/data/speedreader-updater.dat"],
        ComponentType::EthereumRemoteClient | ComponentType::ClientModelParameters => &[],
    }
}

/// How the data file version subdirectory is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFileVersionRule {
    /// A fixed directory name.
    Fixed(&'static str),
    /// Read from the `data_file_version` field of a JSON file.
    FromJsonField(&'static str),
    /// The component ships a whole directory and needs none.
    NotApplicable,
}

/// Return the data file version rule for a component type.
#[must_use]
pub const fn data_file_version(component_type: ComponentType) -> DataFileVersionRule {
    match component_type {
        ComponentType::HttpsEverywhereUpdater => DataFileVersionRule::Fixed("6.0"),
        ComponentType::LocalDataFilesUpdater => DataFileVersionRule::Fixed("1"),
        ComponentType::SpeedreaderUpdater => DataFileVersionRule::FromJsonField(
            "node_modules/speedreader/data/speedreader-updater-manifest.json",
        ),
        ComponentType::EthereumRemoteClient | ComponentType::ClientModelParameters => {
            DataFileVersionRule::NotApplicable
        }
    }
}

/// Directory holding manifest templates for a component type.
#[must_use]
pub const fn manifests_dir(component_type: ComponentType) -> &'static str {
    match component_type {
        ComponentType::EthereumRemoteClient => "node_modules/ethereum-remote-client",
        ComponentType::HttpsEverywhereUpdater => "manifests/https-everywhere-updater",
        ComponentType::LocalDataFilesUpdater => "manifests/local-data-files-updater",
        ComponentType::SpeedreaderUpdater => "node_modules/speedreader/data",
        ComponentType::ClientModelParameters => "client-model-parameters/manifest-files",
    }
}

/// Signing key and id for one client model parameters locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleKey {
    /// Two-letter region code.
    pub locale: &'static str,
    /// Base64 DER public key.
    pub key: &'static str,
    /// Component id registered for the key.
    pub id: &'static str,
}

/// Locales for which client model parameters are published.
pub const MODEL_PARAMETER_LOCALES: &[LocaleKey] = &[
    LocaleKey {
        locale: "US",
        key: concat!(
            "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA22Pjefa2d1B1Ms3n3554kpGQK9hgnoGgkKnG",
            "OODNB9+pwnXIbUBQ0UPNzfxUnqU16++y3JAbmDpLKswlioRrCY8ZX0uhnotU1ZfqtNd48MEPg/DqJGU3",
            "7XDxa2lxSoUQq3ppGUm6j384Ma90WEAW05ZIwfe9fu1AUpO5RRoad79LG5C+Ol2HbIQQga5YJjpFuAM5",
            "KHqbXkrYZfoDOOEAoDiV4YkmZpmsrntB45LoX0eFaQAMkd7wSujzJ261jSRmc5fBpWni3DCWjeVMqYhv",
            "40tNAjtPqwwqXEG2p3QO3wlT5LLW6mIw/SXSgecW/fzcA7gKwMsoEIumN13j21WH8wIDAQAB",
        ),
        id: "cchgndhfgmkkfmhjhmdenpgdbcdjfmgh",
    },
    LocaleKey {
        locale: "GB",
        key: concat!(
            "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAoo+aDr4xxpKJQjgiuN/YDRJA9U5r/oTCgCRj",
            "xUBzu+LShtxyfue77RQY+xu0PVZpTznvbR4NLs3jBHiIGDHTzXOFMjO5Pn+8DNKtvNAGjBHoJUvIx6h+",
            "fK7++m8IW1RlEd8U1rrjzdfPSh2akzqCY3mM7yk4SXFeN5F+1uFdX9ZJTMWme1gvH4YDziJSjr42AKph",
            "TihlFQzddGqgfTdJaTbY7ka6rkdub5w46lle5xw2VNChVhhybnOKSZ+vXAw2yeYUzfik2PZaqAwlrxx6",
            "U3AHgv612rcZbHd1SnnTeBm2CWeaAwqa/JCiyXswWi+wHnEppiHSb4UPLHq9elTQRwIDAQAB",
        ),
        id: "oldkbaailkiinmopalbhaidpjdndifpa",
    },
];

/// Description written into generated model parameter manifests.
pub const MODEL_PARAMETERS_DESCRIPTION: &str = "Brave Client Model Parameters Component";

/// Name written into generated model parameter manifests.
pub const MODEL_PARAMETERS_NAME: &str = "Brave Client Model Parameters";
