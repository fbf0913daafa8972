//! Run configuration.
//!
//! Everything a run needs is gathered into a [`PackagerConfig`] built once
//! from the command line and passed to the pipeline explicitly.

use crate::cli::{CommonArgs, ComponentCli, ModelParametersCli};
use crate::component::ComponentIdentity;
use crate::error::{PackagerError, Result};
use crate::registry::sigv4::Credentials;
use crate::registry::{DynamoDbStore, RetryPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use std::env;

/// Where private signing keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// One key signs every identity.
    File(Utf8PathBuf),
    /// One key per identity, named `<type>[-<variant>].pem`.
    Directory(Utf8PathBuf),
}

impl KeyMaterial {
    /// Choose the key file if it exists, otherwise the keys directory.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::MissingKeyMaterial`] when neither exists.
    pub fn resolve(
        key_file: Option<&Utf8Path>,
        keys_directory: Option<&Utf8Path>,
    ) -> Result<Self> {
        if let Some(file) = key_file.filter(|file| file.is_file()) {
            return Ok(Self::File(file.to_owned()));
        }
        if let Some(dir) = keys_directory.filter(|dir| dir.is_dir()) {
            return Ok(Self::Directory(dir.to_owned()));
        }

        let tried: Vec<String> = key_file
            .map(|file| format!("key file {file}"))
            .into_iter()
            .chain(keys_directory.map(|dir| format!("keys directory {dir}")))
            .collect();
        Err(PackagerError::MissingKeyMaterial {
            reason: if tried.is_empty() {
                "no key file or keys directory given".to_owned()
            } else {
                format!("tried {}", tried.join(" and "))
            },
        })
    }

    /// Private key path for `identity`.
    #[must_use]
    pub fn private_key_for(&self, identity: &ComponentIdentity) -> Utf8PathBuf {
        match self {
            Self::File(file) => file.clone(),
            Self::Directory(dir) => dir.join(format!("{}.pem", identity.artifact_stem())),
        }
    }
}

/// Version registry connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Endpoint given on the command line; empty for the AWS default.
    pub endpoint: String,
    /// AWS region.
    pub region: String,
    /// Table name.
    pub table: String,
    /// Retry bounds.
    pub retry: RetryPolicy,
}

impl RegistryConfig {
    /// Whether a non-AWS endpoint was configured.
    #[must_use]
    pub fn is_custom_endpoint(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }

    /// URL requests are sent to.
    ///
    /// # Examples
    ///
    /// ```
    /// use crx_packager::config::RegistryConfig;
    /// use crx_packager::registry::RetryPolicy;
    ///
    /// let config = RegistryConfig {
    ///     endpoint: String::new(),
    ///     region: "us-east-2".to_owned(),
    ///     table: "Extensions".to_owned(),
    ///     retry: RetryPolicy::default(),
    /// };
    /// assert_eq!(config.endpoint_url(), "https://dynamodb.us-east-2.amazonaws.com");
    /// ```
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        if self.is_custom_endpoint() {
            self.endpoint.trim().to_owned()
        } else {
            format!("https://dynamodb.{}.amazonaws.com", self.region)
        }
    }

    /// Credentials from the environment, or local placeholders for a custom
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::MissingCredentials`] when the AWS endpoint is
    /// selected and no credentials are set.
    pub fn credentials(&self) -> Result<Credentials> {
        match Credentials::from_env() {
            Some(credentials) => Ok(credentials),
            None if self.is_custom_endpoint() => Ok(Credentials::local()),
            None => Err(PackagerError::MissingCredentials {
                endpoint: self.endpoint_url(),
            }),
        }
    }

    /// Build the HTTP store for this configuration.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::credentials`].
    pub fn store(&self) -> Result<DynamoDbStore> {
        Ok(DynamoDbStore::new(
            &self.endpoint_url(),
            &self.region,
            &self.table,
            self.credentials()?,
        ))
    }
}

/// Configuration for one packaging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagerConfig {
    /// Chromium-based executable used for signing.
    pub packager_binary: Utf8PathBuf,
    /// Signing keys.
    pub key_material: KeyMaterial,
    /// Registry settings.
    pub registry: RegistryConfig,
    /// Checkout holding component sources.
    pub source_root: Utf8PathBuf,
    /// Output directory.
    pub build_root: Utf8PathBuf,
    /// Package identities one at a time, stopping at the first failure.
    pub fail_fast: bool,
}

impl PackagerConfig {
    /// Build the configuration for `crx-package-component`.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::MissingKeyMaterial`] when neither the key file
    /// nor the keys directory exists.
    pub fn from_component_args(cli: &ComponentCli) -> Result<Self> {
        let key_material = KeyMaterial::resolve(
            Some(cli.key_file.as_path()),
            cli.keys_directory.as_deref(),
        )?;
        Ok(Self::from_common(&cli.common, key_material))
    }

    /// Build the configuration for `crx-package-model-parameters`.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::MissingKeyMaterial`] when the keys directory
    /// does not exist.
    pub fn from_model_parameters_args(cli: &ModelParametersCli) -> Result<Self> {
        let key_material = KeyMaterial::resolve(None, Some(cli.keys_directory.as_path()))?;
        Ok(Self::from_common(&cli.common, key_material))
    }

    fn from_common(common: &CommonArgs, key_material: KeyMaterial) -> Self {
        Self {
            packager_binary: common.binary.clone(),
            key_material,
            registry: RegistryConfig {
                endpoint: common.endpoint.clone(),
                region: common.region.clone(),
                table: common.table.clone(),
                retry: RetryPolicy::default(),
            },
            source_root: common.source_root.clone(),
            build_root: common.build_dir.clone(),
            fail_fast: common.fail_fast,
        }
    }
}

/// Locate the packager executable.
///
/// A value containing a path separator must name an existing file; a bare
/// program name is searched for on `PATH`.
///
/// # Errors
///
/// Returns [`PackagerError::MissingBinary`] if it cannot be found.
pub fn resolve_binary(binary: &Utf8Path) -> Result<Utf8PathBuf> {
    let missing = || PackagerError::MissingBinary {
        path: binary.to_owned(),
    };
    if binary.components().count() > 1 || binary.is_absolute() {
        return binary.is_file().then(|| binary.to_owned()).ok_or_else(missing);
    }

    let path = env::var_os("PATH").ok_or_else(missing)?;
    env::split_paths(&path)
        .filter_map(|dir| Utf8PathBuf::try_from(dir).ok())
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
        .ok_or_else(missing)
}
