//! Component descriptor resolution.
//!
//! Given a [`ComponentType`], the [`Resolver`] works out which identities the
//! type publishes and, for each, its payload, manifest template, public key,
//! and derived id. The rule table is closed: unknown types are rejected when
//! the type name is parsed.
//!
//! # Sub-modules
//!
//! - [`kind`] - The `ComponentType` sum type.
//! - [`rules`] - Static per-type tables and filename normalization.
//! - [`resolver`] - Builds `ComponentDescriptor`s from the tables.

pub mod kind;
pub mod resolver;
pub mod rules;

pub use kind::ComponentType;
pub use resolver::Resolver;

use crate::component_id::ComponentId;
use camino::Utf8PathBuf;
use std::fmt;

/// A packageable unit: a component type plus an optional variant name.
///
/// The variant is the normalized data file name or the locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentIdentity {
    /// The component type.
    pub component_type: ComponentType,
    /// Variant distinguishing identities of the same type.
    pub variant: Option<String>,
}

impl ComponentIdentity {
    /// Create an identity.
    #[must_use]
    pub fn new(component_type: ComponentType, variant: Option<String>) -> Self {
        Self {
            component_type,
            variant,
        }
    }

    /// File stem shared by the archive and the private key: `<type>[-<variant>]`.
    #[must_use]
    pub fn artifact_stem(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}-{variant}", self.component_type),
            None => self.component_type.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.artifact_stem())
    }
}

/// The payload staged alongside the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A pre-built directory copied verbatim into the staging root.
    Directory(Utf8PathBuf),
    /// Individual data files copied into a version subdirectory.
    Files {
        /// Name of the subdirectory the files land in.
        data_file_version: String,
        /// Source paths of the data files.
        files: Vec<Utf8PathBuf>,
    },
}

/// Where the manifest template for an identity comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestSource {
    /// A template checked in alongside the data.
    Template(Utf8PathBuf),
    /// A template generated from static rules and written to `path` before
    /// staging.
    Generated {
        /// The template contents.
        manifest: crate::manifest::ComponentManifest,
        /// Where the template is written.
        path: Utf8PathBuf,
    },
}

impl ManifestSource {
    /// Path the stager reads the template from.
    #[must_use]
    pub fn template_path(&self) -> &camino::Utf8Path {
        match self {
            Self::Template(path) | Self::Generated { path, .. } => path,
        }
    }
}

/// Everything needed to stage and sign one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDescriptor {
    /// The identity being packaged.
    pub identity: ComponentIdentity,
    /// Registry key derived from the public key.
    pub id: ComponentId,
    /// Base64 DER public key.
    pub public_key: String,
    /// Manifest template location.
    pub manifest: ManifestSource,
    /// Payload to stage.
    pub payload: Payload,
}
