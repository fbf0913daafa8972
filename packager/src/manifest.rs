//! Component manifest schema and version placeholder substitution.
//!
//! Templates carry the placeholder version [`VERSION_PLACEHOLDER`]. Staging
//! rewrites that token textually so every other byte of the template is
//! preserved.

use crate::error::{PackagerError, Result};
use crate::version::ComponentVersion;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fs;

/// The version token every manifest template carries.
pub const VERSION_PLACEHOLDER: &str = "0.0.0";

/// Manifest format version written into generated templates.
const MANIFEST_VERSION: u32 = 2;

/// A component manifest.
///
/// Fields not modelled here are kept in `extra` so a parsed template can be
/// written back without losing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentManifest {
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Base64 DER public key.
    pub key: String,
    /// Chromium manifest format version.
    #[serde(default = "default_manifest_version")]
    pub manifest_version: u32,
    /// Component name.
    #[serde(default)]
    pub name: String,
    /// Component version; [`VERSION_PLACEHOLDER`] in templates.
    #[serde(default = "placeholder_version")]
    pub version: String,
    /// Any other top-level fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_manifest_version() -> u32 {
    MANIFEST_VERSION
}

fn placeholder_version() -> String {
    VERSION_PLACEHOLDER.to_owned()
}

impl ComponentManifest {
    /// Build a template manifest with the placeholder version.
    #[must_use]
    pub fn template(description: &str, name: &str, key: &str) -> Self {
        Self {
            description: description.to_owned(),
            key: key.to_owned(),
            manifest_version: MANIFEST_VERSION,
            name: name.to_owned(),
            version: placeholder_version(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Read and parse a manifest template.
///
/// # Errors
///
/// Returns [`PackagerError::InvalidManifest`] if the file cannot be read or
/// is not a manifest.
pub fn read_manifest(path: &Utf8Path) -> Result<ComponentManifest> {
    let contents = fs::read_to_string(path).map_err(|e| PackagerError::InvalidManifest {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| PackagerError::InvalidManifest {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Write a manifest as compact JSON, creating parent directories.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_manifest(path: &Utf8Path, manifest: &ComponentManifest) -> Result<()> {
    let json = serde_json::to_string(manifest).map_err(|e| PackagerError::InvalidManifest {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    Ok(())
}

/// Replace the single version placeholder in `template` with `version`.
///
/// `path` is only used for error reporting.
///
/// # Errors
///
/// Returns [`PackagerError::PlaceholderMismatch`] unless the placeholder
/// occurs exactly once.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use crx_packager::manifest::substitute_version;
/// use crx_packager::version::ComponentVersion;
///
/// let version: ComponentVersion = "1.2.4".parse()?;
/// let out = substitute_version(r#"{"version":"0.0.0"}"#, &version, Utf8Path::new("m.json"))?;
/// assert_eq!(out, r#"{"version":"1.2.4"}"#);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn substitute_version(
    template: &str,
    version: &ComponentVersion,
    path: &Utf8Path,
) -> Result<String> {
    let occurrences = template.matches(VERSION_PLACEHOLDER).count();
    if occurrences != 1 {
        return Err(PackagerError::PlaceholderMismatch {
            path: path.to_owned(),
            placeholder: VERSION_PLACEHOLDER,
            occurrences,
        });
    }
    Ok(template.replacen(VERSION_PLACEHOLDER, &version.to_string(), 1))
}
