//! Builds component descriptors from the static rule tables.
//!
//! Resolution reads manifest templates (for their public keys) and, for
//! speedreader, the data file version; it never writes.

use super::rules::{self, DataFileVersionRule, MODEL_PARAMETER_LOCALES};
use super::{ComponentDescriptor, ComponentIdentity, ComponentType, ManifestSource, Payload};
use crate::component_id::ComponentId;
use crate::error::{PackagerError, Result};
use crate::manifest::{ComponentManifest, read_manifest, write_manifest};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs;

/// Name of the shared template used by directory-payload types.
const MANIFEST_FILE: &str = "manifest.json";

/// Resolves component types into descriptors.
#[derive(Debug, Clone)]
pub struct Resolver {
    source_root: Utf8PathBuf,
    build_root: Utf8PathBuf,
}

impl Resolver {
    /// Create a resolver rooted at the source checkout and build directory.
    #[must_use]
    pub fn new(source_root: Utf8PathBuf, build_root: Utf8PathBuf) -> Self {
        Self {
            source_root,
            build_root,
        }
    }

    /// Resolve every identity a component type publishes.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::InvalidManifest`] if a template cannot be
    /// read, or [`PackagerError::InvalidPublicKey`] if its key is malformed.
    pub fn resolve(&self, component_type: ComponentType) -> Result<Vec<ComponentDescriptor>> {
        match component_type {
            ComponentType::EthereumRemoteClient => {
                self.resolve_directory_component(component_type).map(|d| vec![d])
            }
            ComponentType::ClientModelParameters => self.resolve_model_parameters(),
            ComponentType::HttpsEverywhereUpdater
            | ComponentType::LocalDataFilesUpdater
            | ComponentType::SpeedreaderUpdater => self.resolve_data_file_components(component_type),
        }
    }

    fn resolve_directory_component(
        &self,
        component_type: ComponentType,
    ) -> Result<ComponentDescriptor> {
        let dir = self.source_root.join(rules::manifests_dir(component_type));
        let template = dir.join(MANIFEST_FILE);
        let identity = ComponentIdentity::new(component_type, None);
        let public_key = read_manifest(&template)?.key;
        let id = derive_id(&identity, &public_key)?;
        Ok(ComponentDescriptor {
            identity,
            id,
            public_key,
            manifest: ManifestSource::Template(template),
            payload: Payload::Directory(dir),
        })
    }

    fn resolve_data_file_components(
        &self,
        component_type: ComponentType,
    ) -> Result<Vec<ComponentDescriptor>> {
        let data_file_version = self.data_file_version(component_type)?;
        let manifests_dir = self.source_root.join(rules::manifests_dir(component_type));

        group_by_variant(rules::data_files(component_type))
            .into_iter()
            .map(|(variant, raw_files)| {
                let template = manifests_dir.join(format!("{variant}-manifest.json"));
                let identity = ComponentIdentity::new(component_type, Some(variant));
                let public_key = read_manifest(&template)?.key;
                let id = derive_id(&identity, &public_key)?;
                debug!("resolved {identity} ({id}) with {} data file(s)", raw_files.len());
                Ok(ComponentDescriptor {
                    identity,
                    id,
                    public_key,
                    manifest: ManifestSource::Template(template),
                    payload: Payload::Files {
                        data_file_version: data_file_version.clone(),
                        files: raw_files
                            .iter()
                            .map(|file| self.source_root.join(file))
                            .collect(),
                    },
                })
            })
            .collect()
    }

    fn resolve_model_parameters(&self) -> Result<Vec<ComponentDescriptor>> {
        let component_type = ComponentType::ClientModelParameters;
        let manifests_dir = self.build_root.join(rules::manifests_dir(component_type));
        let resources_dir = self
            .build_root
            .join(component_type.as_str())
            .join("resources");

        MODEL_PARAMETER_LOCALES
            .iter()
            .map(|entry| {
                let identity = ComponentIdentity::new(component_type, Some(entry.locale.to_owned()));
                let id = ComponentId::try_from(entry.id).map_err(|e| {
                    PackagerError::InvalidPublicKey {
                        component: identity.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(ComponentDescriptor {
                    id,
                    public_key: entry.key.to_owned(),
                    manifest: ManifestSource::Generated {
                        manifest: ComponentManifest::template(
                            rules::MODEL_PARAMETERS_DESCRIPTION,
                            rules::MODEL_PARAMETERS_NAME,
                            entry.key,
                        ),
                        path: manifests_dir.join(format!("{}-manifest.json", entry.locale)),
                    },
                    payload: Payload::Directory(resources_dir.join(entry.locale)),
                    identity,
                })
            })
            .collect()
    }

    fn data_file_version(&self, component_type: ComponentType) -> Result<String> {
        match rules::data_file_version(component_type) {
            DataFileVersionRule::Fixed(version) => Ok(version.to_owned()),
            DataFileVersionRule::FromJsonField(relative) => {
                read_data_file_version(&self.source_root.join(relative))
            }
            DataFileVersionRule::NotApplicable => Ok(String::new()),
        }
    }
}

/// Write generated manifest templates to disk so staging can copy them.
///
/// Descriptors with checked-in templates are left alone.
///
/// # Errors
///
/// Returns an error if a template cannot be written.
pub fn materialize_manifests(descriptors: &[ComponentDescriptor]) -> Result<()> {
    for descriptor in descriptors {
        if let ManifestSource::Generated { manifest, path } = &descriptor.manifest {
            debug!("writing generated manifest template {path}");
            write_manifest(path, manifest)?;
        }
    }
    Ok(())
}

/// Group raw data files by their normalized name, keeping first-seen order.
fn group_by_variant(raw_files: &[&'static str]) -> Vec<(String, Vec<&'static str>)> {
    let mut groups: Vec<(String, Vec<&'static str>)> = Vec::new();
    for &file in raw_files {
        let stem = Utf8Path::new(file).file_stem().unwrap_or(file);
        let variant = rules::normalized_data_file_name(stem).to_owned();
        match groups.iter_mut().find(|(name, _)| *name == variant) {
            Some((_, files)) => files.push(file),
            None => groups.push((variant, vec![file])),
        }
    }
    groups
}

fn derive_id(identity: &ComponentIdentity, public_key: &str) -> Result<ComponentId> {
    ComponentId::from_public_key(public_key).map_err(|e| PackagerError::InvalidPublicKey {
        component: identity.to_string(),
        reason: e.to_string(),
    })
}

/// Read `data_file_version` from a JSON file; strings and numbers are accepted.
fn read_data_file_version(path: &Utf8Path) -> Result<String> {
    let invalid = |reason: String| PackagerError::InvalidManifest {
        path: path.to_owned(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
    match value.get("data_file_version") {
        Some(serde_json::Value::String(version)) if !version.is_empty() => Ok(version.clone()),
        Some(serde_json::Value::Number(version)) => Ok(version.to_string()),
        _ => Err(invalid("missing data_file_version".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::rules::MODEL_PARAMETER_LOCALES;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    const KEY: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA";

    struct Checkout {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    impl Checkout {
        fn write(&self, relative: &str, contents: &str) {
            let path = self.root.join(relative);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, contents).expect("write");
        }

        fn resolver(&self) -> Resolver {
            Resolver::new(self.root.clone(), self.root.join("build"))
        }
    }

    fn template() -> String {
        format!(r#"{{"description":"d","key":"{KEY}","manifest_version":2,"name":"n","version":"0.0.0"}}"#)
    }

    #[fixture]
    fn checkout() -> Checkout {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
        Checkout { _dir: dir, root }
    }

    #[rstest]
    fn local_data_files_form_one_default_identity(checkout: Checkout) {
        checkout.write("manifests/local-data-files-updater/default-manifest.json", &template());

        let descriptors = checkout
            .resolver()
            .resolve(ComponentType::LocalDataFilesUpdater)
            .expect("resolves");

        assert_eq!(descriptors.len(), 1);
        let descriptor = &descriptors[0];
        assert_eq!(descriptor.identity.variant.as_deref(), Some("default"));
        assert_eq!(descriptor.id, ComponentId::from_public_key(KEY).expect("key"));
        let Payload::Files { data_file_version, files } = &descriptor.payload else {
            panic!("expected file payload");
        };
        assert_eq!(data_file_version, "1");
        let names: Vec<_> = files.iter().filter_map(|f| f.file_name()).collect();
        assert_eq!(
            names,
            [
                "AutoplayWhitelist.dat",
                "ExtensionWhitelist.dat",
                "Greaselion.json",
                "ReferrerWhitelist.json"
            ]
        );
    }

    #[rstest]
    fn https_everywhere_uses_fixed_data_file_version(checkout: Checkout) {
        checkout.write("manifests/https-everywhere-updater/default-manifest.json", &template());

        let descriptors = checkout
            .resolver()
            .resolve(ComponentType::HttpsEverywhereUpdater)
            .expect("resolves");

        assert!(matches!(
            &descriptors[0].payload,
            Payload::Files { data_file_version, .. } if data_file_version == "6.0"
        ));
    }

    #[rstest]
    #[case::string(r#""data_file_version": "1.0""#, "1.0")]
    #[case::number(r#""data_file_version": 2"#, "2")]
    fn speedreader_reads_data_file_version(
        checkout: Checkout,
        #[case] field: &str,
        #[case] expected: &str,
    ) {
        let manifest = format!(r#"{{"key":"{KEY}","version":"0.0.0",{field}}}"#);
        checkout.write("node_modules/speedreader/data/speedreader-updater-manifest.json", &manifest);

        let descriptors = checkout
            .resolver()
            .resolve(ComponentType::SpeedreaderUpdater)
            .expect("resolves");

        assert_eq!(descriptors[0].identity.variant.as_deref(), Some("speedreader-updater"));
        assert!(matches!(
            &descriptors[0].payload,
            Payload::Files { data_file_version, .. } if data_file_version == expected
        ));
    }

    #[rstest]
    fn ethereum_remote_client_copies_its_directory(checkout: Checkout) {
        checkout.write("node_modules/ethereum-remote-client/manifest.json", &template());

        let descriptors = checkout
            .resolver()
            .resolve(ComponentType::EthereumRemoteClient)
            .expect("resolves");

        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].identity.variant, None);
        assert_eq!(
            descriptors[0].payload,
            Payload::Directory(checkout.root.join("node_modules/ethereum-remote-client"))
        );
    }

    #[rstest]
    fn model_parameters_resolve_every_locale_without_io(checkout: Checkout) {
        let descriptors = checkout
            .resolver()
            .resolve(ComponentType::ClientModelParameters)
            .expect("resolves");

        assert_eq!(descriptors.len(), MODEL_PARAMETER_LOCALES.len());
        for (descriptor, entry) in descriptors.iter().zip(MODEL_PARAMETER_LOCALES) {
            assert_eq!(descriptor.identity.variant.as_deref(), Some(entry.locale));
            assert_eq!(descriptor.id.as_str(), entry.id);
            assert!(!descriptor.manifest.template_path().exists());
        }
        assert!(!checkout.root.join("build").exists());
    }

    #[rstest]
    fn materialize_writes_generated_templates(checkout: Checkout) {
        let descriptors = checkout
            .resolver()
            .resolve(ComponentType::ClientModelParameters)
            .expect("resolves");

        materialize_manifests(&descriptors).expect("writes");

        let us = read_manifest(
            &checkout
                .root
                .join("build/client-model-parameters/manifest-files/US-manifest.json"),
        )
        .expect("generated");
        assert_eq!(us.name, rules::MODEL_PARAMETERS_NAME);
        assert_eq!(us.version, crate::manifest::VERSION_PLACEHOLDER);
    }

    #[rstest]
    fn missing_template_is_reported(checkout: Checkout) {
        let err = checkout
            .resolver()
            .resolve(ComponentType::HttpsEverywhereUpdater)
            .expect_err("no template");
        assert!(matches!(err, PackagerError::InvalidManifest { .. }));
    }

    #[test]
    fn grouping_keeps_distinct_variants_apart() {
        let groups = group_by_variant(&["a/Greaselion.json", "b/custom.dat", "c/AutoplayWhitelist.dat"]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "default");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "custom");
    }
}
