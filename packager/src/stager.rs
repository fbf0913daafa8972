//! Staging directory assembly.
//!
//! Each identity is staged into its own directory under the build root:
//! the payload is copied in and the manifest template is written with the
//! reserved version substituted. The staging directory is what the archive
//! packager signs.

use crate::component::{ComponentDescriptor, ComponentIdentity, Payload};
use crate::error::{PackagerError, Result};
use crate::manifest::substitute_version;
use crate::version::ComponentVersion;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs;

/// Name of the manifest inside a staging directory.
pub const STAGED_MANIFEST: &str = "manifest.json";

/// Staging directory name used when an identity has no variant.
const UNNAMED_STAGING_DIR: &str = "staging";

/// A staged identity ready for packing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedComponent {
    /// The identity that was staged.
    pub identity: ComponentIdentity,
    /// The version written into the manifest.
    pub version: ComponentVersion,
    /// Root of the staging directory.
    pub dir: Utf8PathBuf,
}

impl StagedComponent {
    /// Path of the staged manifest.
    #[must_use]
    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.dir.join(STAGED_MANIFEST)
    }
}

/// Lays out staging directories and archives under a build root.
#[derive(Debug, Clone)]
pub struct Stager {
    build_root: Utf8PathBuf,
}

impl Stager {
    /// Create a stager writing beneath `build_root`.
    #[must_use]
    pub fn new(build_root: Utf8PathBuf) -> Self {
        Self { build_root }
    }

    /// Return the build root.
    #[must_use]
    pub fn build_root(&self) -> &Utf8Path {
        &self.build_root
    }

    /// Staging directory for an identity: `<build>/<type>/<variant>` or
    /// `<build>/<type>/staging` when unnamed.
    #[must_use]
    pub fn staging_path(&self, identity: &ComponentIdentity) -> Utf8PathBuf {
        self.type_dir(identity)
            .join(identity.variant.as_deref().unwrap_or(UNNAMED_STAGING_DIR))
    }

    /// Archive path for an identity: `<build>/<type>/<type>[-<variant>].crx`.
    #[must_use]
    pub fn archive_path(&self, identity: &ComponentIdentity) -> Utf8PathBuf {
        self.type_dir(identity)
            .join(format!("{}.crx", identity.artifact_stem()))
    }

    fn type_dir(&self, identity: &ComponentIdentity) -> Utf8PathBuf {
        self.build_root.join(identity.component_type.as_str())
    }

    /// Stage `descriptor` with `version` substituted into its manifest.
    ///
    /// Any previous contents of the staging directory are removed first.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::SourceMissing`] if a payload source does not
    /// exist, [`PackagerError::PlaceholderMismatch`] if the template does not
    /// carry exactly one placeholder, or [`PackagerError::StagingFailed`] if a
    /// filesystem operation fails.
    pub fn stage(
        &self,
        descriptor: &ComponentDescriptor,
        version: &ComponentVersion,
    ) -> Result<StagedComponent> {
        let template_path = descriptor.manifest.template_path();
        let manifest = substitute_version(&read_template(template_path)?, version, template_path)?;
        check_sources(&descriptor.payload)?;

        let dir = self.staging_path(&descriptor.identity);
        clean_dir(&dir)?;

        match &descriptor.payload {
            Payload::Directory(source) => copy_dir_recursive(source, &dir)?,
            Payload::Files {
                data_file_version,
                files,
            } => {
                let data_dir = dir.join(data_file_version);
                create_dir(&data_dir)?;
                for file in files {
                    copy_file(file, &data_dir)?;
                }
            }
        }

        let manifest_path = dir.join(STAGED_MANIFEST);
        fs::write(&manifest_path, manifest).map_err(|e| PackagerError::StagingFailed {
            reason: format!("failed to write {manifest_path}: {e}"),
        })?;
        debug!("staged {} at {dir}", descriptor.identity);

        Ok(StagedComponent {
            identity: descriptor.identity.clone(),
            version: version.clone(),
            dir,
        })
    }
}

fn read_template(path: &Utf8Path) -> Result<String> {
    if !path.is_file() {
        return Err(PackagerError::SourceMissing {
            path: path.to_owned(),
        });
    }
    fs::read_to_string(path).map_err(|e| PackagerError::InvalidManifest {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

fn check_sources(payload: &Payload) -> Result<()> {
    let missing = match payload {
        Payload::Directory(dir) => (!dir.is_dir()).then_some(dir),
        Payload::Files { files, .. } => files.iter().find(|file| !file.is_file()),
    };
    match missing {
        Some(path) => Err(PackagerError::SourceMissing { path: path.clone() }),
        None => Ok(()),
    }
}

fn clean_dir(dir: &Utf8Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| PackagerError::StagingFailed {
            reason: format!("failed to clean {dir}: {e}"),
        })?;
    }
    create_dir(dir)
}

fn create_dir(dir: &Utf8Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PackagerError::StagingFailed {
        reason: format!("failed to create {dir}: {e}"),
    })
}

fn copy_file(source: &Utf8Path, dest_dir: &Utf8Path) -> Result<()> {
    let name = source.file_name().ok_or_else(|| PackagerError::StagingFailed {
        reason: format!("{source} has no file name"),
    })?;
    let dest = dest_dir.join(name);
    debug!("copying {source} -> {dest}");
    fs::copy(source, &dest).map_err(|e| PackagerError::StagingFailed {
        reason: format!("failed to copy {source} to {dest}: {e}"),
    })?;
    Ok(())
}

/// Copy the contents of `source` into `dest`, recursing into subdirectories.
///
/// Links to files are copied as their target's contents. Links to
/// directories are refused, since they can point back into the tree.
fn copy_dir_recursive(source: &Utf8Path, dest: &Utf8Path) -> Result<()> {
    let entries = source
        .read_dir_utf8()
        .map_err(|e| PackagerError::StagingFailed {
            reason: format!("failed to read {source}: {e}"),
        })?;
    for entry in entries {
        let entry = entry.map_err(|e| PackagerError::StagingFailed {
            reason: format!("failed to read {source}: {e}"),
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| PackagerError::StagingFailed {
            reason: format!("failed to inspect {path}: {e}"),
        })?;
        if file_type.is_symlink() && path.is_dir() {
            return Err(PackagerError::StagingFailed {
                reason: format!("{path} links to a directory"),
            });
        }
        if file_type.is_dir() {
            let target = dest.join(entry.file_name());
            create_dir(&target)?;
            copy_dir_recursive(path, &target)?;
        } else {
            copy_file(path, dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentType, ManifestSource};
    use crate::component_id::ComponentId;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"{"description":"d","key":"k","manifest_version":2,"name":"n","version":"0.0.0"}"#;

    struct Workspace {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    impl Workspace {
        fn write(&self, relative: &str, contents: &[u8]) -> Utf8PathBuf {
            let path = self.root.join(relative);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, contents).expect("write");
            path
        }

        fn stager(&self) -> Stager {
            Stager::new(self.root.join("build"))
        }
    }

    #[fixture]
    fn workspace() -> Workspace {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
        Workspace { _dir: dir, root }
    }

    #[fixture]
    fn version() -> ComponentVersion {
        "1.2.4".parse().expect("valid")
    }

    fn descriptor(
        identity: ComponentIdentity,
        template: Utf8PathBuf,
        payload: Payload,
    ) -> ComponentDescriptor {
        ComponentDescriptor {
            identity,
            id: ComponentId::try_from("cchgndhfgmkkfmhjhmdenpgdbcdjfmgh").expect("id"),
            public_key: "k".to_owned(),
            manifest: ManifestSource::Template(template),
            payload,
        }
    }

    fn local_data_files(workspace: &Workspace) -> ComponentDescriptor {
        let template = workspace.write("manifests/default-manifest.json", TEMPLATE.as_bytes());
        let files = vec![
            workspace.write("data/AutoplayWhitelist.dat", b"autoplay"),
            workspace.write("data/Greaselion.json", b"[]"),
        ];
        descriptor(
            ComponentIdentity::new(
                ComponentType::LocalDataFilesUpdater,
                Some("default".to_owned()),
            ),
            template,
            Payload::Files {
                data_file_version: "1".to_owned(),
                files,
            },
        )
    }

    #[rstest]
    fn layout_follows_type_and_variant(workspace: Workspace) {
        let stager = workspace.stager();
        let named = ComponentIdentity::new(ComponentType::ClientModelParameters, Some("US".to_owned()));
        let unnamed = ComponentIdentity::new(ComponentType::EthereumRemoteClient, None);

        assert!(stager.staging_path(&named).ends_with("build/client-model-parameters/US"));
        assert!(stager.staging_path(&unnamed).ends_with("build/ethereum-remote-client/staging"));
        assert!(
            stager
                .archive_path(&named)
                .ends_with("build/client-model-parameters/client-model-parameters-US.crx")
        );
        assert!(
            stager
                .archive_path(&unnamed)
                .ends_with("build/ethereum-remote-client/ethereum-remote-client.crx")
        );
    }

    #[rstest]
    fn data_files_land_in_version_subdirectory(workspace: Workspace, version: ComponentVersion) {
        let staged = workspace
            .stager()
            .stage(&local_data_files(&workspace), &version)
            .expect("staged");

        assert_eq!(fs::read(staged.dir.join("1/AutoplayWhitelist.dat")).expect("copied"), b"autoplay");
        assert_eq!(fs::read(staged.dir.join("1/Greaselion.json")).expect("copied"), b"[]");
        let manifest = fs::read_to_string(staged.manifest_path()).expect("manifest");
        assert_eq!(manifest, TEMPLATE.replace("0.0.0", "1.2.4"));
    }

    #[rstest]
    fn stale_staging_contents_are_removed(workspace: Workspace, version: ComponentVersion) {
        let descriptor = local_data_files(&workspace);
        let stale = workspace.write("build/local-data-files-updater/default/leftover.txt", b"old");

        workspace.stager().stage(&descriptor, &version).expect("staged");

        assert!(!stale.exists());
    }

    #[rstest]
    fn directory_payload_is_copied_byte_for_byte(workspace: Workspace, version: ComponentVersion) {
        let template = workspace.write("wallet/manifest.json", TEMPLATE.as_bytes());
        workspace.write("wallet/app.js", b"console.log(1)");
        workspace.write("wallet/images/icon.png", &[0x89, 0x50, 0x4e, 0x47, 0x00, 0xff]);
        let descriptor = descriptor(
            ComponentIdentity::new(ComponentType::EthereumRemoteClient, None),
            template,
            Payload::Directory(workspace.root.join("wallet")),
        );

        let staged = workspace.stager().stage(&descriptor, &version).expect("staged");

        assert!(staged.dir.ends_with("ethereum-remote-client/staging"));
        assert_eq!(fs::read(staged.dir.join("app.js")).expect("copied"), b"console.log(1)");
        assert_eq!(
            fs::read(staged.dir.join("images/icon.png")).expect("copied"),
            [0x89, 0x50, 0x4e, 0x47, 0x00, 0xff]
        );
        assert!(
            fs::read_to_string(staged.manifest_path())
                .expect("manifest")
                .contains("\"version\":\"1.2.4\"")
        );
    }

    #[cfg(unix)]
    #[rstest]
    fn directory_link_in_payload_is_refused(workspace: Workspace, version: ComponentVersion) {
        let template = workspace.write("wallet/manifest.json", TEMPLATE.as_bytes());
        workspace.write("wallet/sub/app.js", b"console.log(1)");
        std::os::unix::fs::symlink("..", workspace.root.join("wallet/sub/loop")).expect("link");
        let descriptor = descriptor(
            ComponentIdentity::new(ComponentType::EthereumRemoteClient, None),
            template,
            Payload::Directory(workspace.root.join("wallet")),
        );

        let err = workspace
            .stager()
            .stage(&descriptor, &version)
            .expect_err("directory link");

        assert!(
            matches!(err, PackagerError::StagingFailed { ref reason } if reason.contains("links to a directory")),
            "unexpected error: {err:?}"
        );
    }

    #[cfg(unix)]
    #[rstest]
    fn file_link_in_payload_is_copied_as_contents(workspace: Workspace, version: ComponentVersion) {
        let template = workspace.write("wallet/manifest.json", TEMPLATE.as_bytes());
        let shared = workspace.write("shared/config.json", b"{}");
        std::os::unix::fs::symlink(&shared, workspace.root.join("wallet/config.json")).expect("link");
        let descriptor = descriptor(
            ComponentIdentity::new(ComponentType::EthereumRemoteClient, None),
            template,
            Payload::Directory(workspace.root.join("wallet")),
        );

        let staged = workspace.stager().stage(&descriptor, &version).expect("staged");

        let copied = staged.dir.join("config.json");
        assert!(!fs::symlink_metadata(&copied).expect("staged file").file_type().is_symlink());
        assert_eq!(fs::read(copied).expect("copied"), b"{}");
    }

    #[rstest]
    fn missing_data_file_is_reported(workspace: Workspace, version: ComponentVersion) {
        let mut descriptor = local_data_files(&workspace);
        let missing = workspace.root.join("data/ReferrerWhitelist.json");
        if let Payload::Files { files, .. } = &mut descriptor.payload {
            files.push(missing.clone());
        }

        let err = workspace
            .stager()
            .stage(&descriptor, &version)
            .expect_err("missing source");

        assert!(matches!(err, PackagerError::SourceMissing { ref path } if *path == missing));
        assert!(!workspace.root.join("build").exists());
    }

    #[rstest]
    fn template_without_placeholder_is_rejected(workspace: Workspace, version: ComponentVersion) {
        let mut descriptor = local_data_files(&workspace);
        let template = workspace.write("manifests/fixed.json", br#"{"version":"3.0.0"}"#);
        descriptor.manifest = ManifestSource::Template(template);

        let err = workspace
            .stager()
            .stage(&descriptor, &version)
            .expect_err("no placeholder");

        assert!(matches!(
            err,
            PackagerError::PlaceholderMismatch { occurrences: 0, .. }
        ));
    }
}
