//! CRX archive signing via a Chromium-based executable.
//!
//! Chromium's `--pack-extension` mode signs a directory with a private key and
//! writes `<dir>.crx` next to it. The packager runs it through the
//! [`CommandExecutor`] seam so tests can substitute a fake browser.

use crate::error::{PackagerError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fs;
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crx_packager::packer::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("chromium", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), crx_packager::error::PackagerError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        (**self).run(cmd, args)
    }
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        Command::new(cmd)
            .args(args)
            .output()
            .map_err(PackagerError::from)
    }
}

/// A signed archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArchive {
    /// Final archive location.
    pub path: Utf8PathBuf,
}

/// Check that a private key file exists and can be read.
///
/// # Errors
///
/// Returns [`PackagerError::PrivateKeyUnreadable`] otherwise.
pub fn check_private_key(path: &Utf8Path) -> Result<()> {
    let unreadable = |reason: String| PackagerError::PrivateKeyUnreadable {
        path: path.to_owned(),
        reason,
    };
    let metadata = fs::metadata(path).map_err(|e| unreadable(e.to_string()))?;
    if !metadata.is_file() {
        return Err(unreadable("not a regular file".to_owned()));
    }
    fs::File::open(path)
        .map(drop)
        .map_err(|e| unreadable(e.to_string()))
}

/// Signs staging directories into CRX archives.
#[derive(Debug)]
pub struct ArchivePackager<E> {
    executor: E,
    binary: Utf8PathBuf,
}

impl<E: CommandExecutor> ArchivePackager<E> {
    /// Create a packager running `binary` through `executor`.
    #[must_use]
    pub const fn new(executor: E, binary: Utf8PathBuf) -> Self {
        Self { executor, binary }
    }

    /// Access the executor.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Sign `staging_dir` with `private_key` and move the result to
    /// `archive_path`.
    ///
    /// The browser gets a throwaway profile directory that is removed when
    /// packing finishes.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::PrivateKeyUnreadable`] for a bad key,
    /// [`PackagerError::PackagerFailed`] if the browser exits unsuccessfully,
    /// and [`PackagerError::ArchiveMissing`] if it succeeds without writing
    /// the archive.
    pub fn pack(
        &self,
        staging_dir: &Utf8Path,
        private_key: &Utf8Path,
        archive_path: &Utf8Path,
    ) -> Result<PackedArchive> {
        check_private_key(private_key)?;
        let staging_dir = absolute(staging_dir)?;
        let private_key = absolute(private_key)?;

        let profile = tempfile::Builder::new()
            .prefix("crx-packager-profile")
            .tempdir()?;
        let profile_dir = Utf8Path::from_path(profile.path()).ok_or_else(|| {
            PackagerError::StagingFailed {
                reason: format!(
                    "temporary profile path is not UTF-8: {}",
                    profile.path().display()
                ),
            }
        })?;

        let args = pack_args(&staging_dir, &private_key, profile_dir);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!("running {} {}", self.binary, arg_refs.join(" "));
        let output = self.executor.run(self.binary.as_str(), &arg_refs)?;
        if !output.status.success() {
            return Err(packager_failed(&output));
        }

        let produced = Utf8PathBuf::from(format!("{staging_dir}.crx"));
        if !produced.is_file() {
            return Err(PackagerError::ArchiveMissing { path: produced });
        }
        move_archive(&produced, archive_path)?;
        info!("packed {archive_path}");

        Ok(PackedArchive {
            path: archive_path.to_owned(),
        })
    }
}

/// Arguments for a Chromium `--pack-extension` run.
#[must_use]
pub fn pack_args(
    staging_dir: &Utf8Path,
    private_key: &Utf8Path,
    profile_dir: &Utf8Path,
) -> Vec<String> {
    vec![
        format!("--pack-extension={staging_dir}"),
        format!("--pack-extension-key={private_key}"),
        format!("--user-data-dir={profile_dir}"),
        "--no-message-box".to_owned(),
    ]
}

fn packager_failed(output: &Output) -> PackagerError {
    PackagerError::PackagerFailed {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf> {
    path.canonicalize_utf8()
        .map_err(|e| PackagerError::StagingFailed {
            reason: format!("cannot resolve {path}: {e}"),
        })
}

fn move_archive(produced: &Utf8Path, archive_path: &Utf8Path) -> Result<()> {
    if produced == archive_path {
        return Ok(());
    }
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if archive_path.exists() {
        fs::remove_file(archive_path)?;
    }
    fs::rename(produced, archive_path).map_err(|e| PackagerError::StagingFailed {
        reason: format!("failed to move {produced} to {archive_path}: {e}"),
    })
}
