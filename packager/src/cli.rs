//! CLI argument definitions for the packaging binaries.
//!
//! Both binaries share [`CommonArgs`]; they differ in how the component set
//! and the signing keys are chosen.

use crate::registry::DEFAULT_TABLE;
use camino::Utf8PathBuf;
use clap::{Args, Parser};

/// Region used when `--region` is not given.
pub const DEFAULT_REGION: &str = "us-east-2";

/// Default private key file.
pub const DEFAULT_KEY_FILE: &str = "key.pem";

/// Package a browser component into a signed CRX archive.
#[derive(Parser, Debug, Clone)]
#[command(name = "crx-package-component")]
#[command(version, about)]
#[command(long_about = concat!(
    "Package a browser component into a signed CRX archive.\n\n",
    "Reserves the next version of every identity the component type publishes ",
    "in the version registry, stages the payload with that version written into ",
    "the manifest, and signs the result with a Chromium-based browser.",
))]
#[command(after_help = concat!(
    "COMPONENT TYPES:\n",
    "  ethereum-remote-client\n",
    "  https-everywhere-updater\n",
    "  local-data-files-updater\n",
    "  speedreader-updater\n",
    "  client-model-parameters\n\n",
    "EXAMPLES:\n",
    "  Package local data files against a local table:\n",
    "    $ crx-package-component -b /usr/bin/chromium -t local-data-files-updater \\\n",
    "        -f key.pem -e http://localhost:8000\n\n",
    "  Package with one key per identity:\n",
    "    $ crx-package-component -b /usr/bin/chromium -t speedreader-updater -d keys/",
))]
pub struct ComponentCli {
    /// Component type to package.
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub component_type: String,

    /// Private key file used for every identity of the type.
    #[arg(short = 'f', long, value_name = "FILE", default_value = DEFAULT_KEY_FILE)]
    pub key_file: Utf8PathBuf,

    /// Directory of `<type>[-<variant>].pem` keys, used when the key file is
    /// absent.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub keys_directory: Option<Utf8PathBuf>,

    /// Options shared with the other packaging binary.
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Package the client model parameters for every supported locale.
#[derive(Parser, Debug, Clone)]
#[command(name = "crx-package-model-parameters")]
#[command(version, about)]
pub struct ModelParametersCli {
    /// Directory of `client-model-parameters-<locale>.pem` keys.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub keys_directory: Utf8PathBuf,

    /// Options shared with the other packaging binary.
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Options accepted by both binaries.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Chromium-based executable used to sign the archive.
    #[arg(short = 'b', long, value_name = "BINARY")]
    pub binary: Utf8PathBuf,

    /// Version table endpoint; empty selects the AWS regional endpoint
    /// (use http://localhost:8000 for a local table).
    #[arg(short = 'e', long, value_name = "URL", default_value = "")]
    pub endpoint: String,

    /// Version table region.
    #[arg(short = 'r', long, value_name = "REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Version table name.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_TABLE)]
    pub table: String,

    /// Checkout holding `node_modules/` and `manifests/`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub source_root: Utf8PathBuf,

    /// Directory receiving staging directories and archives.
    #[arg(long = "build-dir", value_name = "DIR", default_value = "build")]
    pub build_dir: Utf8PathBuf,

    /// Package identities one at a time and stop at the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// Suppress progress output (errors still shown).
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
