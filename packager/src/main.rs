//! CRX component packager CLI entrypoint.
//!
//! Packages every identity of one component type: reserves the next version
//! in the registry, stages the payload with that version, and signs it with
//! a Chromium-based browser. Per-identity outcomes are reported on stderr.

use clap::Parser;
use crx_packager::cli::ComponentCli;
use crx_packager::component::ComponentType;
use crx_packager::config::PackagerConfig;
use crx_packager::error::Result;
use crx_packager::output::exit_code_for_run;
use crx_packager::pipeline::{RunReport, package};

fn main() {
    let cli = ComponentCli::parse();
    let mut stderr = std::io::stderr();
    let exit_code = exit_code_for_run(run(&cli), cli.common.quiet, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &ComponentCli) -> Result<RunReport> {
    // The type is checked before anything touches the filesystem or network.
    let component_type: ComponentType = cli.component_type.parse()?;
    let config = PackagerConfig::from_component_args(cli)?;
    package(config, component_type)
}
