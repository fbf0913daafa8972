//! Client model parameters packaging binary.
//!
//! Packages one archive per published locale, each signed with
//! `<keys-directory>/client-model-parameters-<locale>.pem`.

use clap::Parser;
use crx_packager::cli::ModelParametersCli;
use crx_packager::component::ComponentType;
use crx_packager::config::PackagerConfig;
use crx_packager::error::Result;
use crx_packager::output::exit_code_for_run;
use crx_packager::pipeline::{RunReport, package};

fn main() {
    let cli = ModelParametersCli::parse();
    let mut stderr = std::io::stderr();
    let exit_code = exit_code_for_run(run(&cli), cli.common.quiet, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &ModelParametersCli) -> Result<RunReport> {
    let config = PackagerConfig::from_model_parameters_args(cli)?;
    package(config, ComponentType::ClientModelParameters)
}
