//! # gearbox command line
//!
//! ```bash
//! gearbox validate --job jobs/windturbine.json --input testdata/windturbine_raw.csv
//! gearbox run --job jobs/windturbine.json --storage-root out --seed 42
//! gearbox inspect-bundle out/output/sparkml/model.tar.gz
//! gearbox verify out/data/preprocessed/train.receipt.json --storage-root out
//! gearbox new-job jobs/my_job.json
//! gearbox config --init
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)]

mod cli;

use anyhow::Result;
use clap::Parser as _;
use gearbox::config::AppSettings;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let settings = match &cli.settings {
        Some(path) => AppSettings::load_from(path)?,
        None => AppSettings::load()?,
    };

    gearbox::logging::init(settings.log_dir.as_deref())?;

    cli::run_command(cli.command, &settings, cli.settings.as_deref()).inspect_err(|e| tracing::error!("{e:#}"))
}
