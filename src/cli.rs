use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use gearbox::bundle::{self, archive};
use gearbox::catalog::{Catalog as _, DirectoryCatalog, FileTable, RecordSource};
use gearbox::config::AppSettings;
use gearbox::context::ExecutionContext;
use gearbox::integrity::verify_receipt;
use gearbox::logging;
use gearbox::pipeline::{JobSpec, run_job, validate_job};
use gearbox::storage::LocalStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "gearbox",
    version,
    about = "Wind turbine feature pipeline: datasets and a portable fitted-pipeline bundle"
)]
pub struct Cli {
    /// Settings file. Defaults to <config_dir>/gearbox/settings.json
    #[arg(long, global = true, env = "GEARBOX_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a job: read, encode, split, write datasets and export the bundle
    Run {
        /// Path to the job spec JSON
        #[arg(short, long)]
        job: PathBuf,

        /// Read this table file instead of resolving the job's source in the catalog
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Root directory for datasets, bundle and receipts
        #[arg(long, env = "GEARBOX_STORAGE_ROOT")]
        storage_root: Option<PathBuf>,

        /// Root directory of the table catalog
        #[arg(long, env = "GEARBOX_CATALOG_ROOT")]
        catalog_root: Option<PathBuf>,

        /// Worker threads (0 = one per core)
        #[arg(long, env = "GEARBOX_THREADS")]
        threads: Option<usize>,

        /// Split seed, overriding the job spec
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a job spec without running it
    Validate {
        #[arg(short, long)]
        job: PathBuf,

        /// Also check the spec against this table file's columns
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Print the contents of a bundle archive
    InspectBundle {
        /// Path to the .tar.gz bundle
        path: PathBuf,
    },
    /// Verify an artifact against its integrity receipt
    Verify {
        /// Receipt key within the storage root, or a path to the receipt file
        receipt: PathBuf,

        #[arg(long, env = "GEARBOX_STORAGE_ROOT")]
        storage_root: Option<PathBuf>,
    },
    /// Show the effective settings and log file locations
    Config {
        /// Write the effective settings to the settings file
        #[arg(long)]
        init: bool,
    },
    /// Write the wind-turbine job spec preset to a file
    NewJob {
        /// Destination of the job spec JSON
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run_command(
    command: Commands,
    settings: &AppSettings,
    settings_path: Option<&Path>,
) -> Result<()> {
    match command {
        Commands::Run {
            job,
            input,
            storage_root,
            catalog_root,
            threads,
            seed,
        } => {
            let storage_root = storage_root.unwrap_or_else(|| settings.storage_root.clone());
            let catalog_root = catalog_root.unwrap_or_else(|| settings.catalog_root.clone());
            let threads = threads.unwrap_or(settings.threads);
            handle_run(&job, input, &storage_root, &catalog_root, threads, seed)
        }
        Commands::Validate { job, input } => handle_validate(&job, input),
        Commands::InspectBundle { path } => handle_inspect_bundle(&path),
        Commands::Verify {
            receipt,
            storage_root,
        } => {
            let storage_root = storage_root.unwrap_or_else(|| settings.storage_root.clone());
            handle_verify(&receipt, &storage_root)
        }
        Commands::Config { init } => handle_config(settings, settings_path, init),
        Commands::NewJob { path, force } => handle_new_job(&path, force),
    }
}

fn handle_run(
    job: &Path,
    input: Option<PathBuf>,
    storage_root: &Path,
    catalog_root: &Path,
    threads: usize,
    seed: Option<u64>,
) -> Result<()> {
    let mut spec = JobSpec::from_file(job)
        .with_context(|| format!("Failed to load job spec {}", job.display()))?;
    if let Some(seed) = seed {
        spec.seed = Some(seed);
    }

    let source: Box<dyn RecordSource> = match input {
        Some(path) => Box::new(FileTable::open(path)?),
        None => DirectoryCatalog::new(catalog_root)
            .resolve(&spec.source.database, &spec.source.table)?,
    };

    let store = Arc::new(LocalStore::open(storage_root)?);
    let ctx = ExecutionContext::new(store, threads)?;

    println!(
        "Running job '{}' on {} ({} threads)...",
        spec.name,
        source.describe(),
        ctx.threads()
    );
    let report = run_job(&ctx, &spec, source.as_ref())?;

    for artifact in &report.artifacts {
        println!("  {:<8} {}", artifact.kind, artifact.location);
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    println!("{}", report.summary());
    Ok(())
}

fn handle_validate(job: &Path, input: Option<PathBuf>) -> Result<()> {
    let spec = JobSpec::from_file(job)
        .with_context(|| format!("Failed to load job spec {}", job.display()))?;

    let columns = match input {
        Some(path) => Some(FileTable::open(path)?.columns()?),
        None => None,
    };

    let errors = validate_job(&spec, columns.as_deref());
    if errors.is_empty() {
        println!("✓ Job spec '{}' is valid", spec.name);
        return Ok(());
    }

    println!("✗ Job spec '{}' has {} problem(s):", spec.name, errors.len());
    for error in &errors {
        println!("  - {error}");
    }
    anyhow::bail!("validation failed")
}

fn handle_inspect_bundle(path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let entries = archive::list(&bytes)?;
    let loaded = bundle::load_bundle(&bytes)?;
    let info = &loaded.info;

    println!("Bundle: {}", path.display());
    println!("  name:      {}", info.name);
    println!("  uid:       {}", info.uid);
    println!("  format:    {} {}", info.format, info.version);
    println!("  timestamp: {}", info.timestamp);
    println!("  features:  {}", loaded.pipeline.feature_width());
    println!("Stages:");
    for (name, kind) in loaded.pipeline.stages() {
        println!("  {name} ({kind:?})");
    }
    println!("Entries:");
    for entry in entries {
        println!("  {entry}");
    }
    Ok(())
}

fn handle_verify(receipt: &Path, storage_root: &Path) -> Result<()> {
    let store = LocalStore::open(storage_root)?;
    let key = receipt_key_for(storage_root, receipt)?;

    let result = verify_receipt(&store, &key)?;
    println!("{}", result.format_cli());
    if !result.passed {
        anyhow::bail!("integrity verification failed");
    }
    Ok(())
}

fn handle_config(settings: &AppSettings, settings_path: Option<&Path>, init: bool) -> Result<()> {
    let path = match settings_path {
        Some(path) => path.to_path_buf(),
        None => AppSettings::config_path()?,
    };

    if init {
        match settings_path {
            Some(path) => settings.save_to(path)?,
            None => settings.save()?,
        }
        println!("✓ Wrote settings to {}", path.display());
    }

    let log_dir = logging::log_dir(settings.log_dir.as_deref())?;
    println!("Settings file: {}", path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    println!("Logs:");
    println!("  {}", logging::current_log_path(&log_dir).display());
    println!("  {}", logging::current_error_log_path(&log_dir).display());
    Ok(())
}

fn handle_new_job(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to replace it", path.display());
    }

    let spec = JobSpec::windturbine();
    spec.to_file(path)
        .with_context(|| format!("Failed to write job spec {}", path.display()))?;
    println!("✓ Wrote job spec '{}' to {}", spec.name, path.display());
    Ok(())
}

/// Turn a receipt argument into a store key. Paths under the storage root are
/// made relative; anything else is taken as a key as written.
fn receipt_key_for(storage_root: &Path, receipt: &Path) -> Result<String> {
    let relative = match receipt.strip_prefix(storage_root) {
        Ok(rel) => rel,
        Err(_) if receipt.is_absolute() => anyhow::bail!(
            "{} is outside the storage root {}",
            receipt.display(),
            storage_root.display()
        ),
        Err(_) => receipt,
    };

    let key = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(key)
}
