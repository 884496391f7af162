//! Job specification and execution.
//!
//! A job is described by a versioned JSON spec that can be validated on its
//! own and executed headlessly from the CLI.
//!
//! # Example: Programmatic Job Run
//!
//! ```no_run
//! use gearbox::catalog::{Catalog as _, DirectoryCatalog};
//! use gearbox::context::ExecutionContext;
//! use gearbox::pipeline::{JobSpec, run_job};
//! use gearbox::storage::LocalStore;
//! use std::sync::Arc;
//!
//! let spec = JobSpec::from_file("jobs/windturbine.json")?;
//! let catalog = DirectoryCatalog::new("catalog");
//! let source = catalog.resolve(&spec.source.database, &spec.source.table)?;
//!
//! let store = Arc::new(LocalStore::open("storage")?);
//! let ctx = ExecutionContext::new(store, 0)?;
//!
//! let report = run_job(&ctx, &spec, source.as_ref())?;
//! println!("{}", report.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod executor;
pub mod spec;
pub mod validation;

pub use executor::{Artifact, RunReport, run_job};
pub use spec::{
    JobSpec, OutputPaths, SPEC_VERSION, SourceConfig, expand_path_template, invalid_spec,
};
pub use validation::{ValidationError, ensure_valid, validate_job};
