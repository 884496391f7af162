//! # gearbox
//!
//! Turns raw wind-turbine sensor tables into training and validation datasets
//! plus a portable bundle of the fitted feature pipeline.
//!
//! ```text
//! catalog ─> normalize ─> index + one-hot ─> assemble ─> label ─> split
//!                                                                  ├─> train dataset
//!                                                                  ├─> validation dataset
//!                                                                  └─> bundle (tar.gz)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use gearbox::catalog::FileTable;
//! use gearbox::context::ExecutionContext;
//! use gearbox::pipeline::{JobSpec, run_job};
//! use gearbox::storage::LocalStore;
//! use std::sync::Arc;
//!
//! let spec = JobSpec::windturbine();
//! let source = FileTable::open("testdata/windturbine_raw.csv")?;
//! let ctx = ExecutionContext::new(Arc::new(LocalStore::open("out")?), 0)?;
//!
//! let report = run_job(&ctx, &spec, &source)?;
//! println!("{}", report.summary());
//! # Ok::<(), gearbox::error::GearboxError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`record`]: typed values, records and table schemas
//! - [`catalog`]: resolving `(database, table)` to rows
//! - [`features`]: normalizer, string indexer, one-hot encoder, assembler, label indexer
//! - [`dataset`]: labeled points, the seeded splitter and the sharded writer
//! - [`bundle`]: exporting and loading the fitted pipeline archive
//! - [`pipeline`]: job specs, validation and the executor
//! - [`integrity`]: SHA-256 receipts for written artifacts
//! - [`storage`]: the object-store trait and its local implementation

#![warn(clippy::all, rust_2018_idioms)]

pub mod bundle;
pub mod catalog;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod features;
pub mod integrity;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod storage;
