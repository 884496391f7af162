//! Job execution engine.
//!
//! Runs a validated job spec end to end and produces a [`RunReport`]:
//!
//! 1. read the raw table and fill missing values
//! 2. fit the feature pipeline and the label indexer on every record
//! 3. transform records to labeled feature vectors
//! 4. split into training and validation sets
//! 5. write both datasets, export the bundle, write receipts
//!
//! All three output locations are checked before any input is read, so a
//! run that would collide with existing outputs fails without writing.

use super::spec::JobSpec;
use super::validation::ensure_valid;
use crate::bundle::export_bundle;
use crate::catalog::RecordSource;
use crate::context::ExecutionContext;
use crate::dataset::{Dataset, DatasetWriter, LabeledPoint, WriteReport, split_dataset};
use crate::error::{GearboxError, Result};
use crate::features::{FittedPipeline, HandleUnseen, LabelIndexer, SchemaNormalizer};
use crate::integrity::{ArtifactKind, create_receipt, receipt_key, save_receipt};
use crate::storage::ObjectStore;
use crate::record::{Record, TableSchema};
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Per-record warnings logged individually before they are only counted.
const MAX_LOGGED_DROPS: usize = 20;

/// One artifact written by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: &'static str,
    pub key: String,
    pub location: String,
}

/// Report generated after job execution
#[derive(Debug, Clone)]
pub struct RunReport {
    pub job_name: String,

    /// Records read from the source
    pub rows_read: usize,

    /// Records dropped by the `skip` unseen-value policy
    pub rows_skipped: usize,

    /// Records dropped by lenient mode after a transform error
    pub rows_dropped: usize,

    pub train_rows: usize,
    pub validation_rows: usize,

    /// Width of every feature vector
    pub feature_width: usize,

    /// Label values in class-code order
    pub label_classes: Vec<String>,

    /// Seed used by the splitter
    pub seed: u64,

    /// Whether the seed was drawn at startup rather than configured
    pub seed_generated: bool,

    pub artifacts: Vec<Artifact>,

    /// Warnings generated during execution
    pub warnings: Vec<String>,

    /// Time taken for execution
    pub duration: Duration,
}

impl RunReport {
    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Job '{}' completed: {} rows read, {} train / {} validation, {} skipped, {} dropped, \
             {} features, {} classes, seed {}{}, {:.2}s",
            self.job_name,
            self.rows_read,
            self.train_rows,
            self.validation_rows,
            self.rows_skipped,
            self.rows_dropped,
            self.feature_width,
            self.label_classes.len(),
            self.seed,
            if self.seed_generated { " (generated)" } else { "" },
            self.duration.as_secs_f64()
        )
    }
}

/// Outcome of transforming one record.
enum Transformed {
    Point(LabeledPoint),
    Skipped,
    Dropped(String),
}

/// Execute a job spec against `source`.
///
/// # Errors
///
/// `Config` for an invalid spec, `SchemaMismatch`/`Encoding` for fit errors
/// and (unless lenient) transform errors, `WriteFailure` and `BundleExport`
/// for output errors.
pub fn run_job(
    ctx: &ExecutionContext,
    spec: &JobSpec,
    source: &dyn RecordSource,
) -> Result<RunReport> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    ensure_valid(spec, None)?;

    let store = ctx.store();
    let paths = spec.output_paths.expand(ctx.started_utc());
    let writer = DatasetWriter::new(spec.output_shards).with_overwrite(spec.overwrite);
    writer.check_destination(store, &paths.train)?;
    writer.check_destination(store, &paths.validation)?;
    check_bundle_destination(store, &paths.bundle, spec.overwrite)?;
    if spec.overwrite {
        remove_stale_receipts(store, [&paths.train, &paths.validation, &paths.bundle])?;
    }

    let (seed, seed_generated) = match spec.seed {
        Some(seed) => (seed, false),
        None => {
            let seed = rand::random::<u64>();
            tracing::info!("No split seed configured, using generated seed {seed}");
            warnings.push(format!("split seed generated at startup: {seed}"));
            (seed, true)
        }
    };

    tracing::info!("Reading input from {}", source.describe());
    let mut records = source.read(&spec.schema)?;
    let rows_read = records.len();
    tracing::info!("Read {rows_read} records");

    let normalizer = SchemaNormalizer::new(&spec.missing_value_defaults, &spec.schema)?;
    normalizer.normalize_all(ctx, &mut records);

    tracing::info!("Fitting feature pipeline");
    let pipeline = FittedPipeline::fit(ctx, &records, &spec.feature_settings())?;
    let labels = LabelIndexer::fit(ctx, &records, &spec.label_column, HandleUnseen::Error)?;
    tracing::info!(
        "Fitted {} indexers, feature width {}, {} label classes",
        pipeline.indexers.len(),
        pipeline.feature_width(),
        labels.classes().len()
    );

    tracing::info!("Transforming records");
    let transformed = transform_all(ctx, &spec.schema, &pipeline, &labels, records, spec.lenient)?;

    let mut points = Vec::with_capacity(transformed.len());
    let mut rows_skipped = 0;
    let mut rows_dropped = 0;
    for outcome in transformed {
        match outcome {
            Transformed::Point(point) => points.push(point),
            Transformed::Skipped => rows_skipped += 1,
            Transformed::Dropped(reason) => {
                rows_dropped += 1;
                if rows_dropped <= MAX_LOGGED_DROPS {
                    tracing::warn!("Dropped record: {reason}");
                }
            }
        }
    }
    if rows_dropped > 0 {
        warnings.push(format!("{rows_dropped} records dropped after transform errors"));
    }
    if rows_skipped > 0 {
        warnings.push(format!("{rows_skipped} records skipped with unseen categories"));
    }

    tracing::info!("Splitting {} records with ratio {}", points.len(), spec.split_ratio);
    let split = split_dataset(ctx, Dataset::new(points), spec.split_ratio, seed)?;
    if split.train.is_empty() || split.validation.is_empty() {
        warnings.push("one of the split subsets is empty".to_owned());
    }

    let mut artifacts = Vec::new();

    tracing::info!("Writing training data");
    let train = writer.write(ctx, &split.train, &paths.train)?;
    artifacts.push(dataset_artifact("train", &train));

    tracing::info!("Writing validation data");
    let validation = writer.write(ctx, &split.validation, &paths.validation)?;
    artifacts.push(dataset_artifact("validation", &validation));

    let bundle = export_bundle(ctx, &pipeline, &spec.name, &paths.bundle)?;
    artifacts.push(Artifact {
        kind: "bundle",
        key: bundle.key.clone(),
        location: bundle.location.clone(),
    });

    if spec.write_receipts {
        let width = Some(pipeline.feature_width());
        let receipts = [
            create_receipt(
                store,
                ArtifactKind::Dataset,
                &train.destination,
                &train.files,
                Some(train.rows),
                width,
            )?,
            create_receipt(
                store,
                ArtifactKind::Dataset,
                &validation.destination,
                &validation.files,
                Some(validation.rows),
                width,
            )?,
            create_receipt(
                store,
                ArtifactKind::Bundle,
                &bundle.key,
                std::slice::from_ref(&bundle.key),
                None,
                None,
            )?,
        ];
        for receipt in &receipts {
            let key = save_receipt(store, receipt)?;
            artifacts.push(Artifact {
                kind: "receipt",
                location: store.describe(&key),
                key,
            });
        }
    }

    let report = RunReport {
        job_name: spec.name.clone(),
        rows_read,
        rows_skipped,
        rows_dropped,
        train_rows: train.rows,
        validation_rows: validation.rows,
        feature_width: pipeline.feature_width(),
        label_classes: labels.classes().to_vec(),
        seed,
        seed_generated,
        artifacts,
        warnings,
        duration: start.elapsed(),
    };
    tracing::info!("{}", report.summary());
    Ok(report)
}

/// Transform every record on the worker pool.
///
/// Stops at the first fatal error. In lenient mode record-level errors become
/// [`Transformed::Dropped`] instead.
fn transform_all(
    ctx: &ExecutionContext,
    schema: &TableSchema,
    pipeline: &FittedPipeline,
    labels: &LabelIndexer,
    records: Vec<Record>,
    lenient: bool,
) -> Result<Vec<Transformed>> {
    ctx.install(|| {
        records
            .into_par_iter()
            .enumerate()
            .map(|(row, mut record)| {
                match transform_one(schema, pipeline, labels, &mut record) {
                    Ok(Some(point)) => Ok(Transformed::Point(point)),
                    Ok(None) => Ok(Transformed::Skipped),
                    Err(e) if lenient && e.is_record_level() => {
                        Ok(Transformed::Dropped(format!("row {row}: {e}")))
                    }
                    Err(e) => Err(prefix_row(row, e)),
                }
            })
            .collect()
    })
}

fn transform_one(
    schema: &TableSchema,
    pipeline: &FittedPipeline,
    labels: &LabelIndexer,
    record: &mut Record,
) -> Result<Option<LabeledPoint>> {
    schema.check_record(record)?;
    let Some(features) = pipeline.transform(record)? else {
        return Ok(None);
    };
    let Some(label) = labels.label(record)? else {
        return Ok(None);
    };
    Ok(Some(LabeledPoint::new(label, features)))
}

fn prefix_row(row: usize, err: GearboxError) -> GearboxError {
    match err {
        GearboxError::SchemaMismatch(msg) => {
            GearboxError::SchemaMismatch(format!("row {row}: {msg}"))
        }
        GearboxError::Encoding(msg) => GearboxError::Encoding(format!("row {row}: {msg}")),
        other => other,
    }
}

fn check_bundle_destination(store: &dyn ObjectStore, key: &str, overwrite: bool) -> Result<()> {
    let existing = store.list(key).map_err(|e| {
        GearboxError::BundleExport(format!("cannot check bundle {}: {e}", store.describe(key)))
    })?;
    if !overwrite && !existing.is_empty() {
        return Err(GearboxError::BundleExport(format!(
            "bundle {} already exists and overwrite is off",
            store.describe(key)
        )));
    }
    Ok(())
}

/// Receipts from an earlier run no longer describe what is about to be written.
fn remove_stale_receipts<'a>(
    store: &dyn ObjectStore,
    artifact_keys: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    for artifact in artifact_keys {
        let key = receipt_key(artifact);
        store
            .delete(&key)
            .map_err(|e| GearboxError::WriteFailure(format!("cannot remove {key}: {e}")))?;
    }
    Ok(())
}

fn dataset_artifact(kind: &'static str, report: &WriteReport) -> Artifact {
    Artifact {
        kind,
        key: report.destination.clone(),
        location: report.location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryTable;
    use crate::dataset::is_complete;
    use crate::storage::{LocalStore, ObjectStore as _};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<LocalStore>, ExecutionContext) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(dir.path()).unwrap());
        let ctx = ExecutionContext::new(store.clone(), 2).unwrap();
        (dir, store, ctx)
    }

    fn turbine(id: &str, kind: &str, dir: &str, oil: Option<f64>, breakdown: &str) -> Record {
        Record::new()
            .with("turbine_id", id)
            .with("turbine_type", kind)
            .with("wind_direction", dir)
            .with("breakdown", breakdown)
            .with("wind_speed", 10.0)
            .with("rpm_blade", 50.0)
            .with("oil_temperature", oil)
            .with("oil_level", 30.0)
            .with("temperature", 20.0)
            .with("humidity", 60.0)
            .with("vibrations_frequency", 3.0)
            .with("pressure", 80.0)
    }

    fn table() -> MemoryTable {
        let mut records = Vec::new();
        for i in 0..40 {
            let id = format!("T{}", i % 4);
            let kind = if i % 5 == 0 { "" } else { "HAWT" };
            let dir = ["N", "S", "E", "W"][i % 4];
            let oil = (i % 7 != 0).then_some(35.0 + i as f64);
            let breakdown = if i % 3 == 0 { "yes" } else { "no" };
            records.push(turbine(&id, kind, dir, oil, breakdown));
        }
        MemoryTable::new("windturbine", records)
    }

    fn spec() -> JobSpec {
        let mut spec = JobSpec::windturbine();
        spec.seed = Some(7);
        spec.output_shards = 2;
        spec
    }

    #[test]
    fn test_run_job_writes_everything() {
        let (_dir, store, ctx) = setup();
        let report = run_job(&ctx, &spec(), &table()).unwrap();

        assert_eq!(report.rows_read, 40);
        assert_eq!(report.train_rows + report.validation_rows, 40);
        assert_eq!(report.label_classes, vec!["no", "yes"]);
        // ids 4+1, types 1+1 (empty became HAWT), 8 numerics, directions 4+1
        assert_eq!(report.feature_width, 5 + 2 + 8 + 5);
        assert!(!report.seed_generated);

        assert!(is_complete(store.as_ref(), "data/preprocessed/train").unwrap());
        assert!(is_complete(store.as_ref(), "data/preprocessed/val").unwrap());
        assert!(!store.list("output/sparkml/model.tar.gz").unwrap().is_empty());
        assert_eq!(
            report.artifacts.iter().filter(|a| a.kind == "receipt").count(),
            3
        );
    }

    #[test]
    fn test_missing_oil_temperature_defaults_to_37() {
        let (_dir, store, ctx) = setup();
        let pair = MemoryTable::new(
            "pair",
            vec![
                turbine("T1", "", "N", None, "yes"),
                turbine("T2", "HAWT", "S", Some(1.0), "no"),
            ],
        );
        run_job(&ctx, &spec(), &pair).unwrap();

        let mut lines = Vec::new();
        for key in store.list("data/preprocessed").unwrap() {
            if key.contains("part-") {
                let body = String::from_utf8(store.get(&key).unwrap()).unwrap();
                lines.extend(body.lines().map(str::to_owned));
            }
        }
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.contains(",37.0,")), "{lines:?}");
    }

    #[test]
    fn test_same_seed_same_outputs() {
        let (_d1, s1, c1) = setup();
        let (_d2, s2, c2) = setup();
        run_job(&c1, &spec(), &table()).unwrap();
        run_job(&c2, &spec(), &table()).unwrap();

        for key in s1.list("data/preprocessed").unwrap() {
            if key.contains("part-") {
                assert_eq!(s1.get(&key).unwrap(), s2.get(&key).unwrap(), "{key} differs");
            }
        }
    }

    #[test]
    fn test_generated_seed_is_reported() {
        let (_dir, _store, ctx) = setup();
        let mut spec = spec();
        spec.seed = None;
        let report = run_job(&ctx, &spec, &table()).unwrap();
        assert!(report.seed_generated);
        assert!(report.summary().contains(&report.seed.to_string()));
    }

    #[test]
    fn test_second_run_requires_overwrite() {
        let (_dir, _store, ctx) = setup();
        run_job(&ctx, &spec(), &table()).unwrap();

        let err = run_job(&ctx, &spec(), &table()).unwrap_err();
        assert!(matches!(err, GearboxError::WriteFailure(_)), "got {err}");

        let mut again = spec();
        again.overwrite = true;
        run_job(&ctx, &again, &table()).unwrap();
    }

    #[test]
    fn test_missing_label_fails_unless_lenient() {
        let (_dir, _store, ctx) = setup();
        let mut records = table().read(&spec().schema).unwrap();
        records[3].set("breakdown", crate::record::Value::Null);
        let table = MemoryTable::new("t", records);

        let err = run_job(&ctx, &spec(), &table).unwrap_err();
        assert!(err.is_record_level(), "got {err}");

        let mut lenient = spec();
        lenient.lenient = true;
        let report = run_job(&ctx, &lenient, &table).unwrap();
        assert_eq!(report.rows_dropped, 1);
        assert_eq!(report.train_rows + report.validation_rows, 39);
    }

    #[test]
    fn test_invalid_spec_rejected_before_reading() {
        let (_dir, _store, ctx) = setup();
        let mut spec = spec();
        spec.split_ratio = 0.0;
        assert!(matches!(
            run_job(&ctx, &spec, &table()),
            Err(GearboxError::Config(_))
        ));
    }

    #[test]
    fn test_occupied_bundle_key_fails_before_writing() {
        let (_dir, store, ctx) = setup();
        store.put("output/sparkml/model.tar.gz", b"old bundle").unwrap();

        let err = run_job(&ctx, &spec(), &table()).unwrap_err();
        assert!(matches!(err, GearboxError::BundleExport(_)), "got {err}");
        assert!(store.list("data/preprocessed").unwrap().is_empty());

        store.delete("output/sparkml/model.tar.gz").unwrap();
        run_job(&ctx, &spec(), &table()).unwrap();
    }

    #[test]
    fn test_occupied_validation_fails_before_train_is_written() {
        let (_dir, store, ctx) = setup();
        store.put("data/preprocessed/val/part-00000", b"0,1.0\n").unwrap();

        let err = run_job(&ctx, &spec(), &table()).unwrap_err();
        assert!(matches!(err, GearboxError::WriteFailure(_)), "got {err}");
        assert!(store.list("data/preprocessed/train").unwrap().is_empty());
    }

    /// Local store whose listings of bundle keys fail.
    struct BrokenBundleListing(LocalStore);

    impl ObjectStore for BrokenBundleListing {
        fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
            self.0.put(key, bytes)
        }
        fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.0.get(key)
        }
        fn list(&self, prefix: &str) -> Result<Vec<String>> {
            if prefix.ends_with(".tar.gz") {
                return Err(GearboxError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "listing denied",
                )));
            }
            self.0.list(prefix)
        }
        fn delete(&self, key: &str) -> Result<()> {
            self.0.delete(key)
        }
        fn describe(&self, key: &str) -> String {
            self.0.describe(key)
        }
    }

    #[test]
    fn test_bundle_listing_error_is_bundle_export() {
        let dir = TempDir::new().unwrap();
        let store = BrokenBundleListing(LocalStore::open(dir.path()).unwrap());
        let ctx = ExecutionContext::new(Arc::new(store), 1).unwrap();

        let err = run_job(&ctx, &spec(), &table()).unwrap_err();
        assert!(matches!(err, GearboxError::BundleExport(_)), "got {err}");
        assert!(err.to_string().contains("listing denied"));
    }

    #[test]
    fn test_overwrite_removes_stale_receipts() {
        let (_dir, store, ctx) = setup();
        let first = run_job(&ctx, &spec(), &table()).unwrap();
        let receipts: Vec<String> = first
            .artifacts
            .iter()
            .filter(|a| a.kind == "receipt")
            .map(|a| a.key.clone())
            .collect();
        assert_eq!(receipts.len(), 3);

        let mut again = spec();
        again.overwrite = true;
        again.write_receipts = false;
        run_job(&ctx, &again, &table()).unwrap();

        for key in &receipts {
            assert!(store.get(key).is_err(), "{key} left behind");
        }
    }
}
