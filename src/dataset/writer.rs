//! Delimited text output for labeled datasets.
//!
//! A dataset is written as a directory of shard objects followed by a marker:
//!
//! ```text
//! <destination>/part-00000
//! <destination>/part-00001
//! ...
//! <destination>/_SUCCESS
//! ```
//!
//! Each line is `<label>,<f0>,<f1>,...` with no header. `_SUCCESS` is empty and
//! written only after every shard landed, so consumers treat a destination
//! without it as incomplete.

use super::{Dataset, LabeledPoint};
use crate::context::ExecutionContext;
use crate::error::{GearboxError, Result};
use crate::storage::{ObjectStore, join_key};
use rayon::prelude::*;

pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Format one point as `label,f0,f1,...`.
///
/// Features always print in positional notation with a decimal point, so
/// `37` becomes `37.0` and `1e-7` becomes `0.0000001`.
pub fn format_line(point: &LabeledPoint) -> String {
    let mut line = point.label.to_string();
    for value in &point.features {
        line.push(',');
        line.push_str(&format_feature(*value));
    }
    line
}

fn format_feature(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// Whether `destination` holds a complete dataset.
pub fn is_complete(store: &dyn ObjectStore, destination: &str) -> Result<bool> {
    let marker = join_key(destination, SUCCESS_MARKER);
    Ok(store.list(&marker)?.iter().any(|k| k == &marker))
}

/// Summary of one dataset write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub destination: String,
    pub location: String,
    /// Shard keys in order, excluding the marker.
    pub files: Vec<String>,
    pub rows: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetWriter {
    shards: usize,
    overwrite: bool,
}

impl Default for DatasetWriter {
    fn default() -> Self {
        Self {
            shards: 1,
            overwrite: false,
        }
    }
}

impl DatasetWriter {
    /// Writer producing at most `shards` part files.
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Write `dataset` under `destination`.
    ///
    /// # Errors
    ///
    /// `WriteFailure` when the destination is occupied and overwrite is off,
    /// or when any storage operation fails.
    pub fn write(
        &self,
        ctx: &ExecutionContext,
        dataset: &Dataset,
        destination: &str,
    ) -> Result<WriteReport> {
        let store = ctx.store();
        let destination = destination.trim_end_matches('/');
        self.prepare_destination(store, destination)?;
        let empty: &[LabeledPoint] = &[];

        let shard_count = self.shards.min(dataset.len()).max(1);
        let chunk_size = dataset.len().div_ceil(shard_count).max(1);

        let written: Vec<(String, u64)> = ctx.install(|| {
            (0..shard_count)
                .into_par_iter()
                .map(|shard| {
                    let start = (shard * chunk_size).min(dataset.len());
                    let end = (start + chunk_size).min(dataset.len());
                    let key = join_key(destination, &format!("part-{shard:05}"));
                    let body = render(dataset.points.get(start..end).unwrap_or(empty));
                    store
                        .put(&key, body.as_bytes())
                        .map_err(|e| as_write_failure(&key, e))?;
                    Ok((key, body.len() as u64))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let marker = join_key(destination, SUCCESS_MARKER);
        store
            .put(&marker, &[])
            .map_err(|e| as_write_failure(&marker, e))?;

        let report = WriteReport {
            destination: destination.to_owned(),
            location: store.describe(destination),
            bytes: written.iter().map(|(_, b)| b).sum(),
            files: written.into_iter().map(|(k, _)| k).collect(),
            rows: dataset.len(),
        };

        tracing::info!(
            "Wrote {} rows to {} ({} files, {} bytes)",
            report.rows,
            report.location,
            report.files.len(),
            report.bytes
        );
        Ok(report)
    }

    /// Fail if `destination` already holds objects and overwrite is off.
    ///
    /// Lets a caller check every output up front before writing any of them.
    ///
    /// # Errors
    ///
    /// `WriteFailure` for an occupied destination or a failed listing.
    pub fn check_destination(&self, store: &dyn ObjectStore, destination: &str) -> Result<()> {
        self.existing_objects(store, destination.trim_end_matches('/'))
            .map(|_| ())
    }

    fn existing_objects(&self, store: &dyn ObjectStore, destination: &str) -> Result<Vec<String>> {
        let existing = store
            .list(destination)
            .map_err(|e| as_write_failure(destination, e))?;
        if !existing.is_empty() && !self.overwrite {
            return Err(GearboxError::WriteFailure(format!(
                "destination '{destination}' already holds {} objects and overwrite is off",
                existing.len()
            )));
        }
        Ok(existing)
    }

    fn prepare_destination(&self, store: &dyn ObjectStore, destination: &str) -> Result<()> {
        let existing = self.existing_objects(store, destination)?;
        if existing.is_empty() {
            return Ok(());
        }

        tracing::warn!(
            "Overwriting {} existing objects under {destination}",
            existing.len()
        );
        // Marker goes first so a partially cleared destination never looks complete.
        let marker = join_key(destination, SUCCESS_MARKER);
        let ordered = existing
            .iter()
            .filter(|k| **k == marker)
            .chain(existing.iter().filter(|k| **k != marker));
        for key in ordered {
            store.delete(key).map_err(|e| as_write_failure(key, e))?;
        }
        Ok(())
    }
}

fn render(points: &[LabeledPoint]) -> String {
    let mut body = String::new();
    for point in points {
        body.push_str(&format_line(point));
        body.push('\n');
    }
    body
}

fn as_write_failure(key: &str, err: GearboxError) -> GearboxError {
    match err {
        GearboxError::WriteFailure(_) => err,
        other => GearboxError::WriteFailure(format!("{key}: {other}")),
    }
}
