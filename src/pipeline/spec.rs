//! Job specification data structures.
//!
//! A job spec is a JSON document describing one ETL run: where the raw table
//! lives, its declared schema, the feature pipeline to fit, how to split the
//! result and where to write everything.

use crate::error::{GearboxError, Result, ResultExt as _};
use crate::features::{CategoricalColumn, DefaultValue, FeatureSettings, HandleUnseen};
use crate::record::{ColumnDef, ColumnType, TableSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current job spec version
pub const SPEC_VERSION: &str = "0.1";

/// Root job specification structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Specification version for future migrations
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable job name, also used as the bundle name
    pub name: String,

    /// Catalog table to read
    pub source: SourceConfig,

    /// Declared schema of the raw table
    pub schema: TableSchema,

    /// Categorical columns to index and one-hot encode, in order
    #[serde(default)]
    pub categorical_columns: Vec<CategoricalColumn>,

    /// Target column
    pub label_column: String,

    /// Share of records assigned to the training set
    #[serde(default = "default_split_ratio")]
    pub split_ratio: f64,

    /// Split seed; drawn at startup when absent
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub drop_last_category: bool,

    /// Column -> default for null or empty cells
    #[serde(default)]
    pub missing_value_defaults: BTreeMap<String, DefaultValue>,

    /// Columns concatenated into the feature vector, in order
    pub assembler_column_order: Vec<String>,

    #[serde(default)]
    pub handle_unseen: HandleUnseen,

    /// Drop records that fail to transform instead of aborting
    #[serde(default)]
    pub lenient: bool,

    /// Maximum number of part files per dataset
    #[serde(default = "default_output_shards")]
    pub output_shards: usize,

    /// Replace existing objects at the output paths
    #[serde(default)]
    pub overwrite: bool,

    /// Write integrity receipts next to the outputs
    #[serde(default = "default_true")]
    pub write_receipts: bool,

    pub output_paths: OutputPaths,
}

impl JobSpec {
    /// Load a job spec from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job spec {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse a job spec from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse job spec JSON")
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json).context("Failed to write job spec file")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize job spec")
    }

    /// Settings for fitting the feature pipeline.
    pub fn feature_settings(&self) -> FeatureSettings {
        FeatureSettings {
            categorical: self.categorical_columns.clone(),
            assembler_order: self.assembler_column_order.clone(),
            drop_last: self.drop_last_category,
            handle_unseen: self.handle_unseen,
        }
    }

    /// The wind-turbine breakdown job.
    pub fn windturbine() -> Self {
        let strings = [
            "turbine_id",
            "turbine_type",
            "wind_direction",
            "breakdown",
        ];
        let doubles = [
            "wind_speed",
            "rpm_blade",
            "oil_temperature",
            "oil_level",
            "temperature",
            "humidity",
            "vibrations_frequency",
            "pressure",
        ];
        let mut columns: Vec<ColumnDef> = strings
            .iter()
            .map(|n| ColumnDef::new(*n, ColumnType::String))
            .collect();
        columns.extend(doubles.iter().map(|n| ColumnDef::new(*n, ColumnType::Double)));

        let mut assembler_column_order = vec!["turb_id".to_owned(), "turb_type".to_owned()];
        assembler_column_order.extend(doubles.iter().map(|n| (*n).to_owned()));
        assembler_column_order.push("wind_dir".to_owned());

        Self {
            version: SPEC_VERSION.to_owned(),
            name: "windturbine".to_owned(),
            source: SourceConfig {
                database: "endtoendml-db".to_owned(),
                table: "raw".to_owned(),
            },
            schema: TableSchema::new(columns),
            categorical_columns: vec![
                CategoricalColumn::new("turbine_id", "turb_id"),
                CategoricalColumn::new("turbine_type", "turb_type"),
                CategoricalColumn::new("wind_direction", "wind_dir"),
            ],
            label_column: "breakdown".to_owned(),
            split_ratio: default_split_ratio(),
            seed: None,
            drop_last_category: false,
            missing_value_defaults: BTreeMap::from([
                (
                    "turbine_type".to_owned(),
                    DefaultValue::Text("HAWT".to_owned()),
                ),
                ("oil_temperature".to_owned(), DefaultValue::Number(37.0)),
            ]),
            assembler_column_order,
            handle_unseen: HandleUnseen::Keep,
            lenient: false,
            output_shards: default_output_shards(),
            overwrite: false,
            write_receipts: true,
            output_paths: OutputPaths::default(),
        }
    }
}

/// Catalog coordinates of the raw table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub database: String,
    pub table: String,
}

/// Output locations, as store keys.
///
/// All three support `{date}` and `{timestamp}` substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPaths {
    pub train: String,
    pub validation: String,
    pub bundle: String,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            train: "data/preprocessed/train".to_owned(),
            validation: "data/preprocessed/val".to_owned(),
            bundle: "output/sparkml/model.tar.gz".to_owned(),
        }
    }
}

impl OutputPaths {
    /// Paths with templates expanded against `now`.
    pub fn expand(&self, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            train: expand_path_template(&self.train, now),
            validation: expand_path_template(&self.validation, now),
            bundle: expand_path_template(&self.bundle, now),
        }
    }
}

/// Replace `{date}` with `YYYY-MM-DD` and `{timestamp}` with
/// `YYYYMMDDTHHMMSSZ`.
pub fn expand_path_template(template: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    template
        .replace("{date}", &now.format("%Y-%m-%d").to_string())
        .replace("{timestamp}", &now.format("%Y%m%dT%H%M%SZ").to_string())
}

/// Error for a spec that cannot run, listing every problem found.
pub fn invalid_spec(problems: &[impl std::fmt::Display]) -> GearboxError {
    let list: Vec<String> = problems.iter().map(ToString::to_string).collect();
    GearboxError::Config(format!("invalid job spec: {}", list.join("; ")))
}

fn default_version() -> String {
    SPEC_VERSION.to_owned()
}

fn default_split_ratio() -> f64 {
    0.8
}

fn default_output_shards() -> usize {
    1
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn test_spec_serialization() {
        let spec = JobSpec::windturbine();

        let json = spec.to_json().expect("Failed to serialize");
        assert!(json.contains("\"version\": \"0.1\""));
        assert!(json.contains("\"handle_unseen\": \"keep\""));
        assert!(json.contains("\"turbine_type\": \"HAWT\""));
        assert!(json.contains("\"oil_temperature\": 37.0"));

        let parsed = JobSpec::from_json(&json).expect("Failed to parse");
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_minimal_spec_uses_defaults() {
        let json = r#"{
            "name": "tiny",
            "source": {"database": "db", "table": "t"},
            "schema": {"columns": [
                {"name": "kind", "type": "string"},
                {"name": "speed", "type": "double"},
                {"name": "label", "type": "string"}
            ]},
            "categorical_columns": [{"column": "kind", "output": "kind_vec"}],
            "label_column": "label",
            "assembler_column_order": ["kind_vec", "speed"],
            "output_paths": {"train": "tr", "validation": "va", "bundle": "b.tar.gz"}
        }"#;

        let spec = JobSpec::from_json(json).unwrap();
        assert_eq!(spec.version, SPEC_VERSION);
        assert!((spec.split_ratio - 0.8).abs() < f64::EPSILON);
        assert_eq!(spec.seed, None);
        assert_eq!(spec.handle_unseen, HandleUnseen::Keep);
        assert_eq!(spec.output_shards, 1);
        assert!(spec.write_receipts);
        assert!(!spec.overwrite && !spec.lenient && !spec.drop_last_category);
    }

    #[test]
    fn test_windturbine_assembler_order() {
        let spec = JobSpec::windturbine();
        assert_eq!(spec.assembler_column_order.first().map(String::as_str), Some("turb_id"));
        assert_eq!(spec.assembler_column_order.last().map(String::as_str), Some("wind_dir"));
        assert_eq!(spec.assembler_column_order.len(), 11);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let mut value = serde_json::to_value(JobSpec::windturbine()).unwrap();
        value["handle_unseen"] = serde_json::json!("ignore");
        assert!(JobSpec::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_expand_path_template() {
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            expand_path_template("data/{date}/train", now),
            "data/2024-03-09/train"
        );
        assert_eq!(
            expand_path_template("out/{timestamp}/model.tar.gz", now),
            "out/20240309T140507Z/model.tar.gz"
        );
        assert_eq!(expand_path_template("plain", now), "plain");
    }
}
