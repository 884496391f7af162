//! Missing-value defaults.
//!
//! Null or empty-string cells in targeted columns are replaced with the
//! configured default. Untargeted columns pass through untouched.

use crate::context::ExecutionContext;
use crate::error::{GearboxError, Result};
use crate::record::{ColumnType, Record, TableSchema, Value};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default value as written in a job spec: either text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Number(f64),
    Text(String),
}

impl DefaultValue {
    /// Convert to a cell value of the column's declared type.
    ///
    /// # Errors
    ///
    /// `Config` when a text default targets a numeric column or the reverse.
    pub fn to_value(&self, column: &str, column_type: ColumnType) -> Result<Value> {
        match (self, column_type) {
            (Self::Text(s), ColumnType::String) => Ok(Value::Str(s.clone())),
            (Self::Number(n), ColumnType::Double) => Ok(Value::Double(*n)),
            (Self::Number(n), ColumnType::Float) => Ok(Value::Float(*n as f32)),
            (other, _) => Err(GearboxError::Config(format!(
                "default {other:?} for column '{column}' does not match its declared type {column_type}"
            ))),
        }
    }
}

/// Fills missing values with per-column defaults.
#[derive(Debug, Clone, Default)]
pub struct SchemaNormalizer {
    defaults: Vec<(String, Value)>,
}

impl SchemaNormalizer {
    /// Resolve configured defaults against the declared schema.
    ///
    /// # Errors
    ///
    /// `Config` if a default names an undeclared column or has the wrong type.
    pub fn new(defaults: &BTreeMap<String, DefaultValue>, schema: &TableSchema) -> Result<Self> {
        let defaults = defaults
            .iter()
            .map(|(column, default)| {
                let column_type = schema.column_type(column).ok_or_else(|| {
                    GearboxError::Config(format!(
                        "default given for undeclared column '{column}'"
                    ))
                })?;
                Ok((column.clone(), default.to_value(column, column_type)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { defaults })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.defaults.iter().map(|(c, _)| c.as_str())
    }

    /// Replace null/empty targeted cells in place.
    ///
    /// Absent columns count as null, so the column is added.
    pub fn normalize(&self, record: &mut Record) {
        for (column, default) in &self.defaults {
            let missing = record.get(column).is_none_or(Value::is_empty);
            if missing {
                record.set(column.clone(), default.clone());
            }
        }
    }

    /// Normalize every record on the context's worker pool.
    pub fn normalize_all(&self, ctx: &ExecutionContext, records: &mut [Record]) {
        ctx.install(|| records.par_iter_mut().for_each(|r| self.normalize(r)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ColumnDef;

    fn turbine_schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("turbine_id", ColumnType::String),
            ColumnDef::new("turbine_type", ColumnType::String),
            ColumnDef::new("oil_temperature", ColumnType::Double),
            ColumnDef::new("breakdown", ColumnType::String),
            ColumnDef::new("wind_direction", ColumnType::String),
        ])
    }

    fn turbine_defaults() -> BTreeMap<String, DefaultValue> {
        BTreeMap::from([
            (
                "turbine_type".to_owned(),
                DefaultValue::Text("HAWT".to_owned()),
            ),
            ("oil_temperature".to_owned(), DefaultValue::Number(37.0)),
        ])
    }

    #[test]
    fn test_fills_empty_and_null() {
        let normalizer = SchemaNormalizer::new(&turbine_defaults(), &turbine_schema()).unwrap();

        let mut record = Record::new()
            .with("turbine_id", "T1")
            .with("turbine_type", "")
            .with("oil_temperature", Value::Null)
            .with("breakdown", "yes")
            .with("wind_direction", "N");

        normalizer.normalize(&mut record);

        let expected = Record::new()
            .with("turbine_id", "T1")
            .with("turbine_type", "HAWT")
            .with("oil_temperature", 37.0)
            .with("breakdown", "yes")
            .with("wind_direction", "N");
        assert_eq!(record, expected);
    }

    #[test]
    fn test_keeps_present_values_and_untargeted_columns() {
        let normalizer = SchemaNormalizer::new(&turbine_defaults(), &turbine_schema()).unwrap();

        let mut record = Record::new()
            .with("turbine_type", "VAWT")
            .with("oil_temperature", 41.5)
            .with("wind_direction", "");

        normalizer.normalize(&mut record);

        assert_eq!(record.get("turbine_type"), Some(&Value::from("VAWT")));
        assert_eq!(record.get("oil_temperature"), Some(&Value::Double(41.5)));
        assert_eq!(record.get("wind_direction"), Some(&Value::from("")));
    }

    #[test]
    fn test_no_targeted_column_left_empty() {
        let normalizer = SchemaNormalizer::new(&turbine_defaults(), &turbine_schema()).unwrap();
        let mut records = vec![
            Record::new(),
            Record::new().with("turbine_type", ""),
            Record::new().with("oil_temperature", Value::Null),
        ];

        for record in &mut records {
            normalizer.normalize(record);
        }

        for record in &records {
            for column in normalizer.columns() {
                assert!(
                    !record.get(column).is_none_or(Value::is_empty),
                    "column {column} still empty in {record:?}"
                );
            }
        }
    }

    #[test]
    fn test_rejects_mistyped_default() {
        let defaults = BTreeMap::from([(
            "oil_temperature".to_owned(),
            DefaultValue::Text("warm".to_owned()),
        )]);
        let result = SchemaNormalizer::new(&defaults, &turbine_schema());
        assert!(matches!(result, Err(GearboxError::Config(_))));
    }

    #[test]
    fn test_rejects_undeclared_column() {
        let defaults = BTreeMap::from([("rotor".to_owned(), DefaultValue::Number(1.0))]);
        assert!(SchemaNormalizer::new(&defaults, &turbine_schema()).is_err());
    }

    #[test]
    fn test_default_value_from_json() {
        let parsed: BTreeMap<String, DefaultValue> =
            serde_json::from_str(r#"{"turbine_type": "HAWT", "oil_temperature": 37.0}"#).unwrap();
        assert_eq!(parsed, turbine_defaults());
    }
}
