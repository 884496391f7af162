//! Typed records and table schemas.
//!
//! A [`Record`] is one row of a sensor table. Raw tables only carry string,
//! double and float columns; the feature stages add index columns (doubles)
//! and vector columns (one-hot blocks).

use crate::error::{GearboxError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Declared type of a raw table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Double,
    Float,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Double | Self::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Double => "double",
            Self::Float => "float",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Str(String),
    Double(f64),
    Float(f32),
    Vector(Vec<f64>),
}

impl Value {
    /// Null or the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric scalar widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Whether this value can live in a column of the given raw type.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Self::Null, _)
                | (Self::Str(_), ColumnType::String)
                | (Self::Double(_), ColumnType::Double)
                | (Self::Float(_), ColumnType::Float)
        )
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Str(_) => "string",
            Self::Double(_) => "double",
            Self::Float(_) => "float",
            Self::Vector(_) => "vector",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One row: column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// String value of a column, `None` when absent or null.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if the column holds a non-string value.
    pub fn str_value(&self, column: &str) -> Result<Option<&str>> {
        match self.values.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(other) => Err(GearboxError::SchemaMismatch(format!(
                "column '{column}' holds a {} value, expected string",
                other.kind()
            ))),
        }
    }
}

/// Declared column in a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// How strictly an input table must match the declared schema.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMatchMode {
    /// Declared columns must exist, extra columns are ignored
    #[default]
    Tolerant,

    /// Declared columns only, no extras
    Strict,
}

/// Ordered, typed description of a raw table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,

    #[serde(default)]
    pub match_mode: SchemaMatchMode,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            match_mode: SchemaMatchMode::Tolerant,
        }
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Check the column names of an incoming table against this schema.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` listing every missing column, and in strict mode every
    /// unexpected one.
    pub fn check_columns<'a>(&self, found: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let found: HashSet<&str> = found.into_iter().collect();
        let declared: HashSet<&str> = self.names().collect();

        let mut problems = Vec::new();

        let missing: Vec<&str> = self.names().filter(|n| !found.contains(n)).collect();
        if !missing.is_empty() {
            problems.push(format!("missing columns {missing:?}"));
        }

        if self.match_mode == SchemaMatchMode::Strict {
            let mut extra: Vec<&str> = found.difference(&declared).copied().collect();
            extra.sort_unstable();
            if !extra.is_empty() {
                problems.push(format!("unexpected columns {extra:?}"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(GearboxError::SchemaMismatch(problems.join("; ")))
        }
    }

    /// Check one record's values against the declared types.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` on the first absent or mistyped column.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        for column in &self.columns {
            match record.get(&column.name) {
                None => {
                    return Err(GearboxError::SchemaMismatch(format!(
                        "column '{}' is absent from the record",
                        column.name
                    )));
                }
                Some(value) if !value.fits(column.column_type) => {
                    return Err(GearboxError::SchemaMismatch(format!(
                        "column '{}' declared {} but holds a {} value",
                        column.name,
                        column.column_type,
                        value.kind()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("turbine_id", ColumnType::String),
            ColumnDef::new("oil_temperature", ColumnType::Double),
        ])
    }

    #[test]
    fn test_value_is_empty() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(!Value::from("N").is_empty());
        assert!(!Value::Double(0.0).is_empty());
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<f64>), Value::Null);
        assert_eq!(Value::from(Some(2.5_f64)), Value::Double(2.5));
    }

    #[test]
    fn test_str_value_rejects_numbers() {
        let record = Record::new().with("oil_temperature", 37.0);
        assert!(record.str_value("oil_temperature").is_err());
        assert_eq!(record.str_value("missing").unwrap(), None);
    }

    #[test]
    fn test_check_columns_tolerant_allows_extras() {
        let result = schema().check_columns(["turbine_id", "oil_temperature", "extra"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_check_columns_strict_rejects_extras() {
        let mut schema = schema();
        schema.match_mode = SchemaMatchMode::Strict;

        let err = schema
            .check_columns(["turbine_id", "oil_temperature", "extra"])
            .unwrap_err();
        assert!(err.to_string().contains("extra"), "got: {err}");
    }

    #[test]
    fn test_check_columns_reports_all_missing() {
        let err = schema().check_columns(["other"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("turbine_id") && msg.contains("oil_temperature"));
    }

    #[test]
    fn test_check_record_types() {
        let ok = Record::new()
            .with("turbine_id", "T1")
            .with("oil_temperature", Value::Null);
        assert!(schema().check_record(&ok).is_ok());

        let bad = Record::new()
            .with("turbine_id", 1.0)
            .with("oil_temperature", 3.0);
        assert!(matches!(
            schema().check_record(&bad),
            Err(GearboxError::SchemaMismatch(_))
        ));
    }
}
