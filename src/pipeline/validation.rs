//! Job specification validation.
//!
//! Checks a job spec against its own declared schema (and optionally against
//! the columns actually present in the input) before any data is touched.
//! Every problem is collected so a user can fix them all in one pass.

use super::spec::{JobSpec, SPEC_VERSION};
use crate::bundle::is_safe_stage_name;
use crate::error::Result;
use crate::record::ColumnType;
use std::collections::HashSet;

/// Validation error with the offending spec field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a job spec.
///
/// `input_columns`, when given, are the column names of the input table and
/// are checked against the declared schema.
pub fn validate_job(spec: &JobSpec, input_columns: Option<&[String]>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if spec.version != SPEC_VERSION {
        errors.push(ValidationError::new(
            "version",
            format!(
                "Unsupported spec version '{}', expected '{SPEC_VERSION}'",
                spec.version
            ),
        ));
    }
    if spec.name.trim().is_empty() {
        errors.push(ValidationError::new("name", "must not be empty"));
    }
    if spec.source.database.is_empty() || spec.source.table.is_empty() {
        errors.push(ValidationError::new(
            "source",
            "database and table must both be set",
        ));
    }

    validate_schema(spec, input_columns, &mut errors);
    validate_features(spec, &mut errors);
    validate_outputs(spec, &mut errors);

    if !(spec.split_ratio > 0.0 && spec.split_ratio < 1.0) {
        errors.push(ValidationError::new(
            "split_ratio",
            format!("must be strictly between 0 and 1, got {}", spec.split_ratio),
        ));
    }
    if spec.output_shards == 0 {
        errors.push(ValidationError::new("output_shards", "must be at least 1"));
    }

    errors
}

/// Validate and turn any problems into a single `Config` error.
pub fn ensure_valid(spec: &JobSpec, input_columns: Option<&[String]>) -> Result<()> {
    let errors = validate_job(spec, input_columns);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(super::spec::invalid_spec(&errors))
    }
}

fn validate_schema(
    spec: &JobSpec,
    input_columns: Option<&[String]>,
    errors: &mut Vec<ValidationError>,
) {
    if spec.schema.columns.is_empty() {
        errors.push(ValidationError::new("schema", "declares no columns"));
    }

    let mut seen = HashSet::new();
    for column in &spec.schema.columns {
        if !seen.insert(column.name.as_str()) {
            errors.push(ValidationError::new(
                "schema",
                format!("column '{}' declared twice", column.name),
            ));
        }
    }

    if let Some(found) = input_columns
        && let Err(e) = spec.schema.check_columns(found.iter().map(String::as_str))
    {
        errors.push(ValidationError::new("schema", e.to_string()));
    }

    for (column, default) in &spec.missing_value_defaults {
        match spec.schema.column_type(column) {
            None => errors.push(ValidationError::new(
                "missing_value_defaults",
                format!("column '{column}' is not declared in the schema"),
            )),
            Some(column_type) => {
                if let Err(e) = default.to_value(column, column_type) {
                    errors.push(ValidationError::new("missing_value_defaults", e.to_string()));
                }
            }
        }
    }
}

fn validate_features(spec: &JobSpec, errors: &mut Vec<ValidationError>) {
    let schema = &spec.schema;

    let mut inputs = HashSet::new();
    let mut outputs = HashSet::new();
    for categorical in &spec.categorical_columns {
        match schema.column_type(&categorical.column) {
            None => errors.push(ValidationError::new(
                "categorical_columns",
                format!("column '{}' is not declared", categorical.column),
            )),
            Some(ColumnType::String) => {}
            Some(other) => errors.push(ValidationError::new(
                "categorical_columns",
                format!(
                    "column '{}' is {other}, only string columns can be indexed",
                    categorical.column
                ),
            )),
        }
        for name in [&categorical.column, &categorical.output] {
            if !is_safe_stage_name(name) {
                errors.push(ValidationError::new(
                    "categorical_columns",
                    format!("'{name}' cannot be used as a bundle stage name"),
                ));
            }
        }
        if !inputs.insert(categorical.column.as_str()) {
            errors.push(ValidationError::new(
                "categorical_columns",
                format!("column '{}' listed twice", categorical.column),
            ));
        }
        if !outputs.insert(categorical.output.as_str()) {
            errors.push(ValidationError::new(
                "categorical_columns",
                format!("output '{}' used twice", categorical.output),
            ));
        }
        if schema.column_type(&categorical.output).is_some() {
            errors.push(ValidationError::new(
                "categorical_columns",
                format!(
                    "output '{}' collides with a declared column",
                    categorical.output
                ),
            ));
        }
    }

    match schema.column_type(&spec.label_column) {
        None => errors.push(ValidationError::new(
            "label_column",
            format!("column '{}' is not declared", spec.label_column),
        )),
        Some(ColumnType::String) => {}
        Some(other) => errors.push(ValidationError::new(
            "label_column",
            format!("column '{}' is {other}, expected string", spec.label_column),
        )),
    }

    if spec.assembler_column_order.is_empty() {
        errors.push(ValidationError::new("assembler_column_order", "is empty"));
    }
    let mut assembled = HashSet::new();
    for column in &spec.assembler_column_order {
        if !assembled.insert(column.as_str()) {
            errors.push(ValidationError::new(
                "assembler_column_order",
                format!("column '{column}' listed twice"),
            ));
        }
        if outputs.contains(column.as_str()) {
            continue;
        }
        match schema.column_type(column) {
            Some(t) if t.is_numeric() => {}
            Some(t) => errors.push(ValidationError::new(
                "assembler_column_order",
                format!("column '{column}' is {t}; encode it first and assemble its output"),
            )),
            None => errors.push(ValidationError::new(
                "assembler_column_order",
                format!("column '{column}' is neither declared nor an encoder output"),
            )),
        }
        if *column == spec.label_column {
            errors.push(ValidationError::new(
                "assembler_column_order",
                "the label column cannot be a feature",
            ));
        }
    }
}

fn validate_outputs(spec: &JobSpec, errors: &mut Vec<ValidationError>) {
    let paths = [
        ("output_paths.train", &spec.output_paths.train),
        ("output_paths.validation", &spec.output_paths.validation),
        ("output_paths.bundle", &spec.output_paths.bundle),
    ];

    for (field, path) in paths {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
        } else if trimmed.split('/').any(|part| part == "..") {
            errors.push(ValidationError::new(field, "must not contain '..'"));
        }
    }

    for (i, (field_a, a)) in paths.iter().enumerate() {
        for (field_b, b) in &paths[i + 1..] {
            let a = a.trim_matches('/');
            let b = b.trim_matches('/');
            if a.is_empty() || b.is_empty() {
                continue;
            }
            if a == b || is_nested(a, b) || is_nested(b, a) {
                errors.push(ValidationError::new(
                    *field_a,
                    format!("overlaps {field_b} ('{a}' vs '{b}')"),
                ));
            }
        }
    }
}

fn is_nested(parent: &str, child: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}
