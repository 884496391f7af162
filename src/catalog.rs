//! Table resolution and ingestion.
//!
//! A [`Catalog`] turns a `(database, table)` pair into a [`RecordSource`].
//! [`DirectoryCatalog`] looks tables up on disk:
//!
//! ```text
//! <root>/<database>/<table>.csv
//! <root>/<database>/<table>.parquet
//! <root>/<database>/<table>.json
//! ```
//!
//! Sources read their rows with polars and convert them to [`Record`]s using
//! the declared [`TableSchema`]. Columns outside the schema are not loaded.

use crate::error::{GearboxError, Result, ResultExt as _};
use crate::record::{ColumnType, Record, TableSchema, Value};
use polars::prelude::*;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 3] = ["csv", "parquet", "json"];

/// Something that yields the rows of one table.
pub trait RecordSource: Send + Sync {
    /// Human-readable name for logs.
    fn describe(&self) -> String;

    /// Column names present in the table.
    fn columns(&self) -> Result<Vec<String>>;

    /// Read every row, checked and typed against `schema`.
    fn read(&self, schema: &TableSchema) -> Result<Vec<Record>>;
}

pub trait Catalog: Send + Sync {
    fn resolve(&self, database: &str, table: &str) -> Result<Box<dyn RecordSource>>;
}

/// Catalog backed by a directory of table files.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the first existing file for `database.table`.
    pub fn locate(&self, database: &str, table: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.root.join(database).join(format!("{table}.{ext}")))
            .find(|p| p.is_file())
    }
}

impl Catalog for DirectoryCatalog {
    fn resolve(&self, database: &str, table: &str) -> Result<Box<dyn RecordSource>> {
        let path = self.locate(database, table).ok_or_else(|| {
            GearboxError::Config(format!(
                "table {database}.{table} not found under {} (looked for .csv, .parquet, .json)",
                self.root.display()
            ))
        })?;
        tracing::debug!("Resolved {database}.{table} to {}", path.display());
        Ok(Box::new(FileTable::open(path)?))
    }
}

/// One table file on disk.
#[derive(Debug, Clone)]
pub struct FileTable {
    path: PathBuf,
}

impl FileTable {
    /// # Errors
    ///
    /// `Config` if the extension is not csv, parquet or json.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ext = extension(&path);
        if !EXTENSIONS.contains(&ext.as_str()) {
            return Err(GearboxError::Config(format!(
                "unsupported table file {} (expected .csv, .parquet or .json)",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<DataFrame> {
        let path = &self.path;
        let df = match extension(path).as_str() {
            "csv" => LazyCsvReader::new(path)
                .with_infer_schema_length(Some(10000))
                .with_has_header(true)
                .finish()?
                .collect()
                .context("Failed to read CSV")?,
            "parquet" => ParquetReader::new(std::fs::File::open(path)?)
                .finish()
                .context("Failed to read Parquet")?,
            _ => JsonReader::new(std::fs::File::open(path)?)
                .finish()
                .context("Failed to read JSON")?,
        };
        Ok(df)
    }
}

impl RecordSource for FileTable {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn columns(&self) -> Result<Vec<String>> {
        let df = self.load()?;
        Ok(df
            .get_column_names()
            .iter()
            .map(|n| n.as_str().to_owned())
            .collect())
    }

    fn read(&self, schema: &TableSchema) -> Result<Vec<Record>> {
        let df = self
            .load()
            .with_context(|| format!("Failed to load {}", self.path.display()))?;
        tracing::info!(
            "Loaded {} rows x {} columns from {}",
            df.height(),
            df.width(),
            self.path.display()
        );
        dataframe_to_records(&df, schema)
    }
}

/// Rows held in memory, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    name: String,
    records: Vec<Record>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

impl RecordSource for MemoryTable {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn columns(&self) -> Result<Vec<String>> {
        let mut columns: Vec<String> = self
            .records
            .iter()
            .flat_map(Record::columns)
            .map(str::to_owned)
            .collect();
        columns.sort_unstable();
        columns.dedup();
        Ok(columns)
    }

    fn read(&self, schema: &TableSchema) -> Result<Vec<Record>> {
        schema.check_columns(self.columns()?.iter().map(String::as_str))?;
        Ok(self.records.clone())
    }
}

/// Convert a frame to records, casting each declared column to its type.
///
/// # Errors
///
/// `SchemaMismatch` if a declared column is missing (or, in strict mode, an
/// undeclared one is present), or if a numeric column holds values that do
/// not parse as numbers.
pub fn dataframe_to_records(df: &DataFrame, schema: &TableSchema) -> Result<Vec<Record>> {
    schema.check_columns(df.get_column_names().iter().map(|n| n.as_str()))?;

    let mut records = vec![Record::new(); df.height()];
    for def in &schema.columns {
        let values = column_values(df, &def.name, def.column_type)?;
        for (record, value) in records.iter_mut().zip(values) {
            record.set(def.name.clone(), value);
        }
    }
    Ok(records)
}

fn column_values(df: &DataFrame, name: &str, column_type: ColumnType) -> Result<Vec<Value>> {
    let series = df.column(name)?.as_materialized_series();
    let mismatch = |e: PolarsError| {
        GearboxError::SchemaMismatch(format!(
            "column '{name}' declared {column_type} but holds {} values ({e})",
            series.dtype()
        ))
    };

    let values = match column_type {
        ColumnType::String => {
            let cast = series.cast(&DataType::String).map_err(mismatch)?;
            cast.str()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::from))
                .collect()
        }
        ColumnType::Double => {
            let cast = series.strict_cast(&DataType::Float64).map_err(mismatch)?;
            cast.f64()?.into_iter().map(Value::from).collect()
        }
        ColumnType::Float => {
            let cast = series.strict_cast(&DataType::Float32).map_err(mismatch)?;
            cast.f32()?.into_iter().map(Value::from).collect()
        }
    };
    Ok(values)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ColumnDef, SchemaMatchMode};
    use std::fs;
    use tempfile::TempDir;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("turbine_id", ColumnType::String),
            ColumnDef::new("turbine_type", ColumnType::String),
            ColumnDef::new("oil_temperature", ColumnType::Double),
            ColumnDef::new("humidity", ColumnType::Float),
        ])
    }

    fn write_table(dir: &Path, database: &str, table: &str, body: &str) -> PathBuf {
        let path = dir.join(database).join(format!("{table}.csv"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    const CSV: &str = "turbine_id,turbine_type,oil_temperature,humidity,extra\n\
                       T1,HAWT,35.5,60.0,x\n\
                       T2,,,61.5,y\n";

    #[test]
    fn test_directory_catalog_reads_csv() {
        let dir = TempDir::new().unwrap();
        write_table(dir.path(), "endtoendml", "windturbine", CSV);

        let catalog = DirectoryCatalog::new(dir.path());
        let source = catalog.resolve("endtoendml", "windturbine").unwrap();
        let records = source.read(&schema()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("turbine_type"), Some(&Value::from("HAWT")));
        assert_eq!(records[0].get("oil_temperature"), Some(&Value::Double(35.5)));
        assert_eq!(records[1].get("humidity"), Some(&Value::Float(61.5)));
        assert!(records[1].get("oil_temperature").is_some_and(Value::is_empty));
        assert!(!records[0].contains("extra"), "undeclared columns are not loaded");
    }

    #[test]
    fn test_columns_lists_file_header() {
        let dir = TempDir::new().unwrap();
        let path = write_table(dir.path(), "db", "t", CSV);
        let columns = FileTable::open(path).unwrap().columns().unwrap();
        assert_eq!(
            columns,
            vec!["turbine_id", "turbine_type", "oil_temperature", "humidity", "extra"]
        );
    }

    #[test]
    fn test_missing_table() {
        let dir = TempDir::new().unwrap();
        let catalog = DirectoryCatalog::new(dir.path());
        assert!(matches!(
            catalog.resolve("db", "nope"),
            Err(GearboxError::Config(_))
        ));
    }

    #[test]
    fn test_strict_schema_rejects_extra_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_table(dir.path(), "db", "t", CSV);

        let mut strict = schema();
        strict.match_mode = SchemaMatchMode::Strict;
        let err = FileTable::open(path).unwrap().read(&strict).unwrap_err();
        assert!(matches!(err, GearboxError::SchemaMismatch(_)), "got {err}");
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_non_numeric_values_in_numeric_column() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            dir.path(),
            "db",
            "t",
            "turbine_id,turbine_type,oil_temperature,humidity\nT1,HAWT,hot,60.0\n",
        );
        let err = FileTable::open(path).unwrap().read(&schema()).unwrap_err();
        assert!(matches!(err, GearboxError::SchemaMismatch(_)), "got {err}");
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(FileTable::open("table.xlsx").is_err());
    }

    #[test]
    fn test_memory_table_checks_columns() {
        let table = MemoryTable::new(
            "t",
            vec![Record::new().with("turbine_id", "T1").with("turbine_type", "HAWT")],
        );
        assert!(table.read(&schema()).is_err());
    }
}
