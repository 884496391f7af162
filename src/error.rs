//! Error handling for the gearbox library.
//!
//! The job distinguishes four failure families that callers react to
//! differently:
//!
//! - [`GearboxError::SchemaMismatch`]: a column is missing, unexpected, null
//!   where a value is required, or of the wrong type.
//! - [`GearboxError::Encoding`]: a categorical value was not seen at fit time
//!   and the unseen-value policy is `error`.
//! - [`GearboxError::WriteFailure`]: a dataset could not be persisted.
//! - [`GearboxError::BundleExport`]: the fitted pipeline could not be
//!   serialized or archived.
//!
//! ```
//! use gearbox::error::GearboxError;
//!
//! fn describe(err: &GearboxError) -> &'static str {
//!     match err {
//!         GearboxError::SchemaMismatch(_) => "fix the input table or the job schema",
//!         GearboxError::WriteFailure(_) => "re-run the job",
//!         _ => "see logs",
//!     }
//! }
//! ```
//!
//! The [`ResultExt`] trait adds `.context()` to any result whose error
//! converts into [`GearboxError`]:
//!
//! ```no_run
//! use gearbox::error::{Result, ResultExt as _};
//!
//! fn read_spec() -> Result<String> {
//!     std::fs::read_to_string("job.json").context("Failed to read job spec")
//! }
//! ```

use std::fmt;

/// Main error type for gearbox operations.
#[derive(Debug)]
pub enum GearboxError {
    /// I/O errors outside of dataset/bundle persistence
    Io(std::io::Error),

    /// Missing, unexpected, null or mistyped columns
    SchemaMismatch(String),

    /// Unseen category with no fallback policy
    Encoding(String),

    /// Dataset could not be written to storage
    WriteFailure(String),

    /// Bundle serialization or archiving failed
    BundleExport(String),

    /// Invalid job spec or settings
    Config(String),

    /// Errors raised while reading tables (polars)
    DataProcessing(String),

    /// Generic error with context
    Other(String),
}

impl GearboxError {
    /// Whether the error is a per-record transform failure that lenient mode
    /// may skip over.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::SchemaMismatch(_) | Self::Encoding(_))
    }
}

impl fmt::Display for GearboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::SchemaMismatch(msg) => write!(f, "Schema mismatch: {msg}"),
            Self::Encoding(msg) => write!(f, "Encoding error: {msg}"),
            Self::WriteFailure(msg) => write!(f, "Write failure: {msg}"),
            Self::BundleExport(msg) => write!(f, "Bundle export failure: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for GearboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GearboxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for GearboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for GearboxError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

/// Result type alias for gearbox operations.
pub type Result<T> = std::result::Result<T, GearboxError>;

/// Extension trait to add context to results.
///
/// Context is prepended to the message while the error kind is preserved, so
/// a `WriteFailure` stays a `WriteFailure` after `.context(...)`.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<GearboxError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| prepend(e.into(), &msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| prepend(e.into(), &f()))
    }
}

fn prepend(err: GearboxError, ctx: &str) -> GearboxError {
    match err {
        GearboxError::SchemaMismatch(m) => GearboxError::SchemaMismatch(format!("{ctx}: {m}")),
        GearboxError::Encoding(m) => GearboxError::Encoding(format!("{ctx}: {m}")),
        GearboxError::WriteFailure(m) => GearboxError::WriteFailure(format!("{ctx}: {m}")),
        GearboxError::BundleExport(m) => GearboxError::BundleExport(format!("{ctx}: {m}")),
        GearboxError::Config(m) => GearboxError::Config(format!("{ctx}: {m}")),
        GearboxError::DataProcessing(m) => {
            GearboxError::DataProcessing(format!("{ctx}: {m}"))
        }
        other => GearboxError::Other(format!("{ctx}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GearboxError::SchemaMismatch("column 'rpm_blade' not found".to_owned());
        assert_eq!(
            err.to_string(),
            "Schema mismatch: column 'rpm_blade' not found"
        );
    }

    #[test]
    fn test_record_level_errors() {
        assert!(GearboxError::Encoding("x".to_owned()).is_record_level());
        assert!(GearboxError::SchemaMismatch("x".to_owned()).is_record_level());
        assert!(!GearboxError::WriteFailure("x".to_owned()).is_record_level());
    }

    #[test]
    fn test_result_context_keeps_kind() {
        let result: Result<()> = Err(GearboxError::WriteFailure("disk full".to_owned()));
        let err = result.context("Writing train split").unwrap_err();
        assert!(matches!(err, GearboxError::WriteFailure(_)));
        assert_eq!(
            err.to_string(),
            "Write failure: Writing train split: disk full"
        );
    }

    #[test]
    fn test_polars_context_stays_data_processing() {
        let result: std::result::Result<(), polars::error::PolarsError> = Err(
            polars::error::PolarsError::ComputeError("bad csv row 3".into()),
        );

        let err = result.context("Failed to read CSV").unwrap_err();
        assert!(matches!(err, GearboxError::DataProcessing(_)), "got {err:?}");
        assert!(err.to_string().starts_with("Data processing error: Failed to read CSV: "));
        assert!(err.to_string().contains("bad csv row 3"));
    }

    #[test]
    fn test_io_context_becomes_other() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "job.json",
        ));

        let err = result.context("Failed to read job spec").unwrap_err();
        assert!(err.to_string().contains("Failed to read job spec"));
        assert!(err.to_string().contains("job.json"));
    }
}
