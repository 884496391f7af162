//! String indexing: categorical values to dense integer codes.

use crate::context::ExecutionContext;
use crate::error::{GearboxError, Result};
use crate::record::Record;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do with a value that was not observed at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandleUnseen {
    /// Fail the record with an encoding error
    Error,

    /// Map to the reserved unknown code `K`
    #[default]
    Keep,

    /// Drop the record
    Skip,
}

impl HandleUnseen {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Keep => "keep",
            Self::Skip => "skip",
        }
    }

    /// Parse the name written into bundles.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "keep" => Some(Self::Keep),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Fitted mapping from category value to code.
///
/// Codes are dense in `[0, K)`, assigned by descending frequency with ties
/// broken by ascending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryIndex {
    labels: Vec<String>,
    codes: HashMap<String, u32>,
    unknown: u32,
}

impl CategoryIndex {
    /// Build an index from observed value counts.
    ///
    /// # Errors
    ///
    /// `Encoding` if no values were observed.
    pub fn from_counts(counts: HashMap<String, u64>) -> Result<Self> {
        if counts.is_empty() {
            return Err(GearboxError::Encoding(
                "cannot fit a category index without any observed values".to_owned(),
            ));
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self::from_labels(ranked.into_iter().map(|(label, _)| label).collect())
    }

    /// Build an index whose codes follow the order of `labels`.
    ///
    /// # Errors
    ///
    /// `Encoding` on duplicate labels.
    pub fn from_labels(labels: Vec<String>) -> Result<Self> {
        let unknown = u32::try_from(labels.len()).map_err(|_| {
            GearboxError::Encoding("too many categories for a 32-bit code".to_owned())
        })?;

        let mut codes = HashMap::with_capacity(labels.len());
        for (code, label) in (0u32..).zip(&labels) {
            if codes.insert(label.clone(), code).is_some() {
                return Err(GearboxError::Encoding(format!(
                    "duplicate category label '{label}'"
                )));
            }
        }
        Ok(Self {
            labels,
            codes,
            unknown,
        })
    }

    /// Count non-empty string values of `column` across all records.
    ///
    /// Counting runs per worker and the partial counts are merged before the
    /// index is built; nothing can be transformed until this returns.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if the column holds non-string values, `Encoding` if
    /// it holds no values at all.
    pub fn fit_column(ctx: &ExecutionContext, records: &[Record], column: &str) -> Result<Self> {
        let counts = ctx.install(|| {
            records
                .par_iter()
                .try_fold(HashMap::new, |mut acc: HashMap<String, u64>, record| {
                    if let Some(value) = record.str_value(column)?
                        && !value.is_empty()
                    {
                        if let Some(n) = acc.get_mut(value) {
                            *n += 1;
                        } else {
                            acc.insert(value.to_owned(), 1);
                        }
                    }
                    Ok::<_, GearboxError>(acc)
                })
                .try_reduce(HashMap::new, |mut merged, part| {
                    #[expect(clippy::iter_over_hash_type)]
                    for (value, n) in part {
                        *merged.entry(value).or_insert(0) += n;
                    }
                    Ok(merged)
                })
        })?;

        Self::from_counts(counts).map_err(|e| match e {
            GearboxError::Encoding(msg) => GearboxError::Encoding(format!("column '{column}': {msg}")),
            other => other,
        })
    }

    /// Number of fitted categories `K`.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in code order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn code(&self, value: &str) -> Option<u32> {
        self.codes.get(value).copied()
    }

    /// Code for `value` under an unseen-value policy.
    ///
    /// Returns `Ok(None)` when the record should be skipped. Null and empty
    /// values are treated as unseen.
    ///
    /// # Errors
    ///
    /// `Encoding` for an unseen value under [`HandleUnseen::Error`].
    pub fn lookup(&self, value: Option<&str>, policy: HandleUnseen) -> Result<Option<u32>> {
        if let Some(code) = value.and_then(|v| self.code(v)) {
            return Ok(Some(code));
        }
        match policy {
            HandleUnseen::Keep => Ok(Some(self.unknown_code())),
            HandleUnseen::Skip => Ok(None),
            HandleUnseen::Error => Err(GearboxError::Encoding(match value {
                Some(v) if !v.is_empty() => format!("unseen category '{v}'"),
                _ => "missing category value".to_owned(),
            })),
        }
    }

    /// Reserved code for unseen values, equal to `K`.
    pub fn unknown_code(&self) -> u32 {
        self.unknown
    }
}

/// Fitted indexer for one categorical column.
#[derive(Debug, Clone, PartialEq)]
pub struct StringIndexer {
    pub input: String,
    pub output: String,
    pub index: CategoryIndex,
    pub handle_unseen: HandleUnseen,
}

impl StringIndexer {
    pub fn fit(
        ctx: &ExecutionContext,
        records: &[Record],
        input: &str,
        handle_unseen: HandleUnseen,
    ) -> Result<Self> {
        let index = CategoryIndex::fit_column(ctx, records, input)?;
        tracing::debug!(column = input, categories = index.len(), "fitted string indexer");
        Ok(Self {
            input: input.to_owned(),
            output: indexed_column_name(input),
            index,
            handle_unseen,
        })
    }

    /// Number of distinct output codes, counting the unknown code under `keep`.
    pub fn category_size(&self) -> usize {
        match self.handle_unseen {
            HandleUnseen::Keep => self.index.len() + 1,
            HandleUnseen::Error | HandleUnseen::Skip => self.index.len(),
        }
    }

    /// Write the code for the input column into the output column.
    ///
    /// Returns `Ok(false)` if the record should be dropped.
    pub fn apply(&self, record: &mut Record) -> Result<bool> {
        let value = record.str_value(&self.input)?;
        let code = self
            .index
            .lookup(value, self.handle_unseen)
            .map_err(|e| match e {
                GearboxError::Encoding(msg) => {
                    GearboxError::Encoding(format!("column '{}': {msg}", self.input))
                }
                other => other,
            })?;

        match code {
            Some(code) => {
                record.set(self.output.clone(), f64::from(code));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Name of the index column produced for a categorical input.
pub fn indexed_column_name(input: &str) -> String {
    format!("indexed_{input}")
}
