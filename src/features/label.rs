//! Target label indexing.

use super::indexer::{CategoryIndex, HandleUnseen};
use crate::context::ExecutionContext;
use crate::error::{GearboxError, Result};
use crate::record::Record;

/// Maps the target column's values to integer class codes.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelIndexer {
    pub column: String,
    pub index: CategoryIndex,
    pub handle_unseen: HandleUnseen,
}

impl LabelIndexer {
    pub fn fit(
        ctx: &ExecutionContext,
        records: &[Record],
        column: &str,
        handle_unseen: HandleUnseen,
    ) -> Result<Self> {
        let index = CategoryIndex::fit_column(ctx, records, column)?;
        Ok(Self {
            column: column.to_owned(),
            index,
            handle_unseen,
        })
    }

    /// Class code for a record, `None` when the record should be skipped.
    ///
    /// # Errors
    ///
    /// `Encoding` for an unseen label under [`HandleUnseen::Error`],
    /// `SchemaMismatch` if the label column is not a string.
    pub fn label(&self, record: &Record) -> Result<Option<u32>> {
        let value = record.str_value(&self.column)?;
        self.index
            .lookup(value, self.handle_unseen)
            .map_err(|e| match e {
                GearboxError::Encoding(msg) => {
                    GearboxError::Encoding(format!("label column '{}': {msg}", self.column))
                }
                other => other,
            })
    }

    /// Labels in class-code order.
    pub fn classes(&self) -> &[String] {
        self.index.labels()
    }
}
