//! The fitted feature pipeline: indexers, one-hot encoders and the assembler.

use super::assembler::{AssemblerInput, FeatureAssembler};
use super::indexer::{HandleUnseen, StringIndexer};
use super::one_hot::OneHotEncoder;
use crate::context::ExecutionContext;
use crate::error::{GearboxError, Result};
use crate::record::Record;
use serde::{Deserialize, Serialize};

/// A categorical input column and the name of its one-hot output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub column: String,
    pub output: String,
}

impl CategoricalColumn {
    pub fn new(column: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            output: output.into(),
        }
    }
}

/// Everything needed to fit a [`FittedPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSettings {
    pub categorical: Vec<CategoricalColumn>,
    pub assembler_order: Vec<String>,
    pub drop_last: bool,
    pub handle_unseen: HandleUnseen,
}

/// Stage kinds, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    StringIndexer,
    OneHotEncoder,
    VectorAssembler,
}

/// Fitted transformation from a normalized record to a feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPipeline {
    pub indexers: Vec<StringIndexer>,
    pub encoders: Vec<OneHotEncoder>,
    pub assembler: FeatureAssembler,
}

impl FittedPipeline {
    /// Fit every indexer on `records` and derive encoder and assembler widths.
    ///
    /// # Errors
    ///
    /// Any indexer fit failure, or `Config` when an assembler input is listed
    /// twice.
    pub fn fit(
        ctx: &ExecutionContext,
        records: &[Record],
        settings: &FeatureSettings,
    ) -> Result<Self> {
        let indexers = settings
            .categorical
            .iter()
            .map(|c| StringIndexer::fit(ctx, records, &c.column, settings.handle_unseen))
            .collect::<Result<Vec<_>>>()?;

        let encoders: Vec<OneHotEncoder> = indexers
            .iter()
            .zip(&settings.categorical)
            .map(|(indexer, c)| {
                OneHotEncoder::new(
                    indexer.output.clone(),
                    c.output.clone(),
                    indexer.category_size(),
                    settings.drop_last,
                )
            })
            .collect();

        let mut inputs = Vec::with_capacity(settings.assembler_order.len());
        for column in &settings.assembler_order {
            if inputs.iter().any(|i: &AssemblerInput| &i.column == column) {
                return Err(GearboxError::Config(format!(
                    "assembler column '{column}' listed twice"
                )));
            }
            let width = encoders
                .iter()
                .find(|e| &e.output == column)
                .map_or(1, OneHotEncoder::width);
            inputs.push(AssemblerInput {
                column: column.clone(),
                width,
            });
        }

        Ok(Self {
            indexers,
            encoders,
            assembler: FeatureAssembler::new(inputs),
        })
    }

    /// Width of every feature vector this pipeline produces.
    pub fn feature_width(&self) -> usize {
        self.assembler.width()
    }

    /// Transform one record in place and assemble its features.
    ///
    /// Returns `Ok(None)` when an indexer decided to skip the record.
    pub fn transform(&self, record: &mut Record) -> Result<Option<Vec<f64>>> {
        for indexer in &self.indexers {
            if !indexer.apply(record)? {
                return Ok(None);
            }
        }
        for encoder in &self.encoders {
            encoder.apply(record)?;
        }
        self.assembler.assemble(record).map(Some)
    }

    /// Stage names and kinds in execution order.
    pub fn stages(&self) -> Vec<(String, StageKind)> {
        let indexers = self
            .indexers
            .iter()
            .map(|i| (format!("string_indexer_{}", i.input), StageKind::StringIndexer));
        let encoders = self
            .encoders
            .iter()
            .map(|e| (format!("one_hot_encoder_{}", e.output), StageKind::OneHotEncoder));

        indexers
            .chain(encoders)
            .chain(std::iter::once((
                "vector_assembler".to_owned(),
                StageKind::VectorAssembler,
            )))
            .collect()
    }
}
