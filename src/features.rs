//! Feature engineering stages.
//!
//! Records flow through the stages in a fixed order:
//!
//! ```text
//! raw record
//!   │
//!   ├─> SchemaNormalizer      fill null/empty cells with defaults
//!   ├─> StringIndexer (×n)    category value -> code       (fitted)
//!   ├─> OneHotEncoder (×n)    code -> one-hot vector
//!   ├─> FeatureAssembler      columns -> one feature vector
//!   └─> LabelIndexer          target value -> class code   (fitted)
//! ```
//!
//! Fitting is a barrier: every indexer sees the whole table before any record
//! is transformed, so feature widths are identical for all records.

pub mod assembler;
pub mod fitted;
pub mod indexer;
pub mod label;
pub mod normalizer;
pub mod one_hot;

pub use assembler::{AssemblerInput, FeatureAssembler};
pub use fitted::{CategoricalColumn, FeatureSettings, FittedPipeline, StageKind};
pub use indexer::{CategoryIndex, HandleUnseen, StringIndexer, indexed_column_name};
pub use label::LabelIndexer;
pub use normalizer::{DefaultValue, SchemaNormalizer};
pub use one_hot::OneHotEncoder;
