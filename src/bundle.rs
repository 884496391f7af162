//! Portable bundle for the fitted feature pipeline.
//!
//! A bundle is a tar+gzip archive with this layout:
//!
//! ```text
//! bundle.json                      uid, name, format, version, timestamp
//! root/model.json                  {"op": "pipeline", "attributes": {"nodes": ...}}
//! root/node.json                   pipeline node, empty shape
//! root/<stage>.node/model.json     stage op and fitted attributes
//! root/<stage>.node/node.json      stage input and output columns
//! ```
//!
//! Stages appear in execution order: string indexers, one-hot encoders, then
//! the vector assembler. The label indexer is not part of a bundle.

pub mod archive;
pub mod model;

use crate::context::ExecutionContext;
use crate::error::{GearboxError, Result};
use crate::features::{
    AssemblerInput, CategoryIndex, FeatureAssembler, FittedPipeline, HandleUnseen, OneHotEncoder,
    StageKind, StringIndexer,
};
use chrono::{DateTime, Utc};
use model::{Attribute, BundleInfo, ModelDoc, NodeDoc, malformed};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use archive::Entries;

pub const BUNDLE_FORMAT: &str = "json";
pub const BUNDLE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FEATURES_COLUMN: &str = "features";

const OP_PIPELINE: &str = "pipeline";
const OP_STRING_INDEXER: &str = "string_indexer";
const OP_ONE_HOT: &str = "one_hot_encoder";
const OP_ASSEMBLER: &str = "vector_assembler";

/// A bundle read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBundle {
    pub info: BundleInfo,
    pub pipeline: FittedPipeline,
}

/// Result of writing a bundle to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub key: String,
    pub location: String,
    pub uid: String,
    pub bytes: u64,
}

/// Whether `name` can become a `root/<name>.node/` directory: non-empty, no
/// path separators or control characters, and not `.` or `..`.
pub fn is_safe_stage_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Serialize `pipeline` into bundle archive bytes.
///
/// # Errors
///
/// `BundleExport` if any document fails to serialize or the archive cannot
/// be built.
pub fn build_bundle(
    pipeline: &FittedPipeline,
    name: &str,
    timestamp: DateTime<Utc>,
) -> Result<(BundleInfo, Vec<u8>)> {
    let info = BundleInfo {
        uid: uuid::Uuid::new_v4().to_string(),
        name: name.to_owned(),
        format: BUNDLE_FORMAT.to_owned(),
        version: BUNDLE_VERSION.to_owned(),
        timestamp: timestamp.to_rfc3339(),
    };

    let stages = pipeline.stages();
    let stage_names: Vec<String> = stages.iter().map(|(n, _)| n.clone()).collect();
    if let Some(bad) = stage_names.iter().find(|n| !is_safe_stage_name(n)) {
        return Err(GearboxError::BundleExport(format!(
            "stage name '{bad}' cannot be used as an archive directory"
        )));
    }

    let mut files = vec![
        ("bundle.json".to_owned(), to_json(&info)?),
        (
            "root/model.json".to_owned(),
            to_json(
                &ModelDoc::new(OP_PIPELINE).with("nodes", Attribute::string_list(&stage_names)),
            )?,
        ),
        ("root/node.json".to_owned(), to_json(&NodeDoc::bare(name))?),
    ];

    let indexer_docs = pipeline.indexers.iter().map(|i| {
        let model = ModelDoc::new(OP_STRING_INDEXER)
            .with("labels", Attribute::string_list(i.index.labels()))
            .with("handle_invalid", Attribute::string(i.handle_unseen.as_str()));
        (model, NodeDoc::new("", &[i.input.as_str()], &i.output))
    });
    let encoder_docs = pipeline.encoders.iter().map(|e| {
        let handle_unseen = pipeline
            .indexers
            .iter()
            .find(|i| i.output == e.input)
            .map_or(HandleUnseen::default(), |i| i.handle_unseen);
        let model = ModelDoc::new(OP_ONE_HOT)
            .with("category_sizes", Attribute::long_list(&[e.category_size]))
            .with("drop_last", Attribute::boolean(e.drop_last))
            .with("handle_invalid", Attribute::string(handle_unseen.as_str()));
        (model, NodeDoc::new("", &[e.input.as_str()], &e.output))
    });
    let assembler_doc = {
        let inputs = pipeline.assembler.inputs();
        let names: Vec<String> = inputs.iter().map(|i| i.column.clone()).collect();
        let widths: Vec<usize> = inputs.iter().map(|i| i.width).collect();
        let model = ModelDoc::new(OP_ASSEMBLER)
            .with("input_names", Attribute::string_list(&names))
            .with("input_widths", Attribute::long_list(&widths));
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        (model, NodeDoc::new("", &refs, FEATURES_COLUMN))
    };

    let docs = indexer_docs
        .chain(encoder_docs)
        .chain(std::iter::once(assembler_doc));
    for ((stage, _), (model, mut node)) in stages.iter().zip(docs) {
        node.name.clone_from(stage);
        files.push((format!("root/{stage}.node/model.json"), to_json(&model)?));
        files.push((format!("root/{stage}.node/node.json"), to_json(&node)?));
    }

    let mtime = u64::try_from(timestamp.timestamp()).unwrap_or(0);
    let bytes = archive::pack(&files, mtime)?;
    Ok((info, bytes))
}

/// Build a bundle for `pipeline` and store it under `key`.
pub fn export_bundle(
    ctx: &ExecutionContext,
    pipeline: &FittedPipeline,
    name: &str,
    key: &str,
) -> Result<ExportReport> {
    tracing::info!("Exporting pipeline bundle '{name}'");
    let (info, bytes) = build_bundle(pipeline, name, ctx.started_utc())?;

    let store = ctx.store();
    store.put(key, &bytes).map_err(|e| match e {
        GearboxError::BundleExport(_) => e,
        other => GearboxError::BundleExport(format!("cannot store bundle at {key}: {other}")),
    })?;

    let report = ExportReport {
        key: key.to_owned(),
        location: store.describe(key),
        uid: info.uid,
        bytes: bytes.len() as u64,
    };
    tracing::info!(
        "Bundle written to {} ({} bytes, uid {})",
        report.location,
        report.bytes,
        report.uid
    );
    Ok(report)
}

/// Reconstruct a fitted pipeline from bundle archive bytes.
///
/// # Errors
///
/// `BundleExport` if the archive is unreadable or a document is missing or
/// malformed.
pub fn load_bundle(bytes: &[u8]) -> Result<LoadedBundle> {
    let entries = archive::unpack(bytes)?;
    let info: BundleInfo = from_entry(&entries, "bundle.json")?;
    if info.format != BUNDLE_FORMAT {
        return Err(malformed(format!("unsupported format '{}'", info.format)));
    }

    let root: ModelDoc = from_entry(&entries, "root/model.json")?;
    if root.op != OP_PIPELINE {
        return Err(malformed(format!("root op is '{}', expected pipeline", root.op)));
    }

    let mut indexers = Vec::new();
    let mut encoders = Vec::new();
    let mut assembler = None;

    for stage in root.get_string_list("nodes")? {
        let model: ModelDoc = from_entry(&entries, &format!("root/{stage}.node/model.json"))?;
        let node: NodeDoc = from_entry(&entries, &format!("root/{stage}.node/node.json"))?;

        match stage_kind(&model.op)? {
            StageKind::StringIndexer => {
                indexers.push(StringIndexer {
                    input: node.input()?.to_owned(),
                    output: node.output()?.to_owned(),
                    index: CategoryIndex::from_labels(model.get_string_list("labels")?)
                        .map_err(|e| malformed(format!("stage {stage}: {e}")))?,
                    handle_unseen: parse_handle_unseen(model.get_str("handle_invalid")?)?,
                });
            }
            StageKind::OneHotEncoder => {
                let sizes = model.get_long_list("category_sizes")?;
                let [category_size] = sizes[..] else {
                    return Err(malformed(format!(
                        "stage {stage} has {} category sizes, expected 1",
                        sizes.len()
                    )));
                };
                encoders.push(OneHotEncoder::new(
                    node.input()?,
                    node.output()?,
                    category_size,
                    model.get_bool("drop_last")?,
                ));
            }
            StageKind::VectorAssembler => {
                let names = model.get_string_list("input_names")?;
                let widths = model.get_long_list("input_widths")?;
                if names.len() != widths.len() {
                    return Err(malformed(format!(
                        "stage {stage} lists {} inputs but {} widths",
                        names.len(),
                        widths.len()
                    )));
                }
                let inputs = names
                    .into_iter()
                    .zip(widths)
                    .map(|(column, width)| AssemblerInput { column, width })
                    .collect();
                assembler = Some(FeatureAssembler::new(inputs));
            }
        }
    }

    let assembler = assembler.ok_or_else(|| malformed("no vector assembler stage".to_owned()))?;
    Ok(LoadedBundle {
        info,
        pipeline: FittedPipeline {
            indexers,
            encoders,
            assembler,
        },
    })
}

/// Read and load the bundle stored under `key`.
pub fn read_bundle(ctx: &ExecutionContext, key: &str) -> Result<LoadedBundle> {
    let bytes = ctx.store().get(key)?;
    load_bundle(&bytes)
}

fn stage_kind(op: &str) -> Result<StageKind> {
    match op {
        OP_STRING_INDEXER => Ok(StageKind::StringIndexer),
        OP_ONE_HOT => Ok(StageKind::OneHotEncoder),
        OP_ASSEMBLER => Ok(StageKind::VectorAssembler),
        other => Err(malformed(format!("unknown op '{other}'"))),
    }
}

fn parse_handle_unseen(value: &str) -> Result<HandleUnseen> {
    HandleUnseen::parse(value)
        .ok_or_else(|| malformed(format!("unknown handle_invalid policy '{value}'")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| GearboxError::BundleExport(format!("cannot serialize bundle document: {e}")))
}

fn from_entry<T: DeserializeOwned>(entries: &Entries, path: &str) -> Result<T> {
    let bytes = entries
        .get(path)
        .ok_or_else(|| malformed(format!("missing entry {path}")))?;
    serde_json::from_slice(bytes).map_err(|e| malformed(format!("{path}: {e}")))
}
