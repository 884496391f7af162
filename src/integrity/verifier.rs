//! Integrity receipt verification logic.
//!
//! Verification re-reads every member listed in a receipt, recomputes its
//! hash and compares. For datasets it also checks that the directory holds
//! no part files the receipt does not know about and that the completion
//! marker is present.

use super::hasher::{combine_hashes, hash_bytes};
use super::receipt::{ArtifactKind, IntegrityReceipt, load_receipt};
use crate::dataset::writer::{SUCCESS_MARKER, is_complete};
use crate::error::Result;
use crate::storage::ObjectStore;
use serde::Serialize;

/// Result of an integrity verification check.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub passed: bool,

    /// Human-readable message describing the result
    pub message: String,

    /// Location of the verified artifact
    pub location: String,

    /// Expected combined hash from the receipt
    pub expected_hash: String,

    /// Combined hash recomputed from storage, if every member was readable
    pub actual_hash: Option<String>,

    /// One line per problem found
    pub problems: Vec<String>,

    pub receipt: IntegrityReceipt,
}

impl VerificationResult {
    /// Format verification result for CLI display.
    pub fn format_cli(&self) -> String {
        let short = self.expected_hash.get(..16).unwrap_or(&self.expected_hash);
        if self.passed {
            let mut output = format!(
                "✓ PASS: {}\n  \
                Artifact: {} ({:?})\n  \
                Hash: {} ({})\n  \
                Files: {}, Bytes: {}\n  ",
                self.message,
                self.location,
                self.receipt.artifact.kind,
                short,
                self.receipt.integrity.hash_algorithm,
                self.receipt.artifact.files.len(),
                self.receipt.total_bytes(),
            );
            if let Some(rows) = self.receipt.artifact.row_count {
                output.push_str(&format!("Rows: {rows}\n  "));
            }
            output.push_str(&format!(
                "Created: {}",
                self.receipt.created_utc.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            output
        } else {
            let mut output = format!(
                "✗ FAIL: {}\n  \
                Artifact: {}\n  \
                Expected: {}\n  ",
                self.message, self.location, self.expected_hash
            );
            if let Some(actual) = &self.actual_hash {
                output.push_str(&format!("Actual:   {actual}\n  "));
            }
            for problem in &self.problems {
                output.push_str(&format!("- {problem}\n  "));
            }
            output.push_str("Artifact may have been modified or corrupted");
            output
        }
    }
}

/// Verify the artifact described by the receipt stored at `receipt_key`.
///
/// # Errors
///
/// Returns error only if the receipt itself cannot be read or parsed; problems
/// with the artifact are reported in the result.
pub fn verify_receipt(store: &dyn ObjectStore, receipt_key: &str) -> Result<VerificationResult> {
    let receipt = load_receipt(store, receipt_key)?;
    Ok(verify_against(store, receipt))
}

/// Verify an already loaded receipt.
pub fn verify_against(store: &dyn ObjectStore, receipt: IntegrityReceipt) -> VerificationResult {
    let mut problems = Vec::new();
    let mut recomputed = Vec::with_capacity(receipt.artifact.files.len());

    for file in &receipt.artifact.files {
        match store.get(&file.key) {
            Ok(bytes) => {
                let hash = hash_bytes(&bytes);
                if hash != file.hash {
                    problems.push(format!("{}: hash mismatch", file.key));
                } else if bytes.len() as u64 != file.size_bytes {
                    problems.push(format!("{}: size changed", file.key));
                }
                recomputed.push((file.key.as_str(), hash));
            }
            Err(e) => problems.push(format!("{}: not found ({e})", file.key)),
        }
    }

    if receipt.artifact.kind == ArtifactKind::Dataset {
        check_dataset_members(store, &receipt, &mut problems);
    }

    let actual_hash = (recomputed.len() == receipt.artifact.files.len())
        .then(|| combine_hashes(recomputed.iter().map(|(k, h)| (*k, h.as_str()))));
    if actual_hash
        .as_ref()
        .is_some_and(|h| *h != receipt.integrity.hash)
        && problems.is_empty()
    {
        problems.push("combined hash mismatch".to_owned());
    }

    let passed = problems.is_empty();
    let message = if passed {
        "Artifact integrity verified successfully".to_owned()
    } else if problems.iter().any(|p| p.contains("hash mismatch")) {
        "Hash mismatch detected".to_owned()
    } else {
        format!("{} problem(s) found", problems.len())
    };

    VerificationResult {
        passed,
        message,
        location: store.describe(&receipt.artifact.key),
        expected_hash: receipt.integrity.hash.clone(),
        actual_hash,
        problems,
        receipt,
    }
}

fn check_dataset_members(
    store: &dyn ObjectStore,
    receipt: &IntegrityReceipt,
    problems: &mut Vec<String>,
) {
    let key = &receipt.artifact.key;
    match is_complete(store, key) {
        Ok(true) => {}
        Ok(false) => problems.push(format!("{key}: {SUCCESS_MARKER} marker missing")),
        Err(e) => problems.push(format!("{key}: cannot list ({e})")),
    }

    if let Ok(present) = store.list(key) {
        for object in present {
            let is_marker = object.ends_with(SUCCESS_MARKER);
            let known = receipt.artifact.files.iter().any(|f| f.key == object);
            if !is_marker && !known {
                problems.push(format!("{object}: not covered by the receipt"));
            }
        }
    }
}
