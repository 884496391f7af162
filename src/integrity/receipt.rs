//! Integrity receipt data structures and creation logic.

use super::hasher::{HASH_ALGORITHM, combine_hashes, hash_bytes};
use crate::error::{Result, ResultExt as _};
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current receipt schema version.
///
/// Increment this when making breaking changes to the receipt format.
pub const RECEIPT_VERSION: u32 = 1;

/// Suffix appended to an artifact key to form its receipt key.
pub const RECEIPT_SUFFIX: &str = ".receipt.json";

/// Integrity receipt for one written artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReceipt {
    /// Schema version for forward compatibility
    pub receipt_version: u32,

    /// UTC timestamp when receipt was created
    pub created_utc: DateTime<Utc>,

    /// Information about the application that produced the artifact
    pub producer: ProducerInfo,

    pub artifact: ArtifactInfo,

    /// Digest over every member file
    pub integrity: IntegrityInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerInfo {
    pub app_name: String,
    pub app_version: String,
    pub platform: String,
}

impl ProducerInfo {
    fn current() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_owned(),
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
            platform: std::env::consts::OS.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Directory of part files plus a completion marker
    Dataset,

    /// Single bundle archive
    Bundle,
}

/// What the receipt covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub kind: ArtifactKind,

    /// Store key of the dataset directory or the bundle object
    pub key: String,

    /// Number of records, for datasets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,

    /// Feature vector width, for datasets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_width: Option<usize>,

    /// Member files in order
    pub files: Vec<FileDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    pub key: String,
    pub size_bytes: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityInfo {
    /// Hash algorithm used (currently only "SHA-256")
    pub hash_algorithm: String,

    /// Combined hash as lowercase hexadecimal string
    pub hash: String,
}

impl IntegrityReceipt {
    pub fn total_bytes(&self) -> u64 {
        self.artifact.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Read back `files` from `store` and build a receipt over them.
///
/// Members are hashed as the store returns them.
///
/// # Errors
///
/// Returns error if any member cannot be read.
pub fn create_receipt(
    store: &dyn ObjectStore,
    kind: ArtifactKind,
    key: &str,
    files: &[String],
    row_count: Option<usize>,
    feature_width: Option<usize>,
) -> Result<IntegrityReceipt> {
    let digests = files
        .iter()
        .map(|file| {
            let bytes = store
                .get(file)
                .with_context(|| format!("Failed to read {file} for hashing"))?;
            Ok(FileDigest {
                key: file.clone(),
                size_bytes: bytes.len() as u64,
                hash: hash_bytes(&bytes),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let hash = combine_hashes(digests.iter().map(|d| (d.key.as_str(), d.hash.as_str())));

    Ok(IntegrityReceipt {
        receipt_version: RECEIPT_VERSION,
        created_utc: Utc::now(),
        producer: ProducerInfo::current(),
        artifact: ArtifactInfo {
            kind,
            key: key.to_owned(),
            row_count,
            feature_width,
            files: digests,
        },
        integrity: IntegrityInfo {
            hash_algorithm: HASH_ALGORITHM.to_owned(),
            hash,
        },
    })
}

/// Receipt key for an artifact key.
pub fn receipt_key(artifact_key: &str) -> String {
    format!("{}{RECEIPT_SUFFIX}", artifact_key.trim_end_matches('/'))
}

/// Store a receipt next to its artifact and return the receipt key.
pub fn save_receipt(store: &dyn ObjectStore, receipt: &IntegrityReceipt) -> Result<String> {
    let key = receipt_key(&receipt.artifact.key);
    let json = serde_json::to_vec_pretty(receipt).context("Failed to serialize receipt")?;
    store
        .put(&key, &json)
        .with_context(|| format!("Failed to write receipt to {key}"))?;
    tracing::debug!("Saved integrity receipt {key}");
    Ok(key)
}

pub fn load_receipt(store: &dyn ObjectStore, key: &str) -> Result<IntegrityReceipt> {
    let bytes = store
        .get(key)
        .with_context(|| format!("Failed to read receipt {key}"))?;
    serde_json::from_slice(&bytes).context("Failed to parse receipt JSON (file may be corrupted)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    #[test]
    fn test_create_receipt_basic() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.put("out/model.tar.gz", b"test data").unwrap();

        let receipt = create_receipt(
            &store,
            ArtifactKind::Bundle,
            "out/model.tar.gz",
            &["out/model.tar.gz".to_owned()],
            None,
            None,
        )
        .unwrap();

        assert_eq!(receipt.receipt_version, RECEIPT_VERSION);
        assert_eq!(receipt.producer.app_name, "gearbox");
        assert_eq!(receipt.integrity.hash_algorithm, "SHA-256");
        assert_eq!(receipt.integrity.hash.len(), 64);
        assert_eq!(receipt.total_bytes(), 9);
    }

    #[test]
    fn test_save_and_load_receipt() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.put("data/train/part-00000", b"1,0.0\n").unwrap();

        let receipt = create_receipt(
            &store,
            ArtifactKind::Dataset,
            "data/train/",
            &["data/train/part-00000".to_owned()],
            Some(1),
            Some(1),
        )
        .unwrap();
        let key = save_receipt(&store, &receipt).unwrap();
        assert_eq!(key, "data/train.receipt.json");

        let loaded = load_receipt(&store, &key).unwrap();
        assert_eq!(loaded, receipt);
    }

    #[test]
    fn test_missing_member_fails() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let result = create_receipt(
            &store,
            ArtifactKind::Bundle,
            "nope",
            &["nope".to_owned()],
            None,
            None,
        );
        assert!(result.is_err());
    }
}
