//! Integrity receipts for written artifacts.
//!
//! After a run, each dataset directory and the bundle archive can get a
//! receipt: a JSON document listing every member object with its size and
//! SHA-256 hash, plus a combined hash over all members. Receipts live next to
//! the artifact under `<key>.receipt.json`.
//!
//! ```json
//! {
//!   "receipt_version": 1,
//!   "created_utc": "2026-01-24T12:34:56.789Z",
//!   "producer": {"app_name": "gearbox", "app_version": "0.1.0", "platform": "linux"},
//!   "artifact": {
//!     "kind": "dataset",
//!     "key": "data/preprocessed/train",
//!     "row_count": 800,
//!     "feature_width": 17,
//!     "files": [{"key": "data/preprocessed/train/part-00000", "size_bytes": 1024, "hash": "a3b2..."}]
//!   },
//!   "integrity": {"hash_algorithm": "SHA-256", "hash": "9f1c..."}
//! }
//! ```
//!
//! Verification is a deterministic pass/fail with one line per problem.

pub mod hasher;
pub mod receipt;
pub mod verifier;

pub use hasher::{HASH_ALGORITHM, hash_bytes};
pub use receipt::{
    ArtifactInfo, ArtifactKind, FileDigest, IntegrityInfo, IntegrityReceipt, ProducerInfo,
    create_receipt, load_receipt, receipt_key, save_receipt,
};
pub use verifier::{VerificationResult, verify_receipt};
