//! Object storage for datasets, bundles and receipts.
//!
//! The job only needs a handful of capabilities from storage: write bytes to
//! a key, read them back, list keys under a prefix and delete a key. Keys are
//! `/`-separated relative paths such as `data/preprocessed/train/part-00000`.
//!
//! [`LocalStore`] maps keys onto a directory tree. Every `put` goes through a
//! temporary file in the target directory followed by a rename, so readers
//! never observe a half-written object.

use crate::error::{GearboxError, Result, ResultExt as _};
use std::fs;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

/// Minimal object-store interface used by writers and the bundle exporter.
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` to `key`, replacing any existing object atomically.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read the object at `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// List keys under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete the object at `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Human-readable location of `key`, for logs and reports.
    fn describe(&self, key: &str) -> String;
}

/// Directory-backed object store.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            GearboxError::WriteFailure(format!(
                "cannot create storage root {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || key.trim_matches('/').is_empty() {
            return Err(GearboxError::Config(format!("invalid storage key '{key}'")));
        }
        Ok(self.root.join(relative))
    }

    fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                Self::collect_files(&path, out)?;
            } else if !is_staging_file(&path) {
                out.push(path);
            }
        }
        Ok(())
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

const STAGING_PREFIX: &str = ".gearbox-staging-";

fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(STAGING_PREFIX))
}

impl ObjectStore for LocalStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(key)?;
        let parent = target
            .parent()
            .ok_or_else(|| GearboxError::WriteFailure(format!("key '{key}' has no parent")))?;

        let write = || -> std::io::Result<()> {
            fs::create_dir_all(parent)?;
            let staging = parent.join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()));
            let result = (|| -> std::io::Result<()> {
                let mut file = fs::File::create(&staging)?;
                file.write_all(bytes)?;
                file.sync_all()?;
                fs::rename(&staging, &target)
            })();
            if result.is_err() {
                let _ = fs::remove_file(&staging);
            }
            result
        };

        write().map_err(|e| {
            GearboxError::WriteFailure(format!("cannot write {}: {e}", target.display()))
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_matches('/');
        let base = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix)?
        };

        let mut files = Vec::new();
        if base.is_dir() {
            Self::collect_files(&base, &mut files)
                .with_context(|| format!("Failed to list {}", base.display()))?;
        } else if base.is_file() {
            files.push(base);
        }

        let mut keys: Vec<String> = files.iter().filter_map(|p| self.key_for(p)).collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GearboxError::WriteFailure(format!(
                "cannot delete {}: {e}",
                path.display()
            ))),
        }
    }

    fn describe(&self, key: &str) -> String {
        self.root
            .join(key.trim_start_matches('/'))
            .display()
            .to_string()
    }
}

/// Join key segments with `/`, ignoring empty segments and stray slashes.
pub fn join_key(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        name.to_owned()
    } else {
        format!("{base}/{name}")
    }
}
