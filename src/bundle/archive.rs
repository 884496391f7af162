//! In-memory tar+gzip packing for bundles.

use crate::error::{GearboxError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::io::Read as _;

/// Entries of an unpacked archive, keyed by path. Directories are not listed.
pub type Entries = BTreeMap<String, Vec<u8>>;

/// Pack `files` into a gzip-compressed tar archive.
///
/// Parent directories get their own entries (`root/`, `root/x.node/`) ahead of
/// the files inside them. `mtime` is stamped on every entry.
pub fn pack(files: &[(String, Vec<u8>)], mtime: u64) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut written_dirs: Vec<String> = Vec::new();
    for (path, bytes) in files {
        for dir in parent_dirs(path) {
            if !written_dirs.contains(&dir) {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                header.set_mtime(mtime);
                builder
                    .append_data(&mut header, &dir, std::io::empty())
                    .map_err(|e| export_error(&dir, &e))?;
                written_dirs.push(dir);
            }
        }

        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        builder
            .append_data(&mut header, path, bytes.as_slice())
            .map_err(|e| export_error(path, &e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| export_error("archive", &e))?;
    encoder.finish().map_err(|e| export_error("gzip stream", &e))
}

/// Unpack a gzip-compressed tar archive into memory.
pub fn unpack(bytes: &[u8]) -> Result<Entries> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut entries = Entries::new();

    let iter = archive.entries().map_err(|e| read_error(&e))?;
    for entry in iter {
        let mut entry = entry.map_err(|e| read_error(&e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| read_error(&e))?
            .to_string_lossy()
            .into_owned();
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| read_error(&e))?;
        entries.insert(path, contents);
    }
    Ok(entries)
}

/// List every entry path, directories included, in archive order.
pub fn list(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut names = Vec::new();
    for entry in archive.entries().map_err(|e| read_error(&e))? {
        let entry = entry.map_err(|e| read_error(&e))?;
        let path = entry.path().map_err(|e| read_error(&e))?;
        let mut name = path.to_string_lossy().into_owned();
        if entry.header().entry_type().is_dir() && !name.ends_with('/') {
            name.push('/');
        }
        names.push(name);
    }
    Ok(names)
}

fn parent_dirs(path: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut end = 0;
    while let Some(pos) = path[end..].find('/') {
        end += pos + 1;
        dirs.push(path[..end].to_owned());
    }
    dirs
}

fn export_error(what: &str, err: &std::io::Error) -> GearboxError {
    GearboxError::BundleExport(format!("cannot archive {what}: {err}"))
}

fn read_error(err: &std::io::Error) -> GearboxError {
    GearboxError::BundleExport(format!("cannot read bundle archive: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let files = vec![
            ("bundle.json".to_owned(), b"{}".to_vec()),
            ("root/model.json".to_owned(), b"{\"op\":\"pipeline\"}".to_vec()),
            ("root/a.node/node.json".to_owned(), b"[]".to_vec()),
        ];
        let packed = pack(&files, 0).unwrap();
        assert_eq!(&packed[..2], &[0x1f, 0x8b], "gzip magic");

        let entries = unpack(&packed).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries["root/model.json"], b"{\"op\":\"pipeline\"}");

        let names = list(&packed).unwrap();
        assert_eq!(
            names,
            vec![
                "bundle.json",
                "root/",
                "root/model.json",
                "root/a.node/",
                "root/a.node/node.json",
            ]
        );
    }

    #[test]
    fn test_parent_dirs() {
        assert_eq!(parent_dirs("root/a.node/model.json"), vec!["root/", "root/a.node/"]);
        assert!(parent_dirs("bundle.json").is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            unpack(b"not a bundle"),
            Err(GearboxError::BundleExport(_))
        ));
    }
}
