//! Corpus scan: walk a source tree and turn matching files into units.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use super::changeset::Unit;
use crate::Error;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

/// Unit id for a file: its path relative to `root`, `/`-separated.
pub fn unit_id_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// Files under `root` with one of `extensions`, skipping hidden entries.
pub fn list_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), extensions))
        .map(DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Read every matching file under `root` into a [`Unit`].
///
/// Files that cannot be read as UTF-8 are skipped with a warning; a missing
/// root is an error.
pub async fn scan_corpus(root: &Path, extensions: &[String]) -> Result<Vec<Unit>, Error> {
    if !tokio::fs::metadata(root).await?.is_dir() {
        return Err(Error::InvalidInput(format!("not a directory: {}", root.display())));
    }

    let walk_root = root.to_path_buf();
    let walk_extensions = extensions.to_vec();
    let files = tokio::task::spawn_blocking(move || list_files(&walk_root, &walk_extensions))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    let mut units = Vec::with_capacity(files.len());
    for path in files {
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => units.push(Unit::from_raw(unit_id_for(root, &path), &raw)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }

    tracing::debug!(root = %root.display(), units = units.len(), "scanned corpus");
    Ok(units)
}
