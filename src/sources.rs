//! Discovery of source images to seal into the ledger

use crate::error::ChainError;
use std::fs;
use std::path::{Path, PathBuf};

/// Lists the regular files directly inside `dir`, sorted by path.
///
/// `extensions` is matched case-insensitively without the leading dot; an
/// empty list accepts every file.
pub fn enumerate_sources(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, ChainError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ChainError::IoError(format!("Failed to read source dir {:?}: {}", dir, e)))?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if matches_extension(&path, extensions) {
            sources.push(path);
        }
    }

    sources.sort();
    tracing::debug!("Found {} source files in {:?}", sources.len(), dir);
    Ok(sources)
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}
