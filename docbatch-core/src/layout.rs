//! Discovery of dated batch folders and of the files inside one batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::ScanError;

static BATCH_FOLDER_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").ok());

/// `DD-MM-YYYY`
pub fn is_batch_folder_name(name: &str) -> bool {
    BATCH_FOLDER_NAME
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Last path component, used to key reports, failure mirrors and the summary.
pub fn batch_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Dated batch folders directly under `root`, in name order. Other
/// subdirectories are logged and skipped.
pub fn scan_batches(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::InvalidRoot(root.to_path_buf()));
    }

    let mut batches = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let name = batch_name(&path);
        if is_batch_folder_name(&name) {
            info!(folder = %name, "Existing folder detected");
            batches.push(path);
        } else {
            warn!(folder = %name, "Skipping invalid folder");
        }
    }
    batches.sort();
    Ok(batches)
}

/// Metadata spreadsheets in the batch folder, sorted by name.
pub fn metadata_sources(folder: &Path, config: &PipelineConfig) -> std::io::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && config.is_metadata_source(p))
        .collect();
    sources.sort();
    Ok(sources)
}

/// Documents waiting in `<folder>/<documents_dir>`, sorted by name. A missing
/// documents folder means there is nothing to do.
pub fn pending_documents(folder: &Path, config: &PipelineConfig) -> std::io::Result<Vec<PathBuf>> {
    let documents_dir = folder.join(&config.documents_dir);
    if !documents_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut documents: Vec<PathBuf> = fs::read_dir(&documents_dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && config.is_document(p))
        .collect();
    documents.sort();
    Ok(documents)
}

/// Document identifier: the file name with its extension stripped.
pub fn document_id(document: &Path) -> String {
    document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn only_dated_folders_are_batches() {
        assert!(is_batch_folder_name("17-10-2024"));
        assert!(!is_batch_folder_name("2024-10-17"));
        assert!(!is_batch_folder_name("17-10-2024-old"));
        assert!(!is_batch_folder_name("archive"));
    }

    #[test]
    fn scan_skips_files_and_undated_folders() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("02-01-2024")).unwrap();
        fs::create_dir(root.path().join("01-01-2024")).unwrap();
        fs::create_dir(root.path().join("tmp")).unwrap();
        fs::write(root.path().join("05-05-2024"), b"not a dir").unwrap();

        let batches = scan_batches(root.path()).unwrap();
        let names: Vec<String> = batches.iter().map(|p| batch_name(p)).collect();
        assert_eq!(names, vec!["01-01-2024", "02-01-2024"]);
    }

    #[test]
    fn scan_rejects_missing_root() {
        let root = tempdir().unwrap();
        let err = scan_batches(&root.path().join("nope")).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRoot(_)));
    }

    #[test]
    fn pending_documents_filters_by_extension() {
        let batch = tempdir().unwrap();
        let docs = batch.path().join("Documents");
        fs::create_dir(&docs).unwrap();
        fs::write(docs.join("b.pdf"), b"").unwrap();
        fs::write(docs.join("a.PDF"), b"").unwrap();
        fs::write(docs.join("notes.txt"), b"").unwrap();

        let found = pending_documents(batch.path(), &PipelineConfig::default()).unwrap();
        let ids: Vec<String> = found.iter().map(|p| document_id(p)).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_documents_folder_is_empty() {
        let batch = tempdir().unwrap();
        let found = pending_documents(batch.path(), &PipelineConfig::default()).unwrap();
        assert!(found.is_empty());
    }
}
