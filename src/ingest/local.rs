use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::ingest::drive::{build_document_records, DriveFile, FOLDER_MIME_TYPE};
use crate::models::DocumentRecord;

/// Files above this size are skipped.
const MAX_FILE_BYTES: u64 = 1_048_576;

/// A document read from the local source folder.
#[derive(Debug, Clone)]
pub struct LocalDocument {
    pub record: DocumentRecord,
    pub text: String,
}

/// Walk `root` for UTF-8 text documents.
///
/// Folders and files are turned into a drive-style listing keyed by relative
/// path, so paths come out as `root > dir > file` exactly like drive ingestion.
pub fn collect_local_documents(root: &Path) -> Result<Vec<LocalDocument>> {
    if !root.is_dir() {
        anyhow::bail!("Source directory {} does not exist", root.display());
    }

    let mut listing = Vec::new();
    let mut texts = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let Some(id) = relative_id(root, path) else {
            continue;
        };
        // Top-level entries point at "", which is not in the listing
        let parents = vec![path
            .parent()
            .and_then(|p| relative_id(root, p))
            .unwrap_or_default()];
        let name = entry.file_name().to_string_lossy().to_string();

        if entry.file_type().is_dir() {
            listing.push(DriveFile {
                id,
                name,
                mime_type: FOLDER_MIME_TYPE.to_string(),
                parents,
            });
            continue;
        }
        if !entry.file_type().is_file() || !is_ingestible(path) {
            continue;
        }
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            tracing::warn!("Skipping {}: too large or unreadable", path.display());
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(text) => {
                listing.push(DriveFile {
                    id: id.clone(),
                    name,
                    mime_type: "text/plain".to_string(),
                    parents,
                });
                texts.push((id, text));
            }
            Err(e) => tracing::warn!("Skipping {}: {e}", path.display()),
        }
    }

    let mut records = build_document_records(&listing);
    let mut documents = Vec::with_capacity(records.len());
    for (id, text) in texts {
        let position = records
            .iter()
            .position(|r| r.id == id)
            .with_context(|| format!("No document record for {id}"))?;
        documents.push(LocalDocument {
            record: records.swap_remove(position),
            text,
        });
    }

    tracing::info!(
        "Collected {} document(s) from {}",
        documents.len(),
        root.display()
    );
    Ok(documents)
}

/// Relative path with `/` separators; `None` for the root itself.
fn relative_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_ingestible(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    matches!(ext.as_str(), "txt" | "md" | "csv" | "json" | "html" | "htm")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_nested_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("finance/2024")).unwrap();
        std::fs::write(dir.path().join("finance/2024/q3.md"), "Q3 revenue grew").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join(".secret.txt"), "hidden").unwrap();

        let docs = collect_local_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);

        let q3 = docs.iter().find(|d| d.record.id == "finance/2024/q3.md").unwrap();
        assert_eq!(q3.record.path, "root > finance > 2024 > q3.md");
        assert_eq!(q3.record.name, "q3.md");
        assert_eq!(q3.text, "Q3 revenue grew");

        let readme = docs.iter().find(|d| d.record.id == "readme.txt").unwrap();
        assert_eq!(readme.record.path, "root > readme.txt");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_local_documents(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_relative_id() {
        let root = Path::new("/data/files");
        assert_eq!(relative_id(root, Path::new("/data/files")), None);
        assert_eq!(
            relative_id(root, Path::new("/data/files/a/b.txt")).as_deref(),
            Some("a/b.txt")
        );
    }
}
