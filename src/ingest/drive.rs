//! Drive file metadata and the human-readable ancestry paths built from it.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::DocumentRecord;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
/// Ancestry label for files whose parent is outside the listing.
pub const ROOT_LABEL: &str = "root";
/// Ancestry label for files with no parent (shared with the user).
pub const SHARED_LABEL: &str = "shared";
pub const PATH_SEPARATOR: &str = " > ";

/// One entry of a drive listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// One `DocumentRecord` per non-folder file, in listing order.
pub fn build_document_records(files: &[DriveFile]) -> Vec<DocumentRecord> {
    let by_id: HashMap<&str, &DriveFile> = files.iter().map(|f| (f.id.as_str(), f)).collect();
    files
        .iter()
        .filter(|f| !f.is_folder())
        .map(|f| DocumentRecord {
            id: f.id.clone(),
            name: f.name.clone(),
            path: compute_path(f, &by_id),
        })
        .collect()
}

/// Walk `parents[0]` from the file upward and join the chain root-first.
pub fn compute_path(file: &DriveFile, by_id: &HashMap<&str, &DriveFile>) -> String {
    let mut chain = vec![file.name.as_str()];
    let mut visited: HashSet<&str> = HashSet::from([file.id.as_str()]);
    let mut current = file;

    loop {
        let Some(parent_id) = current.parents.first() else {
            chain.push(SHARED_LABEL);
            break;
        };
        let Some(&parent) = by_id.get(parent_id.as_str()) else {
            chain.push(ROOT_LABEL);
            break;
        };
        if !visited.insert(parent.id.as_str()) {
            tracing::warn!("Parent cycle at '{}' while building path of {}", parent.name, file.id);
            chain.push(ROOT_LABEL);
            break;
        }
        chain.push(parent.name.as_str());
        current = parent;
    }

    chain.reverse();
    chain.join(PATH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, name: &str, parents: &[&str]) -> DriveFile {
        DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn folder(id: &str, name: &str, parents: &[&str]) -> DriveFile {
        DriveFile {
            mime_type: FOLDER_MIME_TYPE.to_string(),
            ..file(id, name, parents)
        }
    }

    #[test]
    fn test_nested_path() {
        let files = vec![
            folder("f1", "Finance", &["drive-root"]),
            folder("f2", "2024", &["f1"]),
            file("d1", "Q3_report.pdf", &["f2"]),
        ];
        let records = build_document_records(&files);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "d1");
        assert_eq!(records[0].path, "root > Finance > 2024 > Q3_report.pdf");
    }

    #[test]
    fn test_file_without_parents_is_shared() {
        let records = build_document_records(&[file("d1", "notes.txt", &[])]);
        assert_eq!(records[0].path, "shared > notes.txt");
    }

    #[test]
    fn test_folders_produce_no_records() {
        let files = vec![folder("f1", "Finance", &[]), file("d1", "a.pdf", &["f1"])];
        let records = build_document_records(&files);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "shared > Finance > a.pdf");
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let files = vec![
            folder("f1", "A", &["f2"]),
            folder("f2", "B", &["f1"]),
            file("d1", "x.pdf", &["f1"]),
        ];
        let records = build_document_records(&files);
        assert_eq!(records[0].path, "root > B > A > x.pdf");
    }

    #[test]
    fn test_drive_listing_deserializes() {
        let json = r#"[{"id":"d1","name":"a.pdf","mimeType":"application/pdf","parents":["p"]},
                       {"id":"d2","name":"b.pdf","mimeType":"application/pdf"}]"#;
        let files: Vec<DriveFile> = serde_json::from_str(json).unwrap();
        assert_eq!(files[0].parents, vec!["p".to_string()]);
        assert!(files[1].parents.is_empty());
    }
}
