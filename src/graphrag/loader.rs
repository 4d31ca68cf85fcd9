use std::path::Path;

use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::Result;

/// Raw document read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: String,
    pub content: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Load every `*.txt` file directly inside `folder`, sorted by file name.
///
/// Content is trimmed and empty files are skipped. A missing folder yields
/// an empty corpus.
pub fn load_documents(folder: impl AsRef<Path>) -> Result<Vec<SourceDocument>> {
    let folder = folder.as_ref();
    if !folder.is_dir() {
        error!(folder = %folder.display(), "Documents folder not found");
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    let entries = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("txt"));

    for entry in entries {
        let content = std::fs::read_to_string(entry.path())?;
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        info!(
            file = %entry.file_name().to_string_lossy(),
            chars = content.chars().count(),
            "Loaded document"
        );
        documents.push(SourceDocument::new(
            entry.path().to_string_lossy(),
            content,
        ));
    }

    if documents.is_empty() {
        warn!(folder = %folder.display(), "No .txt documents found");
    } else {
        info!(count = documents.len(), folder = %folder.display(), "Loaded documents");
    }
    Ok(documents)
}
