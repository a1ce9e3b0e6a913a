//! Local research material: text documents under a folder, ranked by how
//! many query terms they share.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use penwright_core::error::{PenwrightError, Result};

const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst", "csv", "json", "html", "htm"];

#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub content: String,
}

/// Load every readable text document below `dir`.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(PenwrightError::Research {
            query: String::new(),
            message: format!("document folder not found: {}", dir.display()),
        });
    }

    let mut docs = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            debug!(path = %path.display(), "Skipping non-text document");
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => docs.push(Document {
                path: path.to_path_buf(),
                content,
            }),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read document"),
        }
    }
    Ok(docs)
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Documents sharing at least one term with the query, best first.
pub fn rank_documents<'a>(query: &str, docs: &'a [Document]) -> Vec<&'a Document> {
    let query_terms = terms(query);
    let mut scored: Vec<(usize, &Document)> = docs
        .iter()
        .map(|d| {
            let doc_terms = terms(&d.content);
            (query_terms.intersection(&doc_terms).count(), d)
        })
        .filter(|(score, _)| *score > 0)
        .collect();
    // stable sort keeps file-name order among ties
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, d)| d).collect()
}

/// Concatenate the best-ranked documents into a context block of at most `max_chars`.
pub fn build_context(query: &str, docs: &[Document], max_chars: usize) -> String {
    let mut out = String::new();
    for doc in rank_documents(query, docs) {
        let header = format!("Source: {}\n", doc.path.display());
        let remaining = max_chars.saturating_sub(out.chars().count() + header.chars().count());
        if remaining == 0 {
            break;
        }
        out.push_str(&header);
        out.extend(doc.content.chars().take(remaining));
        out.push_str("\n\n");
    }
    out
}
