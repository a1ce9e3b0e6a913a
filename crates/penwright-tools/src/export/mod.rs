//! Report exporters. Every writer creates its output directory and returns
//! the path it wrote.

pub mod blocks;
mod docx;
mod pdf;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use penwright_core::error::{PenwrightError, Result};

fn export_err(format: &str, message: impl ToString) -> PenwrightError {
    PenwrightError::Export {
        format: format.to_string(),
        message: message.to_string(),
    }
}

fn unique_path(dir: &Path, ext: &str) -> PathBuf {
    dir.join(format!("{}.{ext}", Uuid::new_v4().simple()))
}

fn title_of(markdown: &str) -> String {
    blocks::parse_markdown(blocks::strip_front_matter(markdown))
        .into_iter()
        .find_map(|b| match b {
            blocks::Block::Heading { .. } => Some(b.plain_text()),
            _ => None,
        })
        .unwrap_or_else(|| "Report".to_string())
}

/// Write Markdown text to `<uuid>.md` under `dir`.
pub async fn write_text_to_md(text: &str, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = unique_path(dir, "md");
    tokio::fs::write(&path, text.as_bytes())
        .await
        .map_err(|e| export_err("md", format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), "Markdown written");
    Ok(path)
}

/// Render Markdown to `<uuid>.pdf` under `dir`.
pub async fn write_md_to_pdf(text: &str, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = unique_path(dir, "pdf");
    let markdown = text.to_string();
    let target = path.clone();
    tokio::task::spawn_blocking(move || pdf::render(&markdown, &title_of(&markdown), &target))
        .await
        .map_err(|e| export_err("pdf", e))?
        .map_err(|e| export_err("pdf", e))?;
    info!(path = %path.display(), "PDF written");
    Ok(path)
}

/// Render Markdown to `<uuid>.docx` under `dir`.
pub async fn write_md_to_docx(text: &str, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = unique_path(dir, "docx");
    let markdown = text.to_string();
    let target = path.clone();
    tokio::task::spawn_blocking(move || docx::render(&markdown, &target))
        .await
        .map_err(|e| export_err("docx", e))?
        .map_err(|e| export_err("docx", e))?;
    info!(path = %path.display(), "DOCX written");
    Ok(path)
}

/// Write any serializable value as pretty JSON to `dir/filename`.
pub async fn write_to_json<T: Serialize + ?Sized>(
    value: &T,
    dir: &Path,
    filename: &str,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    let json = serde_json::to_string_pretty(value).map_err(|e| export_err("json", e))?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| export_err("json", format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), "JSON written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn md_gets_uuid_name_and_utf8_content() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let path = write_text_to_md("# Café\n", &out).await.unwrap();
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert_eq!(stem.len(), 32);
        assert_eq!(path.extension().unwrap(), "md");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Café\n");
    }

    #[tokio::test]
    async fn json_is_pretty_and_unescaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_to_json(&json!({"title": "Ünïcode"}), dir.path(), "report.json")
            .await
            .unwrap();
        assert!(path.ends_with("report.json"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Ünïcode"));
        assert!(text.contains('\n'));
    }

    #[tokio::test]
    async fn pdf_and_docx_files_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let md = "# Title\n\nBody text.\n";
        let pdf = write_md_to_pdf(md, dir.path()).await.unwrap();
        let docx = write_md_to_docx(md, dir.path()).await.unwrap();
        assert!(pdf.exists());
        assert!(docx.exists());
    }

    #[test]
    fn title_comes_from_first_heading() {
        assert_eq!(title_of("---\na: b\n---\n\n## Sub\n# Main"), "Sub");
        assert_eq!(title_of("no headings"), "Report");
    }
}
