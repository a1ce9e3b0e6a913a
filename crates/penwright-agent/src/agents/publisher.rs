use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use penwright_core::article::{Article, Headers};
use penwright_core::error::{PenwrightError, Result};
use penwright_core::types::PipelineEvent;
use penwright_tools::{slugify, write_md_to_docx, write_md_to_pdf, write_text_to_md, write_to_json};

use crate::context::PipelineContext;
use crate::state::ResearchState;

const AGENT: &str = "PUBLISHER";

/// Renders the article to Markdown and writes the requested formats.
#[derive(Clone)]
pub struct Publisher {
    ctx: Arc<PipelineContext>,
}

fn yaml_str(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn yaml_list(items: &[String]) -> String {
    let items: Vec<String> = items.iter().map(|i| yaml_str(i)).collect();
    format!("[{}]", items.join(", "))
}

fn front_matter(state: &ResearchState, headers: &Headers) -> String {
    let mut out = String::from("---\n");
    let _ = writeln!(out, "title: {}", yaml_str(&headers.title));
    let _ = writeln!(out, "date: {}", yaml_str(&headers.date));
    let _ = writeln!(out, "description: {}", yaml_str(&headers.description));
    let _ = writeln!(out, "tags: {}", yaml_list(&headers.tags));
    if let Some(author) = &headers.author {
        let _ = writeln!(out, "author: {}", yaml_str(author));
    }
    if let Some(seo) = &state.seo {
        let _ = writeln!(out, "slug: {}", yaml_str(&seo.slug));
        if !seo.focus_keyword.is_empty() {
            let _ = writeln!(out, "focus_keyword: {}", yaml_str(&seo.focus_keyword));
        }
        if !seo.secondary_keywords.is_empty() {
            let _ = writeln!(out, "keywords: {}", yaml_list(&seo.secondary_keywords));
        }
        if !seo.meta_description.is_empty() {
            let _ = writeln!(out, "meta_description: {}", yaml_str(&seo.meta_description));
        }
    }
    out.push_str("---\n\n");
    out
}

fn body(headers: &Headers, article: &Article) -> String {
    let content = &article.content;
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", headers.title);
    let _ = writeln!(out, "#### Date: {}\n", headers.date);

    let intro = &content.introduction;
    let _ = writeln!(out, "{}\n", intro.hook);
    if let Some(context) = intro.context.as_deref().filter(|c| !c.is_empty()) {
        let _ = writeln!(out, "{context}\n");
    }
    let _ = writeln!(out, "{}\n", intro.thesis);

    if !content.main_content.is_empty() {
        out.push_str("## Table of Contents\n\n");
        for section in &content.main_content {
            let _ = writeln!(out, "- [{}](#{})", section.heading, slugify(&section.heading));
        }
        out.push('\n');
    }

    for section in &content.main_content {
        let _ = writeln!(out, "## {}\n\n{}\n", section.heading, section.content);
        for sub in &section.subsections {
            let _ = writeln!(out, "### {}\n\n{}\n", sub.subheading, sub.content);
        }
    }

    if let Some(conclusion) = &content.conclusion {
        out.push_str("## Conclusion\n\n");
        if let Some(summary) = &conclusion.summary {
            let _ = writeln!(out, "{summary}\n");
        }
        if let Some(cta) = &conclusion.call_to_action {
            let _ = writeln!(out, "{cta}\n");
        }
    }

    if let Some(refs) = &article.references {
        if !refs.sources.is_empty() {
            out.push_str("## References\n\n");
            for source in &refs.sources {
                match &source.url {
                    Some(url) => {
                        let _ = writeln!(out, "- {} [{url}]({url})", source.citation);
                    }
                    None => {
                        let _ = writeln!(out, "- {}", source.citation);
                    }
                }
            }
            out.push('\n');
        }
        if !refs.additional_resources.is_empty() {
            out.push_str("## Additional Resources\n\n");
            for res in &refs.additional_resources {
                let title = res.title.as_deref().unwrap_or("Resource");
                match &res.url {
                    Some(url) => {
                        let _ = writeln!(out, "- [{title}]({url})");
                    }
                    None => {
                        let _ = writeln!(out, "- {title}");
                    }
                }
            }
            out.push('\n');
        }
    }
    out
}

impl Publisher {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Markdown report with YAML front matter.
    pub fn generate_layout(state: &ResearchState) -> Result<String> {
        let article = state
            .article
            .as_ref()
            .ok_or_else(|| PenwrightError::InvalidArticle("nothing to publish".into()))?;
        let headers = state
            .headers
            .as_ref()
            .ok_or_else(|| PenwrightError::InvalidHeaders("headers were not generated".into()))?;
        Ok(format!("{}{}", front_matter(state, headers), body(headers, article)))
    }

    /// Write every requested format. Failures are logged and skipped.
    pub async fn write_report_by_formats(
        &self,
        layout: &str,
        state: &ResearchState,
        formats: &[String],
    ) -> BTreeMap<String, PathBuf> {
        let dir = &state.output_dir;
        let mut written = BTreeMap::new();
        for format in formats {
            let result = match format.as_str() {
                "md" | "markdown" => write_text_to_md(layout, dir).await,
                "pdf" => write_md_to_pdf(layout, dir).await,
                "docx" => write_md_to_docx(layout, dir).await,
                "json" => write_to_json(state, dir, "report.json").await,
                other => {
                    warn!(format = %other, "Unknown publish format, skipping");
                    continue;
                }
            };
            match result {
                Ok(path) => {
                    self.ctx.event_bus.publish(PipelineEvent::Published {
                        format: format.clone(),
                        path: path.clone(),
                    });
                    written.insert(format.clone(), path);
                }
                Err(e) => error!(format = %format, error = %e, "Failed to publish format"),
            }
        }
        written
    }

    /// Main-graph node: renders the layout and writes the task's formats.
    pub async fn run(&self, state: &mut ResearchState) -> Result<()> {
        self.ctx.log(AGENT, "Publishing final research report based on retrieved data...");
        let layout = Self::generate_layout(state)?;
        let formats = state.task.enabled_formats(&self.ctx.config.publish.formats);
        let written = self.write_report_by_formats(&layout, state, &formats).await;
        info!(formats = ?written.keys().collect::<Vec<_>>(), dir = %state.output_dir.display(), "Report published");

        state.report = layout;
        state.published = written;
        Ok(())
    }
}
