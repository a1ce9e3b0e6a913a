//! Typed state records threaded through the main and per-section graphs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use penwright_core::article::{Article, ArticleMetadata, ArticlePlan, Headers, PlanSection, SeoMetadata};
use penwright_core::types::{ResearchReport, RunId, SectionDraft};
use penwright_core::Task;

use crate::graph::{GraphState, HandoffContext};

/// Signal set by the human node: `accept` or `revise`.
pub const PLAN_REVIEW: &str = "plan_review";
/// Signal set by the reviewer node: `accept` or `revise`.
pub const REVIEW: &str = "review";
/// Signal set by the writer when an SEO pass is requested: `enabled`.
pub const SEO: &str = "seo";

pub const ACCEPT: &str = "accept";
pub const REVISE: &str = "revise";

/// Everything one pipeline run knows about the article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub run_id: RunId,
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_research: Option<ResearchReport>,
    /// Outline from the editor; only provisional metadata before planning.
    #[serde(default)]
    pub plan: ArticlePlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    #[serde(default)]
    pub plan_revisions: u32,
    #[serde(default)]
    pub sections: Vec<SectionDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<SeoMetadata>,
    /// Final Markdown layout.
    #[serde(default)]
    pub report: String,
    /// Format name to written file.
    #[serde(default)]
    pub published: BTreeMap<String, PathBuf>,
    pub output_dir: PathBuf,
    #[serde(skip)]
    pub signals: HandoffContext,
}

impl ResearchState {
    pub fn new(run_id: RunId, task: Task, output_dir: PathBuf) -> Self {
        Self {
            run_id,
            task,
            initial_research: None,
            plan: ArticlePlan::default(),
            human_feedback: None,
            plan_revisions: 0,
            sections: vec![],
            article: None,
            headers: None,
            seo: None,
            report: String::new(),
            published: BTreeMap::new(),
            output_dir,
            signals: HandoffContext::new(),
        }
    }

    pub fn metadata(&self) -> &ArticleMetadata {
        &self.plan.metadata
    }

    /// Title of the article as far as the pipeline got.
    pub fn title(&self) -> &str {
        if let Some(headers) = &self.headers {
            return &headers.title;
        }
        if let Some(article) = &self.article {
            return &article.metadata.title;
        }
        if !self.plan.metadata.title.is_empty() {
            return &self.plan.metadata.title;
        }
        &self.task.query
    }
}

impl GraphState for ResearchState {
    fn signals(&self) -> &HandoffContext {
        &self.signals
    }

    fn signals_mut(&mut self) -> &mut HandoffContext {
        &mut self.signals
    }
}

/// State of one section moving through research, review and revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftState {
    pub task: Task,
    pub metadata: ArticleMetadata,
    /// What to research; falls back to the section heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub section: PlanSection,
    /// Headings of the sections before this one.
    #[serde(default)]
    pub previous_sections: Vec<String>,
    #[serde(default)]
    pub draft: SectionDraft,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_notes: Option<String>,
    #[serde(default)]
    pub revisions: u32,
    #[serde(skip)]
    pub signals: HandoffContext,
}

impl DraftState {
    pub fn new(
        task: Task,
        metadata: ArticleMetadata,
        section: PlanSection,
        previous_sections: Vec<String>,
    ) -> Self {
        Self {
            task,
            metadata,
            topic: Some(section.heading.clone()),
            draft: SectionDraft {
                heading: section.heading.clone(),
                ..Default::default()
            },
            section,
            previous_sections,
            review: None,
            revision_notes: None,
            revisions: 0,
            signals: HandoffContext::new(),
        }
    }

    /// Non-blank research topic.
    pub fn topic(&self) -> Option<&str> {
        self.topic
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(self.section.heading.as_str()).filter(|h| !h.trim().is_empty()))
    }
}

impl GraphState for DraftState {
    fn signals(&self) -> &HandoffContext {
        &self.signals
    }

    fn signals_mut(&mut self) -> &mut HandoffContext {
        &mut self.signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_latest_stage() {
        let mut state = ResearchState::new(RunId::new(), Task::new("rust async"), PathBuf::from("out"));
        assert_eq!(state.title(), "rust async");

        state.plan.metadata.title = "Planned".into();
        assert_eq!(state.title(), "Planned");

        state.headers = Some(Headers {
            title: "Final".into(),
            ..Default::default()
        });
        assert_eq!(state.title(), "Final");
    }

    #[test]
    fn draft_topic_falls_back_to_heading() {
        let mut draft = DraftState::new(
            Task::new("q"),
            ArticleMetadata::default(),
            PlanSection::new("Ownership"),
            vec![],
        );
        assert_eq!(draft.topic(), Some("Ownership"));

        draft.topic = Some("  ".into());
        assert_eq!(draft.topic(), Some("Ownership"));

        draft.section.heading.clear();
        draft.topic = None;
        assert_eq!(draft.topic(), None);
    }

    #[test]
    fn state_serializes_without_signals() {
        let mut state = ResearchState::new(RunId::new(), Task::new("q"), PathBuf::from("out"));
        state.signals.set_str(PLAN_REVIEW, ACCEPT);
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("signals").is_none());
        assert_eq!(json["task"]["query"], "q");
    }
}
