use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use penwright_core::article::{ArticleMetadata, PlanSection};
use penwright_core::error::{PenwrightError, Result};
use penwright_core::types::{ResearchReport, ResponseFormat, SectionDraft};
use penwright_core::{ResearchSource, Task};
use penwright_tools::documents::{build_context, load_documents};
use penwright_tools::format_hits;

use crate::context::{today, PipelineContext};
use crate::state::{DraftState, ResearchState};

const AGENT: &str = "RESEARCHER";

const SYSTEM_PROMPT: &str = "You are a meticulous research assistant. \
Write a factual, well-organised research summary in Markdown from the material provided. \
Cite source URLs inline where you use them and never invent facts that the material does not support.";

/// Where a section sits in the article, passed along with its research query.
#[derive(Debug, Clone, Default)]
pub struct SectionContext {
    pub article_title: String,
    pub section_heading: String,
    pub previous_sections: Vec<String>,
    pub target_word_count: Option<String>,
    pub tone: String,
}

impl SectionContext {
    fn render(&self) -> String {
        let mut out = format!(
            "Article title: {}\nSection heading: {}\n",
            self.article_title, self.section_heading
        );
        if !self.previous_sections.is_empty() {
            out.push_str(&format!(
                "Previous sections: {}\n",
                self.previous_sections.join(", ")
            ));
        }
        if let Some(words) = &self.target_word_count {
            out.push_str(&format!("Target word count: {words}\n"));
        }
        out.push_str(&format!("Tone: {}\n", self.tone));
        out
    }
}

/// Runs web or local research and synthesises it with the model.
#[derive(Clone)]
pub struct Researcher {
    ctx: Arc<PipelineContext>,
}

impl Researcher {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Research `query` from the given source.
    pub async fn research(
        &self,
        task: &Task,
        query: &str,
        context: Option<&SectionContext>,
        source: ResearchSource,
    ) -> Result<ResearchReport> {
        debug!(query = %query, source = source.as_str(), "Researching");
        let research_err = |e: PenwrightError| PenwrightError::Research {
            query: query.to_string(),
            message: e.to_string(),
        };

        let (material, sources) = match source {
            ResearchSource::Web => {
                let hits = self
                    .ctx
                    .searcher
                    .search(query, self.ctx.config.research.max_results)
                    .await
                    .map_err(research_err)?;
                let urls = hits
                    .iter()
                    .filter(|h| !h.url.is_empty())
                    .map(|h| h.url.clone())
                    .collect();
                (format_hits(&hits), urls)
            }
            ResearchSource::Local => {
                let dir = task.doc_path.as_deref().ok_or_else(|| PenwrightError::Research {
                    query: query.to_string(),
                    message: "local research requires doc_path".into(),
                })?;
                let docs = load_documents(Path::new(dir)).map_err(research_err)?;
                let material =
                    build_context(query, &docs, self.ctx.config.research.max_context_chars);
                if material.is_empty() {
                    return Err(PenwrightError::Research {
                        query: query.to_string(),
                        message: format!("no documents under {dir} match the query"),
                    });
                }
                (material, vec![])
            }
        };

        let mut prompt = format!("Research query: {query}\n");
        if let Some(context) = context {
            prompt.push_str(&context.render());
        }
        prompt.push_str(&format!(
            "\nResearch material:\n{material}\n\nWrite the research summary for this query."
        ));

        let content = self
            .ctx
            .ask(task, SYSTEM_PROMPT, prompt, ResponseFormat::Text)
            .await
            .map_err(research_err)?;

        let mut report = ResearchReport::new(query, source.as_str(), content);
        report.sources = sources;
        Ok(report)
    }

    /// High-level research on the task query before planning.
    pub async fn run_initial_research(&self, state: &mut ResearchState) -> Result<()> {
        let query = state.task.query.clone();
        self.ctx
            .log(AGENT, format!("Running initial research on: {query}"));

        let report = self
            .research(&state.task, &query, None, state.task.source)
            .await?;
        info!(query = %query, chars = report.content.len(), "Initial research complete");

        state.initial_research = Some(report);
        state.plan.metadata = ArticleMetadata {
            title: query,
            date: Some(today()),
            ..Default::default()
        };
        Ok(())
    }

    /// Research one planned section and its subsections.
    ///
    /// Never fails: a section that cannot be researched comes back carrying
    /// its error so the rest of the article can proceed.
    pub async fn run_section_research(
        &self,
        task: &Task,
        section: &PlanSection,
        metadata: &ArticleMetadata,
        previous_sections: &[String],
    ) -> SectionDraft {
        let heading = section.heading.clone();
        self.ctx
            .log(AGENT, format!("Researching section: {heading}"));

        let context = SectionContext {
            article_title: metadata.title.clone(),
            section_heading: heading.clone(),
            previous_sections: previous_sections.to_vec(),
            target_word_count: metadata
                .word_count
                .clone()
                .or_else(|| task.word_count.map(|w| w.to_string())),
            tone: task.tone.clone().unwrap_or_else(|| "neutral".into()),
        };

        let report = match self
            .research(task, &heading, Some(&context), task.source)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                let message = format!("Error researching section {heading}: {e}");
                warn!(section = %heading, error = %e, "Section research failed");
                self.ctx.log(AGENT, message.clone());
                return SectionDraft::failed(heading, message);
            }
        };

        let mut subsections = Vec::new();
        for sub in &section.subsections {
            let sub_heading = sub.heading.trim();
            if sub_heading.is_empty() {
                continue;
            }
            let sub_context = SectionContext {
                section_heading: sub_heading.to_string(),
                previous_sections: vec![],
                ..context.clone()
            };
            match self
                .research(task, sub_heading, Some(&sub_context), task.source)
                .await
            {
                Ok(report) => subsections.push(SectionDraft {
                    heading: sub_heading.to_string(),
                    content: report.content.clone(),
                    research: Some(report),
                    ..Default::default()
                }),
                Err(e) => {
                    warn!(subsection = %sub_heading, error = %e, "Failed to research subsection");
                }
            }
        }

        SectionDraft {
            heading,
            content: report.content.clone(),
            research: Some(report),
            subsections,
            error: None,
        }
    }

    /// Draft-graph node: research the state's topic.
    pub async fn run_depth_research(&self, state: &mut DraftState) -> Result<()> {
        let topic = state
            .topic()
            .map(str::to_string)
            .ok_or_else(|| PenwrightError::MissingTopic(draft_keys(state)))?;

        let mut section = state.section.clone();
        section.heading = topic;
        state.draft = self
            .run_section_research(&state.task, &section, &state.metadata, &state.previous_sections)
            .await;
        Ok(())
    }
}

fn draft_keys(state: &DraftState) -> String {
    let mut keys = vec!["task", "metadata", "section", "previous_sections"];
    if state.topic.is_some() {
        keys.push("topic");
    }
    keys.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_core::article::PlanSubsection;
    use penwright_core::event::EventBus;
    use penwright_test_utils::{hit, test_app_config, MockSearcher, ScriptedLlm};

    fn researcher(llm: ScriptedLlm, searcher: MockSearcher) -> Researcher {
        Researcher::new(Arc::new(PipelineContext::new(
            test_app_config(Path::new("reports")),
            Arc::new(llm),
            Arc::new(searcher),
            Arc::new(EventBus::default()),
        )))
    }

    #[tokio::test]
    async fn web_research_includes_hits_and_sources() {
        let llm = Arc::new(ScriptedLlm::new(vec!["Summary of findings"]));
        let searcher = MockSearcher::new().with_hits("borrow", vec![hit("borrow checker")]);
        let r = Researcher::new(Arc::new(PipelineContext::new(
            test_app_config(Path::new("reports")),
            llm.clone(),
            Arc::new(searcher),
            Arc::new(EventBus::default()),
        )));

        let report = r
            .research(&Task::new("q"), "borrow checker", None, ResearchSource::Web)
            .await
            .unwrap();
        assert_eq!(report.content, "Summary of findings");
        assert_eq!(report.query, "borrow checker");
        assert_eq!(report.source, "web");
        assert_eq!(report.sources, vec!["https://example.com/borrow-checker"]);

        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("Background material on borrow checker."));
    }

    #[tokio::test]
    async fn search_failure_is_research_error() {
        let r = researcher(
            ScriptedLlm::new(vec!["unused"]),
            MockSearcher::new().failing_on("down"),
        );
        let err = r
            .research(&Task::new("q"), "down", None, ResearchSource::Web)
            .await
            .unwrap_err();
        assert!(matches!(err, PenwrightError::Research { query, .. } if query == "down"));
    }

    #[tokio::test]
    async fn local_research_ranks_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Tokio runtime internals and scheduling").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Gardening tips").unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec!["Local summary"]));
        let r = Researcher::new(Arc::new(PipelineContext::new(
            test_app_config(Path::new("reports")),
            llm.clone(),
            Arc::new(MockSearcher::new()),
            Arc::new(EventBus::default()),
        )));
        let mut task = Task::new("tokio");
        task.source = ResearchSource::Local;
        task.doc_path = Some(dir.path().display().to_string());

        let report = r
            .research(&task, "tokio scheduling", None, ResearchSource::Local)
            .await
            .unwrap();
        assert_eq!(report.source, "local");
        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("Tokio runtime internals"));
        assert!(!prompt.contains("Gardening"));

        let err = r
            .research(&task, "unrelated zebra", None, ResearchSource::Local)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("match the query"));
    }

    #[tokio::test]
    async fn initial_research_sets_provisional_metadata() {
        let r = researcher(ScriptedLlm::new(vec!["Overview"]), MockSearcher::new());
        let mut state = ResearchState::new(
            penwright_core::RunId::new(),
            Task::new("Rust in embedded"),
            "out".into(),
        );
        r.run_initial_research(&mut state).await.unwrap();
        assert_eq!(state.initial_research.unwrap().content, "Overview");
        assert_eq!(state.plan.metadata.title, "Rust in embedded");
        assert_eq!(state.plan.metadata.date, Some(today()));
    }

    #[tokio::test]
    async fn section_research_covers_subsections_and_skips_failures() {
        let llm = ScriptedLlm::new(Vec::<String>::new()).with_fallback("Researched text");
        let searcher = MockSearcher::new().failing_on("Broken");
        let r = researcher(llm, searcher);
        let mut section = PlanSection::new("Ownership");
        section.subsections = vec![
            PlanSubsection { heading: "Moves".into() },
            PlanSubsection { heading: "  ".into() },
            PlanSubsection { heading: "Broken sub".into() },
        ];
        let metadata = ArticleMetadata {
            title: "Rust".into(),
            ..Default::default()
        };

        let draft = r
            .run_section_research(&Task::new("Rust"), &section, &metadata, &["Intro".into()])
            .await;
        assert!(!draft.is_failed());
        assert_eq!(draft.content, "Researched text");
        assert_eq!(draft.subsections.len(), 1);
        assert_eq!(draft.subsections[0].heading, "Moves");
    }

    #[tokio::test]
    async fn failed_section_carries_error() {
        let r = researcher(
            ScriptedLlm::new(Vec::<String>::new()),
            MockSearcher::new().failing_on("Ownership"),
        );
        let draft = r
            .run_section_research(
                &Task::new("Rust"),
                &PlanSection::new("Ownership"),
                &ArticleMetadata::default(),
                &[],
            )
            .await;
        assert!(draft.is_failed());
        assert_eq!(draft.heading, "Ownership");
        assert!(draft.error.unwrap().contains("Error researching section Ownership"));
    }

    #[tokio::test]
    async fn depth_research_needs_a_topic() {
        let r = researcher(ScriptedLlm::new(vec!["x"]), MockSearcher::new());
        let mut state = DraftState::new(
            Task::new("q"),
            ArticleMetadata::default(),
            PlanSection::new(""),
            vec![],
        );
        state.topic = None;
        let err = r.run_depth_research(&mut state).await.unwrap_err();
        assert!(matches!(err, PenwrightError::MissingTopic(_)));
    }

    #[tokio::test]
    async fn depth_research_prefers_topic_over_heading() {
        let r = researcher(
            ScriptedLlm::new(Vec::<String>::new()).with_fallback("Body"),
            MockSearcher::new(),
        );
        let mut state = DraftState::new(
            Task::new("q"),
            ArticleMetadata::default(),
            PlanSection::new("Heading"),
            vec![],
        );
        state.topic = Some("Specific topic".into());
        r.run_depth_research(&mut state).await.unwrap();
        assert_eq!(state.draft.heading, "Specific topic");
        assert_eq!(state.draft.content, "Body");
    }
}
