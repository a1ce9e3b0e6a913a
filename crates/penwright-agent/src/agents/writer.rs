use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use penwright_core::article::{Article, Headers, SAMPLE_ARTICLE_JSON};
use penwright_core::error::{PenwrightError, Result};
use penwright_core::types::{ResponseFormat, SectionDraft};
use penwright_core::Task;

use crate::context::{today, PipelineContext};
use crate::output_validator::{parse_article, parse_json};
use crate::state::{ResearchState, SEO};

const AGENT: &str = "WRITER";

const SYSTEM_PROMPT: &str = "You are a research writer. Your sole purpose is to write a well-written \
research report about a topic based on research findings and information.";

/// Turns the researched sections into the final article.
#[derive(Clone)]
pub struct Writer {
    ctx: Arc<PipelineContext>,
}

/// What the writer sees of one researched section.
#[derive(Serialize)]
struct ResearchData<'a> {
    heading: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subsections: Vec<ResearchData<'a>>,
}

impl<'a> ResearchData<'a> {
    fn from_draft(draft: &'a SectionDraft) -> Self {
        Self {
            heading: &draft.heading,
            content: &draft.content,
            sources: draft
                .research
                .iter()
                .flat_map(|r| r.sources.iter().map(String::as_str))
                .collect(),
            subsections: draft
                .subsections
                .iter()
                .filter(|s| !s.is_failed())
                .map(Self::from_draft)
                .collect(),
        }
    }
}

impl Writer {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    fn article_prompt(state: &ResearchState) -> Result<String> {
        let data: Vec<ResearchData<'_>> = state
            .sections
            .iter()
            .filter(|s| !s.is_failed())
            .map(ResearchData::from_draft)
            .collect();
        let research = serde_json::to_string_pretty(&data)?;

        let guidelines = if state.task.follow_guidelines && !state.task.guidelines.is_empty() {
            format!(
                "You must follow the guidelines provided: {}\n",
                state.task.guidelines.join("; ")
            )
        } else {
            String::new()
        };
        Ok(format!(
            "Today's date is {}.\nTopic: {}\nTitle: {}\n\nResearch data:\n{research}\n\n\
             Your task is to write an in-depth, well-written and detailed article on the topic \
             using the research data above. {guidelines}\
             Return nothing but a JSON object matching this layout:\n{SAMPLE_ARTICLE_JSON}",
            today(),
            state.task.query,
            state.title(),
        ))
    }

    /// Ask for the article, retrying malformed JSON. Returns the last error.
    pub async fn write_sections(&self, state: &ResearchState) -> Result<Article> {
        let prompt = Self::article_prompt(state)?;
        let attempts = self.ctx.config.pipeline.llm_json_retries.max(1);
        let mut last_err = PenwrightError::InvalidArticle("no attempt made".into());

        for attempt in 1..=attempts {
            let raw = self
                .ctx
                .ask(&state.task, SYSTEM_PROMPT, prompt.clone(), ResponseFormat::Json)
                .await?;
            match parse_article(&raw) {
                Ok(article) => return Ok(article),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Writer returned an invalid article");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Front-matter headers from the article, falling back to the plan.
    pub fn get_headers(state: &ResearchState, article: &Article) -> Result<Headers> {
        let plan = &state.plan.metadata;
        let title = Some(article.metadata.title.trim())
            .filter(|t| !t.is_empty())
            .or_else(|| Some(plan.title.trim()).filter(|t| !t.is_empty()))
            .ok_or_else(|| PenwrightError::InvalidHeaders("article has no title".into()))?
            .to_string();

        let description = article
            .metadata
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| plan.description.clone())
            .unwrap_or_default();
        let tags = if article.metadata.tags.is_empty() {
            plan.tags.clone()
        } else {
            article.metadata.tags.clone()
        };
        let author = state
            .task
            .author
            .clone()
            .or_else(|| article.metadata.author.clone())
            .filter(|a| !a.trim().is_empty());

        Ok(Headers {
            title,
            date: today(),
            description,
            tags,
            author,
        })
    }

    /// Rewrite the headers so they follow the task guidelines.
    pub async fn revise_headers(&self, task: &Task, headers: &Headers) -> Result<Headers> {
        let prompt = format!(
            "Your task is to revise the following headers according to the guidelines.\n\
             Guidelines: {}\n\nHeaders:\n{}\n\n\
             Return nothing but a JSON object with the keys title, date, description, tags and author.",
            task.guidelines.join("; "),
            serde_json::to_string_pretty(headers)?
        );
        let raw = self
            .ctx
            .ask(task, SYSTEM_PROMPT, prompt, ResponseFormat::Json)
            .await?;
        let revised: Headers =
            parse_json(&raw).map_err(|e| PenwrightError::InvalidHeaders(e.to_string()))?;
        if revised.title.trim().is_empty() {
            return Err(PenwrightError::InvalidHeaders(
                "revised headers have no title".into(),
            ));
        }
        Ok(revised)
    }

    /// Main-graph node: article, headers, and the SEO routing signal.
    pub async fn run(&self, state: &mut ResearchState) -> Result<()> {
        self.ctx.log(AGENT, "Writing final research report...");
        let article = self.write_sections(state).await?;
        let mut headers = Self::get_headers(state, &article)?;

        if state.task.follow_guidelines {
            self.ctx
                .log(AGENT, "Rewriting layout based on guidelines...");
            headers = self.revise_headers(&state.task, &headers).await?;
        }
        let missing = headers.missing_fields();
        if !missing.is_empty() {
            warn!(?missing, "Front matter has blank fields");
        }
        info!(title = %headers.title, sections = article.content.main_content.len(), "Article written");

        if state.task.seo {
            state.signals.set_str(SEO, "enabled");
        }
        state.article = Some(article);
        state.headers = Some(headers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_core::event::EventBus;
    use penwright_core::RunId;
    use penwright_test_utils::{article_json, test_app_config, MockSearcher, ScriptedLlm};

    fn writer(llm: Arc<ScriptedLlm>) -> Writer {
        Writer::new(Arc::new(PipelineContext::new(
            test_app_config(std::path::Path::new("reports")),
            llm,
            Arc::new(MockSearcher::new()),
            Arc::new(EventBus::default()),
        )))
    }

    fn state() -> ResearchState {
        let mut state = ResearchState::new(RunId::new(), Task::new("rust errors"), "out".into());
        state.plan.metadata.title = "Plan title".into();
        state.plan.metadata.description = Some("Plan description".into());
        state.plan.metadata.tags = vec!["plan".into()];
        state.sections = vec![
            SectionDraft {
                heading: "Basics".into(),
                content: "Result and Option".into(),
                ..Default::default()
            },
            SectionDraft::failed("Broken", "search down"),
        ];
        state
    }

    #[tokio::test]
    async fn retries_until_valid_article() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "not json at all".to_string(),
            r#"{"metadata": {"title": "x"}}"#.to_string(),
            article_json("Errors in Rust", &["Basics"]),
        ]));
        let article = writer(llm.clone()).write_sections(&state()).await.unwrap();
        assert_eq!(article.metadata.title, "Errors in Rust");
        assert_eq!(llm.call_count(), 3);

        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("Result and Option"));
        assert!(!prompt.contains("Broken"));
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()).with_fallback("{}"));
        let err = writer(llm.clone()).write_sections(&state()).await.unwrap_err();
        assert!(matches!(err, PenwrightError::InvalidArticle(_)));
        assert_eq!(llm.call_count(), 3);
    }

    #[test]
    fn headers_fall_back_to_plan() {
        let mut s = state();
        s.task.author = Some("Ada".into());
        let mut article = parse_article(&article_json("", &["Basics"])).unwrap();
        article.metadata.description = None;
        article.metadata.tags.clear();

        let headers = Writer::get_headers(&s, &article).unwrap();
        assert_eq!(headers.title, "Plan title");
        assert_eq!(headers.description, "Plan description");
        assert_eq!(headers.tags, vec!["plan".to_string()]);
        assert_eq!(headers.author.as_deref(), Some("Ada"));
        assert_eq!(headers.date, today());

        s.plan.metadata.title.clear();
        assert!(Writer::get_headers(&s, &article).is_err());
    }

    #[tokio::test]
    async fn run_revises_headers_and_signals_seo() {
        let llm = Arc::new(
            ScriptedLlm::new(Vec::<String>::new())
                .route("revise the following headers", r#"{"title": "Sharper title", "description": "d"}"#)
                .with_fallback(article_json("Errors", &["Basics"])),
        );
        let mut s = state();
        s.task.follow_guidelines = true;
        s.task.guidelines = vec!["Title under 40 chars".into()];
        s.task.seo = true;

        writer(llm).run(&mut s).await.unwrap();
        assert_eq!(s.headers.as_ref().unwrap().title, "Sharper title");
        assert!(s.article.is_some());
        assert_eq!(s.signals.get_str(SEO), Some("enabled"));
    }

    #[tokio::test]
    async fn untitled_header_revision_is_rejected() {
        let llm = Arc::new(ScriptedLlm::new(vec![r#"{"title": " "}"#]));
        let headers = Headers {
            title: "T".into(),
            ..Default::default()
        };
        let err = writer(llm)
            .revise_headers(&Task::new("q"), &headers)
            .await
            .unwrap_err();
        assert!(matches!(err, PenwrightError::InvalidHeaders(_)));
    }
}
