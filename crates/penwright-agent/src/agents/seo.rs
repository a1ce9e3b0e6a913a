use std::sync::Arc;

use tracing::info;

use penwright_core::article::SeoMetadata;
use penwright_core::error::Result;
use penwright_core::types::ResponseFormat;
use penwright_tools::slugify;

use crate::context::PipelineContext;
use crate::output_validator::parse_json;
use crate::state::ResearchState;

const AGENT: &str = "SEO";

const SYSTEM_PROMPT: &str = "You are an SEO specialist. You optimise published articles for search \
engines without changing their meaning.";

/// Optional pass producing search-engine metadata for the article.
#[derive(Clone)]
pub struct SeoAgent {
    ctx: Arc<PipelineContext>,
}

impl SeoAgent {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    fn seo_prompt(state: &ResearchState) -> Result<String> {
        let headers = serde_json::to_string_pretty(&state.headers)?;
        let headings: Vec<&str> = state
            .article
            .iter()
            .flat_map(|a| a.content.main_content.iter().map(|s| s.heading.as_str()))
            .collect();
        Ok(format!(
            "Produce SEO metadata for this article.\nTopic: {}\nHeaders:\n{headers}\n\
             Section headings: {}\n\n\
             Return nothing but a JSON object with the keys slug, focus_keyword, \
             secondary_keywords, meta_title (under 60 characters), meta_description \
             (under 160 characters), schema_type, internal_links and alt_texts.",
            state.task.query,
            headings.join(", "),
        ))
    }

    /// Main-graph node: stores normalised SEO metadata on the state.
    pub async fn run(&self, state: &mut ResearchState) -> Result<()> {
        self.ctx.log(AGENT, "Optimising article metadata for search...");
        let raw = self
            .ctx
            .ask(
                &state.task,
                SYSTEM_PROMPT,
                Self::seo_prompt(state)?,
                ResponseFormat::Json,
            )
            .await?;
        let mut seo: SeoMetadata = parse_json(&raw)?;

        let base = if seo.slug.trim().is_empty() {
            state.title().to_string()
        } else {
            seo.slug.clone()
        };
        seo.slug = slugify(&base);
        info!(slug = %seo.slug, keyword = %seo.focus_keyword, "SEO metadata ready");
        state.seo = Some(seo);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_core::article::Headers;
    use penwright_core::event::EventBus;
    use penwright_core::{RunId, Task};
    use penwright_test_utils::{test_app_config, MockSearcher, ScriptedLlm};

    fn agent(llm: ScriptedLlm) -> SeoAgent {
        SeoAgent::new(Arc::new(PipelineContext::new(
            test_app_config(std::path::Path::new("reports")),
            Arc::new(llm),
            Arc::new(MockSearcher::new()),
            Arc::new(EventBus::default()),
        )))
    }

    fn state() -> ResearchState {
        let mut state = ResearchState::new(RunId::new(), Task::new("q"), "out".into());
        state.headers = Some(Headers {
            title: "Async Rust: A Field Guide".into(),
            ..Default::default()
        });
        state
    }

    #[tokio::test]
    async fn slug_is_normalised() {
        let llm = ScriptedLlm::new(vec![
            r#"{"slug": "Async Rust_Field Guide!", "focus_keyword": "async rust", "secondary_keywords": ["tokio"]}"#,
        ]);
        let mut s = state();
        agent(llm).run(&mut s).await.unwrap();
        let seo = s.seo.unwrap();
        assert_eq!(seo.slug, "async-rust-field-guide");
        assert_eq!(seo.secondary_keywords, vec!["tokio".to_string()]);
    }

    #[tokio::test]
    async fn missing_slug_comes_from_title() {
        let mut s = state();
        agent(ScriptedLlm::new(vec![r#"{"focus_keyword": "async"}"#]))
            .run(&mut s)
            .await
            .unwrap();
        assert_eq!(s.seo.unwrap().slug, "async-rust-a-field-guide");
    }
}
