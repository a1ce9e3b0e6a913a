use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use penwright_core::article::{ArticleMetadata, ArticlePlan, PlanContent};
use penwright_core::error::{PenwrightError, Result};
use penwright_core::types::{ResponseFormat, SectionDraft};

use crate::agents::{Researcher, Reviewer, Reviser};
use crate::context::{today, PipelineContext};
use crate::graph::{Edge, ExecutionResult, GraphExecutor, Node, END};
use crate::output_validator::{parse_value, OutputValidator, ValidationResult};
use crate::state::{DraftState, ResearchState, ACCEPT, REVIEW, REVISE};

const AGENT: &str = "EDITOR";

const REQUIRED_SECTIONS: [&str; 3] = ["introduction", "main_content", "conclusion"];

const SYSTEM_PROMPT: &str = r#"You are an editor and content architect. Your goal is to oversee the article
creation process from inception to completion by planning a clear and engaging structure based on the
topic, target audience and purpose (informative, persuasive, tutorial).

Key responsibilities:
1. Define structure: outline sections tailored to the article type.
2. Audience alignment: match tone and depth to the readers' expertise.
3. Purpose clarity: make clear whether the article informs, persuades, entertains or instructs.
4. SEO and readability: suggest clear headings and subheadings.
5. Content quality: describe key points, ideas and questions for every section.

Return JSON matching this structure:
{
  "metadata": {"title": "string", "description": "string", "tags": ["string"]},
  "content": {
    "introduction": {"hook": "string", "context": "string", "thesis": "string"},
    "main_content": [{"heading": "string", "content": "string", "subsections": [{"heading": "string"}]}],
    "conclusion": {"summary": "string", "call_to_action": "string"}
  }
}"#;

/// Plans the article and runs per-section research in parallel.
#[derive(Clone)]
pub struct Editor {
    ctx: Arc<PipelineContext>,
    researcher: Researcher,
    reviewer: Reviewer,
    reviser: Reviser,
}

impl Editor {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            researcher: Researcher::new(ctx.clone()),
            reviewer: Reviewer::new(ctx.clone()),
            reviser: Reviser::new(ctx.clone()),
            ctx,
        }
    }

    fn planning_prompt(state: &ResearchState) -> String {
        let task = &state.task;
        let guidelines = if task.guidelines.is_empty() {
            "None".to_string()
        } else {
            task.guidelines.join("; ")
        };
        let feedback = match (&state.human_feedback, task.include_human_feedback) {
            (Some(feedback), true) => feedback.as_str(),
            _ => "None",
        };
        let research = state
            .initial_research
            .as_ref()
            .map(|r| r.content.as_str())
            .unwrap_or_default();

        format!(
            "Today's date is {}.\nTopic: {}\n\nTask parameters:\n\
             - Audience: {}\n- Tone: {}\n- Word count: {}\n- Guidelines: {}\n\n\
             Initial research:\n{}\n\nHuman feedback:\n{}\n\n\
             Generate a content structure with {} main sections.",
            today(),
            task.query,
            task.audience.as_deref().unwrap_or("general"),
            task.tone.as_deref().unwrap_or("neutral"),
            task.word_count
                .map(|w| w.to_string())
                .unwrap_or_else(|| "flexible".into()),
            guidelines,
            research,
            feedback,
            task.max_sections,
        )
    }

    /// Main-graph node: ask the model for the article outline.
    pub async fn plan_research(&self, state: &mut ResearchState) -> Result<()> {
        self.ctx
            .log(AGENT, "Planning research content structure...");
        let raw = self
            .ctx
            .ask(
                &state.task,
                SYSTEM_PROMPT,
                Self::planning_prompt(state),
                ResponseFormat::Json,
            )
            .await?;
        let plan = build_plan(&raw, state.task.max_sections)?;

        info!(
            title = %plan.metadata.title,
            sections = plan.content.main_content.len(),
            "Plan ready"
        );
        if state.task.verbose {
            let headings: Vec<&str> = plan
                .content
                .main_content
                .iter()
                .map(|s| s.heading.as_str())
                .collect();
            self.ctx
                .log(AGENT, format!("Planned sections: {headings:?}"));
        }
        state.plan = plan;
        Ok(())
    }

    /// Per-section graph: researcher, then reviewer and reviser until accepted.
    pub fn draft_graph(&self) -> GraphExecutor<DraftState> {
        let max_revisions = self.ctx.config.pipeline.max_revisions as usize;

        let researcher = self.researcher.clone();
        let reviewer = self.reviewer.clone();
        let reviser = self.reviser.clone();

        let nodes = vec![
            Node::from_fn("researcher", "Section researcher", move |state: &mut DraftState| {
                let researcher = researcher.clone();
                Box::pin(async move { researcher.run_depth_research(state).await })
            }),
            Node::from_fn("reviewer", "Reviewer", move |state: &mut DraftState| {
                let reviewer = reviewer.clone();
                Box::pin(async move { reviewer.run(state).await })
            })
            .with_max_visits(max_revisions + 1),
            Node::from_fn("reviser", "Reviser", move |state: &mut DraftState| {
                let reviser = reviser.clone();
                Box::pin(async move { reviser.run(state).await })
            })
            .with_max_visits(max_revisions.max(1)),
        ];
        let edges = vec![
            Edge::on_success("researcher", "reviewer"),
            Edge::conditional("reviewer", END, format!(r#"{REVIEW} == "{ACCEPT}""#)),
            Edge::conditional("reviewer", "reviser", format!(r#"{REVIEW} == "{REVISE}""#)),
            Edge::on_success("reviser", "reviewer"),
        ];
        GraphExecutor::new(nodes, edges, "researcher")
    }

    /// Main-graph node: research every planned section concurrently.
    pub async fn run_parallel_research(&self, state: &mut ResearchState) -> Result<()> {
        let sections = state.plan.content.main_content.clone();
        if sections.is_empty() {
            return Err(PenwrightError::InvalidPlan(
                "No main content sections found for research".into(),
            ));
        }
        let headings: Vec<String> = sections.iter().map(|s| s.heading.clone()).collect();
        self.ctx.log(
            AGENT,
            format!("Running parallel research for the following queries: {headings:?}"),
        );

        let graph = self.draft_graph();
        let permits = Semaphore::new(self.ctx.config.pipeline.max_parallel_sections.max(1));
        let metadata: &ArticleMetadata = &state.plan.metadata;

        let runs: Vec<_> = sections
            .into_iter()
            .enumerate()
            .map(|(idx, section)| {
                let draft_state = DraftState::new(
                    state.task.clone(),
                    metadata.clone(),
                    section,
                    headings[..idx].to_vec(),
                );
                let graph = &graph;
                let permits = &permits;
                async move {
                    let _permit = permits
                        .acquire()
                        .await
                        .map_err(|e| PenwrightError::Workflow(e.to_string()))?;
                    graph.execute(draft_state).await.map(finish_draft)
                }
            })
            .collect();

        let drafts = join_all(runs)
            .await
            .into_iter()
            .collect::<Result<Vec<SectionDraft>>>()?;

        let failed = drafts.iter().filter(|d| d.is_failed()).count();
        if failed > 0 {
            warn!(failed, total = drafts.len(), "Some sections could not be researched");
        }
        state.sections = drafts;
        Ok(())
    }
}

/// Validate the outline JSON and normalise its metadata.
fn build_plan(raw: &str, max_sections: usize) -> Result<ArticlePlan> {
    let value = parse_value(raw).map_err(|e| PenwrightError::InvalidPlan(e.to_string()))?;
    let content = value.get("content").cloned().unwrap_or(Value::Null);
    if let ValidationResult::Invalid { issues } =
        OutputValidator::new(REQUIRED_SECTIONS).validate(&content)
    {
        return Err(PenwrightError::InvalidPlan(format!(
            "Generated plan missing required sections: {}",
            issues.join("; ")
        )));
    }
    let mut content: PlanContent =
        serde_json::from_value(content).map_err(|e| PenwrightError::InvalidPlan(e.to_string()))?;
    if max_sections > 0 {
        content.main_content.truncate(max_sections);
    }

    let meta = &value["metadata"];
    let title = meta["title"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled")
        .to_string();
    let description = meta["description"].as_str().unwrap_or_default().to_string();
    let tags = meta["tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(ArticlePlan {
        metadata: ArticleMetadata {
            title,
            date: Some(today()),
            description: Some(description),
            tags,
            ..Default::default()
        },
        content,
    })
}

/// Final draft of a section run. A failed run keeps whatever was drafted.
fn finish_draft(result: ExecutionResult<DraftState>) -> SectionDraft {
    let failure = result
        .failed_node()
        .map(|n| format!("{} failed: {}", n.node_id, n.error.clone().unwrap_or_default()));
    let heading = result.state.section.heading.clone();
    let mut draft = result.state.draft;
    if draft.heading.is_empty() {
        draft.heading = heading;
    }
    if let Some(failure) = failure {
        if draft.content.is_empty() && draft.error.is_none() {
            draft.error = Some(failure);
        } else {
            warn!(section = %draft.heading, error = %failure, "Keeping last good draft");
        }
    }
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_core::event::EventBus;
    use penwright_core::types::ResearchReport;
    use penwright_core::{RunId, Task};
    use penwright_test_utils::{plan_json, test_app_config, MockSearcher, ScriptedLlm};
    use std::path::Path;

    fn editor(llm: Arc<ScriptedLlm>, searcher: MockSearcher) -> Editor {
        Editor::new(Arc::new(PipelineContext::new(
            test_app_config(Path::new("reports")),
            llm,
            Arc::new(searcher),
            Arc::new(EventBus::default()),
        )))
    }

    fn state(task: Task) -> ResearchState {
        let mut state = ResearchState::new(RunId::new(), task, "out".into());
        state.initial_research = Some(ResearchReport::new("q", "web", "Initial findings"));
        state
    }

    #[test]
    fn plan_defaults_and_section_cap() {
        let raw = r#"{"metadata": {}, "content": {
            "introduction": {}, "conclusion": {},
            "main_content": [{"heading": "A"}, {"heading": "B"}, {"heading": "C"}]}}"#;
        let plan = build_plan(raw, 2).unwrap();
        assert_eq!(plan.metadata.title, "Untitled");
        assert_eq!(plan.metadata.date, Some(today()));
        assert_eq!(plan.metadata.description.as_deref(), Some(""));
        assert!(plan.metadata.tags.is_empty());
        assert_eq!(plan.content.main_content.len(), 2);
    }

    #[test]
    fn plan_missing_sections_is_rejected() {
        let raw = r#"{"metadata": {"title": "T"}, "content": {"introduction": {}, "main_content": []}}"#;
        let err = build_plan(raw, 3).unwrap_err();
        match err {
            PenwrightError::InvalidPlan(msg) => assert!(msg.contains("conclusion")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(build_plan("not json", 3).is_err());
    }

    #[tokio::test]
    async fn planning_uses_feedback_only_when_enabled() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            plan_json("Async Rust", &["Futures", "Executors"]),
            plan_json("Async Rust", &["Futures"]),
        ]));
        let ed = editor(llm.clone(), MockSearcher::new());

        let mut task = Task::new("async rust");
        task.audience = Some("backend engineers".into());
        let mut s = state(task);
        s.human_feedback = Some("focus on tokio".into());
        ed.plan_research(&mut s).await.unwrap();
        assert_eq!(s.plan.metadata.title, "Async Rust");
        assert_eq!(s.plan.content.main_content.len(), 2);

        let first = &llm.requests()[0][1].content;
        assert!(first.contains("backend engineers"));
        assert!(first.contains("Initial findings"));
        assert!(!first.contains("focus on tokio"));

        s.task.include_human_feedback = true;
        ed.plan_research(&mut s).await.unwrap();
        let second = &llm.requests()[1][1].content;
        assert!(second.contains("focus on tokio"));
    }

    #[tokio::test]
    async fn parallel_research_keeps_section_order() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()).with_fallback("Section text"));
        let ed = editor(llm, MockSearcher::new());
        let mut s = state(Task::new("q"));
        s.plan = build_plan(&plan_json("T", &["One", "Two", "Three"]), 3).unwrap();

        ed.run_parallel_research(&mut s).await.unwrap();
        let headings: Vec<&str> = s.sections.iter().map(|d| d.heading.as_str()).collect();
        assert_eq!(headings, vec!["One", "Two", "Three"]);
        assert!(s.sections.iter().all(|d| d.content == "Section text"));
    }

    #[tokio::test]
    async fn failed_section_does_not_fail_the_run() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()).with_fallback("ok"));
        let ed = editor(llm, MockSearcher::new().failing_on("Two"));
        let mut s = state(Task::new("q"));
        s.plan = build_plan(&plan_json("T", &["One", "Two"]), 3).unwrap();

        ed.run_parallel_research(&mut s).await.unwrap();
        assert!(!s.sections[0].is_failed());
        assert!(s.sections[1].is_failed());
    }

    #[tokio::test]
    async fn review_loop_revises_until_accepted() {
        let llm = Arc::new(
            ScriptedLlm::new(Vec::<String>::new())
                .route("revising the following draft", r#"{"draft": "Better", "revision_notes": "fixed"}"#)
                .route("previous feedback", "None")
                .route("Evaluate the draft", "Needs an example")
                .with_fallback("Raw research"),
        );
        let ed = editor(llm, MockSearcher::new());
        let mut task = Task::new("q");
        task.follow_guidelines = true;
        let mut s = state(task);
        s.plan = build_plan(&plan_json("T", &["Only"]), 3).unwrap();

        ed.run_parallel_research(&mut s).await.unwrap();
        assert_eq!(s.sections[0].content, "Better");
    }

    #[tokio::test]
    async fn empty_plan_is_rejected() {
        let ed = editor(Arc::new(ScriptedLlm::new(Vec::<String>::new())), MockSearcher::new());
        let mut s = state(Task::new("q"));
        let err = ed.run_parallel_research(&mut s).await.unwrap_err();
        assert!(matches!(err, PenwrightError::InvalidPlan(_)));
    }
}
