use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use penwright_core::error::Result;
use penwright_core::types::{PipelineEvent, RunId};
use penwright_core::Task;

use crate::agents::{AutoApprove, Editor, HumanAgent, PlanReviewer, Publisher, Researcher, SeoAgent, Writer};
use crate::context::PipelineContext;
use crate::graph::{Edge, GraphExecutor, Node, END};
use crate::state::{ResearchState, ACCEPT, PLAN_REVIEW, REVISE, SEO};

const AGENT: &str = "MASTER";

const QUERY_DIR_CHARS: usize = 40;

/// Output directory for a run: `run_<id>_<query prefix>` under `root`.
pub fn run_output_dir(root: &std::path::Path, run_id: &RunId, query: &str) -> PathBuf {
    let prefix: String = query
        .chars()
        .take(QUERY_DIR_CHARS)
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    root.join(format!("run_{}_{}", run_id.simple(), prefix))
}

/// Runs the whole pipeline for one task.
///
/// The main graph is `browser -> planner -> human`, looping back to the
/// planner while the human asks for changes, then
/// `researcher -> writer -> (seo ->) publisher`.
pub struct ChiefEditor {
    ctx: Arc<PipelineContext>,
    reviewer: Arc<dyn PlanReviewer>,
}

impl ChiefEditor {
    /// Plans are auto-approved unless a reviewer is set.
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            reviewer: Arc::new(AutoApprove),
        }
    }

    pub fn with_plan_reviewer(mut self, reviewer: Arc<dyn PlanReviewer>) -> Self {
        self.reviewer = reviewer;
        self
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    fn build_graph(&self) -> GraphExecutor<ResearchState> {
        let max_plan_revisions = self.ctx.config.pipeline.max_plan_revisions as usize;

        let researcher = Researcher::new(self.ctx.clone());
        let editor = Editor::new(self.ctx.clone());
        let planner = editor.clone();
        let human = Arc::new(HumanAgent::new(self.ctx.clone(), self.reviewer.clone()));
        let writer = Writer::new(self.ctx.clone());
        let seo = SeoAgent::new(self.ctx.clone());
        let publisher = Publisher::new(self.ctx.clone());

        let nodes = vec![
            Node::from_fn("browser", "Initial research", move |state: &mut ResearchState| {
                let researcher = researcher.clone();
                Box::pin(async move { researcher.run_initial_research(state).await })
            }),
            Node::from_fn("planner", "Editor planning", move |state: &mut ResearchState| {
                let planner = planner.clone();
                Box::pin(async move { planner.plan_research(state).await })
            })
            .with_max_visits(max_plan_revisions + 1),
            Node::from_fn("human", "Human plan review", move |state: &mut ResearchState| {
                let human = human.clone();
                Box::pin(async move { human.review_plan(state).await })
            })
            .with_max_visits(max_plan_revisions + 1),
            Node::from_fn("researcher", "Parallel section research", move |state: &mut ResearchState| {
                let editor = editor.clone();
                Box::pin(async move { editor.run_parallel_research(state).await })
            }),
            Node::from_fn("writer", "Writer", move |state: &mut ResearchState| {
                let writer = writer.clone();
                Box::pin(async move { writer.run(state).await })
            }),
            Node::from_fn("seo", "SEO", move |state: &mut ResearchState| {
                let seo = seo.clone();
                Box::pin(async move { seo.run(state).await })
            }),
            Node::from_fn("publisher", "Publisher", move |state: &mut ResearchState| {
                let publisher = publisher.clone();
                Box::pin(async move { publisher.run(state).await })
            }),
        ];

        let edges = vec![
            Edge::on_success("browser", "planner"),
            Edge::on_success("planner", "human"),
            Edge::conditional("human", "researcher", format!(r#"{PLAN_REVIEW} == "{ACCEPT}""#)),
            Edge::conditional("human", "planner", format!(r#"{PLAN_REVIEW} == "{REVISE}""#)),
            Edge::on_success("researcher", "writer"),
            // Checked before the plain success edge.
            Edge::conditional("writer", "seo", format!(r#"{SEO} == "enabled""#)),
            Edge::on_success("writer", "publisher"),
            Edge::on_success("seo", "publisher"),
            Edge::always("publisher", END),
        ];

        GraphExecutor::new(nodes, edges, "browser").with_events(self.ctx.event_bus.clone())
    }

    /// Run the pipeline and return the final state, or the failing node's error.
    pub async fn run_research_task(&self, task: Task) -> Result<ResearchState> {
        task.validate()?;
        let run_id = RunId::new();
        let output_dir = match task.output_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => run_output_dir(&self.ctx.config.output_root(), &run_id, &task.query),
        };
        let started_at = Utc::now();

        let bus = &self.ctx.event_bus;
        bus.publish(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
            query: task.query.clone(),
        });
        self.ctx.log(
            AGENT,
            format!("Starting the research process for query '{}'...", task.query),
        );
        info!(
            run_id = %run_id,
            team = task.team.as_deref().unwrap_or("default"),
            output_dir = %output_dir.display(),
            "Pipeline run started"
        );

        let state = ResearchState::new(run_id.clone(), task, output_dir.clone());
        let outcome = match self.build_graph().execute(state).await {
            Ok(result) => {
                info!(
                    run_id = %run_id,
                    path = ?result.path(),
                    elapsed_ms = result.total_elapsed_ms,
                    succeeded = result.succeeded,
                    "Pipeline graph finished"
                );
                result.into_state()
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => bus.publish(PipelineEvent::RunComplete {
                run_id,
                output_dir,
                started_at,
            }),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Pipeline run failed");
                bus.publish(PipelineEvent::RunError {
                    run_id,
                    error: e.to_string(),
                });
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn output_dir_is_sanitised_and_truncated() {
        let id = RunId::new();
        let dir = run_output_dir(
            Path::new("reports"),
            &id,
            "What is async/await in Rust? A very long query that keeps going",
        );
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        let prefix = format!("run_{}_", id.simple());
        assert!(name.starts_with(&prefix));
        let tail = &name[prefix.len()..];
        assert_eq!(tail, "What_is_asyncawait_in_Rust_A_very_long");
        assert!(dir.starts_with("reports"));
    }
}
