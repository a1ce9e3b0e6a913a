use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::{info, warn};

use penwright_core::article::ArticlePlan;
use penwright_core::error::{PenwrightError, Result};

use crate::context::PipelineContext;
use crate::state::{ResearchState, ACCEPT, PLAN_REVIEW, REVISE};

const AGENT: &str = "HUMAN";

/// Source of plan feedback. A reply of `no` (or nothing) accepts the plan.
pub trait PlanReviewer: Send + Sync {
    fn review<'a>(&'a self, plan: &'a ArticlePlan) -> BoxFuture<'a, Result<String>>;
}

/// Prompts on the terminal.
pub struct ConsoleReviewer;

impl PlanReviewer for ConsoleReviewer {
    fn review<'a>(&'a self, plan: &'a ArticlePlan) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let outline = serde_json::to_string_pretty(plan)?;
            tokio::task::spawn_blocking(move || {
                println!("\nProposed outline:\n{outline}\n");
                dialoguer::Input::<String>::new()
                    .with_prompt("Any feedback on this plan? (reply 'no' to accept)")
                    .allow_empty(true)
                    .interact_text()
                    .map_err(|e| PenwrightError::Review(e.to_string()))
            })
            .await
            .map_err(|e| PenwrightError::Review(e.to_string()))?
        })
    }
}

/// Accepts every plan. Used for unattended runs.
pub struct AutoApprove;

impl PlanReviewer for AutoApprove {
    fn review<'a>(&'a self, _plan: &'a ArticlePlan) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Ok("no".to_string()) })
    }
}

/// Replays canned replies, then accepts.
#[derive(Default)]
pub struct ScriptedReviewer {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedReviewer {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }
}

impl PlanReviewer for ScriptedReviewer {
    fn review<'a>(&'a self, _plan: &'a ArticlePlan) -> BoxFuture<'a, Result<String>> {
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| "no".to_string());
        Box::pin(async move { Ok(reply) })
    }
}

/// `None` when the reply accepts the plan.
pub fn interpret_feedback(reply: &str) -> Option<String> {
    let reply = reply.trim();
    if reply.is_empty() || reply.eq_ignore_ascii_case("no") {
        None
    } else {
        Some(reply.to_string())
    }
}

/// Human-in-the-loop review of the editor's plan.
pub struct HumanAgent {
    ctx: Arc<PipelineContext>,
    reviewer: Arc<dyn PlanReviewer>,
}

impl HumanAgent {
    pub fn new(ctx: Arc<PipelineContext>, reviewer: Arc<dyn PlanReviewer>) -> Self {
        Self { ctx, reviewer }
    }

    /// Main-graph node: sets `plan_review` to accept or revise.
    pub async fn review_plan(&self, state: &mut ResearchState) -> Result<()> {
        let feedback = if !state.task.include_human_feedback {
            None
        } else if state.plan_revisions >= self.ctx.config.pipeline.max_plan_revisions {
            warn!(
                revisions = state.plan_revisions,
                "Plan revision limit reached, accepting plan"
            );
            None
        } else {
            self.ctx.log(AGENT, "Awaiting human feedback...");
            let reply = self.reviewer.review(&state.plan).await?;
            interpret_feedback(&reply)
        };

        match feedback {
            Some(feedback) => {
                info!(revision = state.plan_revisions + 1, "Plan sent back to the editor");
                self.ctx
                    .log(AGENT, format!("Human feedback: {feedback}"));
                state.human_feedback = Some(feedback);
                state.plan_revisions += 1;
                state.signals.set_str(PLAN_REVIEW, REVISE);
            }
            None => {
                state.human_feedback = None;
                state.signals.set_str(PLAN_REVIEW, ACCEPT);
            }
        }
        Ok(())
    }
}
