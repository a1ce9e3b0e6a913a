use std::sync::Arc;

use serde::Deserialize;

use penwright_core::error::Result;
use penwright_core::types::ResponseFormat;

use crate::context::PipelineContext;
use crate::output_validator::parse_json;
use crate::state::DraftState;

const AGENT: &str = "REVISOR";

const SYSTEM_PROMPT: &str = "You are an expert writer. \
Your goal is to revise drafts based on reviewer notes.";

#[derive(Debug, Deserialize)]
struct Revision {
    draft: String,
    #[serde(default)]
    revision_notes: String,
}

/// Rewrites a section draft according to the reviewer's notes.
#[derive(Clone)]
pub struct Reviser {
    ctx: Arc<PipelineContext>,
}

impl Reviser {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    fn revise_prompt(state: &DraftState) -> String {
        format!(
            "Draft:\n{}\n\nReviewer's notes:\n{}\n\n\
             You have been tasked by your reviewer with revising the following draft, \
             which was written by a non-expert. If you decide to follow the reviewer's notes, \
             please write a new draft and make sure to address all of the points they raised. \
             Please keep all other aspects of the draft the same.\n\
             You MUST return nothing but a JSON object in the following format:\n\
             {{\"draft\": \"<the revised draft>\", \"revision_notes\": \
             \"<message about the changes you made based on the reviewer's feedback>\"}}",
            state.draft.content,
            state.review.as_deref().unwrap_or_default()
        )
    }

    /// Draft-graph node: replace the draft content and record notes.
    pub async fn run(&self, state: &mut DraftState) -> Result<()> {
        self.ctx.log(AGENT, "Rewriting draft based on feedback...");
        let raw = self
            .ctx
            .ask(
                &state.task,
                SYSTEM_PROMPT,
                Self::revise_prompt(state),
                ResponseFormat::Json,
            )
            .await?;
        let revision: Revision = parse_json(&raw)?;

        if state.task.verbose {
            self.ctx.log(
                AGENT,
                format!("Revision notes: {}", revision.revision_notes),
            );
        }
        state.draft.content = revision.draft;
        state.revision_notes = Some(revision.revision_notes);
        state.revisions += 1;
        Ok(())
    }
}
