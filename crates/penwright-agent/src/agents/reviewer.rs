use std::sync::Arc;

use tracing::warn;

use penwright_core::error::Result;
use penwright_core::types::{PipelineEvent, ResponseFormat};

use crate::context::PipelineContext;
use crate::state::{DraftState, ACCEPT, REVIEW, REVISE};

const AGENT: &str = "REVIEWER";

const SYSTEM_PROMPT: &str = "You are an expert article reviewer. \
Your goal is to review research drafts and provide feedback to the reviser only based on specific guidelines.";

/// Accepts a section draft or sends it back with notes.
#[derive(Clone)]
pub struct Reviewer {
    ctx: Arc<PipelineContext>,
}

impl Reviewer {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    fn review_prompt(state: &DraftState) -> String {
        let guidelines = state
            .task
            .guidelines
            .iter()
            .map(|g| format!("- {g}"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = String::from(
            "Evaluate the draft on these criteria:\n\
             1. Clarity & Structure: is it logically organised with smooth transitions?\n\
             2. Audience Fit: does the tone match the target readers?\n\
             3. Engagement: does it hold interest with examples or storytelling?\n\
             4. Accuracy: are claims supported by the research?\n\
             5. Guideline Adherence: does it follow the guidelines below?\n\n\
             If the draft meets all criteria, reply with exactly `None`.\n\
             Otherwise reply with clear, actionable revision notes.\n",
        );
        if let Some(notes) = &state.revision_notes {
            prompt.push_str(&format!(
                "\nThe reviser already revised the draft based on your previous feedback: {notes}\n\
                 Provide additional feedback only if critical issues remain or the revision \
                 failed to address your notes. If only minor tweaks are needed, reply `None`.\n"
            ));
        }
        if let Some(audience) = &state.task.audience {
            prompt.push_str(&format!("\nAudience: {audience}"));
        }
        prompt.push_str(&format!(
            "\nGuidelines:\n{guidelines}\n\nSection: {}\nDraft:\n{}\n",
            state.draft.heading, state.draft.content
        ));
        prompt
    }

    /// Ask the model for a review. `None` means the draft is accepted.
    pub async fn review_draft(&self, state: &DraftState) -> Result<Option<String>> {
        let response = self
            .ctx
            .ask(
                &state.task,
                SYSTEM_PROMPT,
                Self::review_prompt(state),
                ResponseFormat::Text,
            )
            .await?;

        if state.task.verbose {
            self.ctx
                .log(AGENT, format!("Review feedback is: {response}..."));
        }
        if response.contains("None") {
            return Ok(None);
        }
        Ok(Some(response.trim().to_string()))
    }

    /// Draft-graph node: sets `review` and routes to accept or revise.
    pub async fn run(&self, state: &mut DraftState) -> Result<()> {
        let review = if state.draft.is_failed() {
            None
        } else if !state.task.follow_guidelines {
            self.ctx.log(AGENT, "Ignoring guidelines...");
            None
        } else if state.revisions >= self.ctx.config.pipeline.max_revisions {
            warn!(
                section = %state.draft.heading,
                revisions = state.revisions,
                "Revision limit reached, accepting draft"
            );
            None
        } else {
            self.ctx.log(AGENT, "Reviewing draft...");
            if state.task.verbose {
                self.ctx.log(
                    AGENT,
                    format!("Following guidelines {:?}...", state.task.guidelines),
                );
            }
            self.review_draft(state).await?
        };

        self.ctx.event_bus.publish(PipelineEvent::ReviewFeedback {
            section: state.draft.heading.clone(),
            feedback: review.clone(),
        });
        state
            .signals
            .set_str(REVIEW, if review.is_some() { REVISE } else { ACCEPT });
        state.review = review;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_core::article::{ArticleMetadata, PlanSection};
    use penwright_core::event::EventBus;
    use penwright_core::types::SectionDraft;
    use penwright_core::Task;
    use penwright_test_utils::{test_app_config, MockSearcher, ScriptedLlm};

    fn setup(llm: Arc<ScriptedLlm>) -> Reviewer {
        Reviewer::new(Arc::new(PipelineContext::new(
            test_app_config(std::path::Path::new("reports")),
            llm,
            Arc::new(MockSearcher::new()),
            Arc::new(EventBus::default()),
        )))
    }

    fn draft_state(follow_guidelines: bool) -> DraftState {
        let mut task = Task::new("q");
        task.follow_guidelines = follow_guidelines;
        task.guidelines = vec!["Use short paragraphs".into()];
        let mut state = DraftState::new(task, ArticleMetadata::default(), PlanSection::new("Intro"), vec![]);
        state.draft.content = "Draft body".into();
        state
    }

    #[tokio::test]
    async fn accepts_without_guidelines_and_skips_llm() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let reviewer = setup(llm.clone());
        let mut state = draft_state(false);
        reviewer.run(&mut state).await.unwrap();
        assert!(state.review.is_none());
        assert_eq!(state.signals.get_str(REVIEW), Some(ACCEPT));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn none_in_response_accepts() {
        let reviewer = setup(Arc::new(ScriptedLlm::new(vec!["None"])));
        let mut state = draft_state(true);
        reviewer.run(&mut state).await.unwrap();
        assert!(state.review.is_none());
        assert_eq!(state.signals.get_str(REVIEW), Some(ACCEPT));
    }

    #[tokio::test]
    async fn feedback_routes_to_revise() {
        let llm = Arc::new(ScriptedLlm::new(vec!["Split the second paragraph."]));
        let reviewer = setup(llm.clone());
        let mut state = draft_state(true);
        state.revision_notes = Some("shortened intro".into());
        reviewer.run(&mut state).await.unwrap();
        assert_eq!(state.review.as_deref(), Some("Split the second paragraph."));
        assert_eq!(state.signals.get_str(REVIEW), Some(REVISE));

        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("shortened intro"));
        assert!(prompt.contains("- Use short paragraphs"));
        assert!(prompt.contains("Draft body"));
    }

    #[tokio::test]
    async fn revision_limit_forces_accept() {
        let llm = Arc::new(ScriptedLlm::new(vec!["More changes"]));
        let reviewer = setup(llm.clone());
        let mut state = draft_state(true);
        state.revisions = 2;
        reviewer.run(&mut state).await.unwrap();
        assert!(state.review.is_none());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_drafts_are_not_reviewed() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let reviewer = setup(llm.clone());
        let mut state = draft_state(true);
        state.draft = SectionDraft::failed("Intro", "search down");
        reviewer.run(&mut state).await.unwrap();
        assert_eq!(state.signals.get_str(REVIEW), Some(ACCEPT));
        assert_eq!(llm.call_count(), 0);
    }
}
