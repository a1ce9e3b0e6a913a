use std::sync::Arc;

use chrono::Local;
use tracing::debug;

use penwright_core::config::{AppConfig, ModelConfig};
use penwright_core::error::Result;
use penwright_core::event::EventBus;
use penwright_core::traits::{LlmClient, Searcher};
use penwright_core::types::{ChatMessage, ResponseFormat};
use penwright_core::Task;

/// Shared handles every agent works with.
pub struct PipelineContext {
    pub config: AppConfig,
    pub llm: Arc<dyn LlmClient>,
    pub searcher: Arc<dyn Searcher>,
    pub event_bus: Arc<EventBus>,
}

impl PipelineContext {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        searcher: Arc<dyn Searcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            llm,
            searcher,
            event_bus,
        }
    }

    /// Model config for a task, honouring its `model` override.
    pub fn model_for(&self, task: &Task) -> ModelConfig {
        match task.model.as_deref().filter(|m| !m.is_empty()) {
            Some(model) => self.config.model.with_model_id(model),
            None => self.config.model.clone(),
        }
    }

    /// Progress line shown to the user.
    pub fn log(&self, agent: &str, message: impl Into<String>) {
        self.event_bus.agent_log(agent, message);
    }

    /// One system + user exchange with the task's model.
    pub async fn ask(
        &self,
        task: &Task,
        system: &str,
        user: String,
        format: ResponseFormat,
    ) -> Result<String> {
        let config = self.model_for(task);
        debug!(model = %config.model_id, ?format, "Calling model");
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        penwright_llm::complete(self.llm.as_ref(), &config, messages, format).await
    }
}

/// Today's date as `YYYY-MM-DD`.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_test_utils::{test_app_config, MockSearcher, ScriptedLlm};

    fn context(llm: ScriptedLlm) -> PipelineContext {
        PipelineContext::new(
            test_app_config(std::path::Path::new("reports")),
            Arc::new(llm),
            Arc::new(MockSearcher::new()),
            Arc::new(EventBus::default()),
        )
    }

    #[test]
    fn task_model_overrides_config() {
        let ctx = context(ScriptedLlm::new(Vec::<String>::new()));
        let mut task = Task::new("q");
        assert_eq!(ctx.model_for(&task).model_id, "test-model");

        task.model = Some("gpt-4o".into());
        assert_eq!(ctx.model_for(&task).model_id, "gpt-4o");

        task.model = Some(String::new());
        assert_eq!(ctx.model_for(&task).model_id, "test-model");
    }

    #[tokio::test]
    async fn ask_sends_system_and_user() {
        let llm = Arc::new(ScriptedLlm::new(vec!["answer"]));
        let ctx = PipelineContext::new(
            test_app_config(std::path::Path::new("reports")),
            llm.clone(),
            Arc::new(MockSearcher::new()),
            Arc::new(EventBus::default()),
        );
        let out = ctx
            .ask(&Task::new("q"), "be brief", "hello".into(), ResponseFormat::Text)
            .await
            .unwrap();
        assert_eq!(out, "answer");
        let requests = llm.requests();
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[0][0].content, "be brief");
        assert_eq!(requests[0][1].content, "hello");
    }

    #[test]
    fn today_is_iso_date() {
        let d = today();
        assert_eq!(d.len(), 10);
        assert_eq!(&d[4..5], "-");
    }
}
