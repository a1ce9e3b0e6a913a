//! Task preparation and the sequential batch runner.

use std::path::Path;

use serde_json::Value;
use tracing::{error, info, warn};

use penwright_core::error::Result;
use penwright_core::task::{load_authors, random_author, save_task};
use penwright_core::{AppConfig, Task, TaskQueue};

use crate::orchestrator::ChiefEditor;
use crate::state::ResearchState;

/// Apply a random author persona when an authors file is configured.
pub fn apply_configured_author(task: &mut Task, config: &AppConfig) -> Result<()> {
    let Some(path) = config.authors_file() else {
        return Ok(());
    };
    let authors = load_authors(&path)?;
    match random_author(&authors) {
        Some(author) => {
            info!(author = %author.name, "Writing as author persona");
            task.apply_author(author);
        }
        None => warn!(path = %path.display(), "Authors file is empty"),
    }
    Ok(())
}

/// Outcome of one queued task.
#[derive(Debug)]
pub struct BatchItem {
    pub index: usize,
    pub query: String,
    pub outcome: std::result::Result<ResearchState, String>,
}

/// Outcome of a whole queue.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub items: Vec<BatchItem>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn completed(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.completed()
    }
}

/// Runs queued tasks one after another through a chief editor.
pub struct BatchRunner<'a> {
    chief: &'a ChiefEditor,
    task_file: &'a Path,
}

impl<'a> BatchRunner<'a> {
    /// `task_file` receives each effective task before it runs.
    pub fn new(chief: &'a ChiefEditor, task_file: &'a Path) -> Self {
        Self { chief, task_file }
    }

    async fn run_one(&self, merged: serde_json::Map<String, Value>) -> Result<ResearchState> {
        let mut task = Task::from_value(Value::Object(merged))?;
        task.apply_env_model_override();
        apply_configured_author(&mut task, &self.chief.context().config)?;
        save_task(self.task_file, &task)?;
        self.chief.run_research_task(task).await
    }

    /// Run every queued task. Failures are recorded and the queue continues.
    pub async fn run(&self, queue: &TaskQueue) -> BatchSummary {
        let total = queue.len();
        let mut summary = BatchSummary::default();

        for (i, merged) in queue.merged_tasks().into_iter().enumerate() {
            let index = i + 1;
            let query = merged
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            info!(task = index, total, query = %query, "Running queued task");

            let outcome = match self.run_one(merged).await {
                Ok(state) => {
                    info!(task = index, total, output_dir = %state.output_dir.display(), "Task completed");
                    Ok(state)
                }
                Err(e) => {
                    error!(task = index, total, error = %e, "Task failed, continuing with the queue");
                    Err(e.to_string())
                }
            };
            summary.items.push(BatchItem {
                index,
                query,
                outcome,
            });
        }

        info!(
            completed = summary.completed(),
            failed = summary.failed(),
            total,
            "Batch finished"
        );
        summary
    }
}
