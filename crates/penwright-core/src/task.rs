use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{PenwrightError, Result};

/// Where research material comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchSource {
    #[default]
    Web,
    Local,
}

impl ResearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Local => "local",
        }
    }
}

/// One unit of work for the pipeline, usually read from `task.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub query: String,
    /// Overrides the configured model id for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,
    /// Format name (`md`, `markdown`, `pdf`, `docx`, `json`) to enabled flag.
    /// Empty means the configured defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub publish_formats: BTreeMap<String, bool>,
    #[serde(default)]
    pub include_human_feedback: bool,
    #[serde(default)]
    pub follow_guidelines: bool,
    #[serde(default)]
    pub guidelines: Vec<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub source: ResearchSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
    /// Team label, recorded when the run starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Run the SEO pass before publishing.
    #[serde(default)]
    pub seo: bool,
    /// Keys this crate does not interpret, kept so the task round-trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Environment variable holding a `provider:model` override.
pub const STRATEGIC_LLM_ENV: &str = "STRATEGIC_LLM";

fn default_max_sections() -> usize { 3 }


impl Task {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: None,
            max_sections: default_max_sections(),
            publish_formats: BTreeMap::new(),
            include_human_feedback: false,
            follow_guidelines: false,
            guidelines: vec![],
            verbose: false,
            source: ResearchSource::Web,
            doc_path: None,
            audience: None,
            tone: None,
            word_count: None,
            team: None,
            author: None,
            avatar: None,
            bio: None,
            output_dir: None,
            seo: false,
            extra: Map::new(),
        }
    }

    /// Build a task from a JSON object, checking the required fields.
    pub fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Object(map) if map.is_empty() => {
                return Err(PenwrightError::EmptyTask("empty task object".into()))
            }
            Value::Object(_) => {}
            _ => return Err(PenwrightError::InvalidTask("task must be a JSON object".into())),
        }
        let task: Task =
            serde_json::from_value(value).map_err(|e| PenwrightError::InvalidTask(e.to_string()))?;
        task.validate()?;
        Ok(task)
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(PenwrightError::InvalidTask("query must not be empty".into()));
        }
        if self.source == ResearchSource::Local && self.doc_path.is_none() {
            return Err(PenwrightError::InvalidTask(
                "local research requires doc_path".into(),
            ));
        }
        Ok(())
    }

    /// Enabled publish formats, normalised (`markdown` becomes `md`).
    /// A task that lists no formats gets `defaults`; one that disables
    /// every listed format gets none.
    pub fn enabled_formats(&self, defaults: &[String]) -> Vec<String> {
        let mut formats: Vec<String> = if self.publish_formats.is_empty() {
            defaults.iter().map(|f| normalize_format(f)).collect()
        } else {
            self.publish_formats
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(name, _)| normalize_format(name))
                .collect()
        };
        formats.sort();
        formats.dedup();
        formats
    }

    /// Apply a `provider:model` override (the `STRATEGIC_LLM` convention).
    pub fn apply_model_override(&mut self, strategic_llm: &str) {
        let model = match strategic_llm.split_once(':') {
            Some((_, model)) => model,
            None => strategic_llm,
        };
        if !model.is_empty() {
            self.model = Some(model.to_string());
        }
    }

    /// Apply `STRATEGIC_LLM` from the environment, when set.
    pub fn apply_env_model_override(&mut self) {
        if let Ok(strategic) = std::env::var(STRATEGIC_LLM_ENV) {
            self.apply_model_override(&strategic);
            debug!(model = ?self.model, "Model overridden by STRATEGIC_LLM");
        }
    }

    /// Apply an author persona to the task.
    pub fn apply_author(&mut self, author: &Author) {
        self.query = format!("{} {}", self.query, author.prompt_injection)
            .trim()
            .to_string();
        self.guidelines = author.guidelines.clone();
        self.author = Some(author.name.clone());
        self.avatar = author.avatar.clone();
        self.bio = author.bio.clone();
        self.tone = author.tone.clone();
    }
}

fn normalize_format(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "markdown" => "md".to_string(),
        other => other.to_string(),
    }
}

/// Load a task file, honouring the `STRATEGIC_LLM` model override.
pub fn load_task(path: &Path) -> Result<Task> {
    if !path.exists() {
        return Err(PenwrightError::TaskNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    let mut task = Task::from_value(value)?;
    task.apply_env_model_override();
    Ok(task)
}

/// Write a task as pretty JSON, creating parent directories.
pub fn save_task(path: &Path, task: &Task) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(task)?)?;
    Ok(())
}

/// Batch of tasks sharing a set of defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskQueue {
    #[serde(default)]
    pub defaults: Map<String, Value>,
    #[serde(default)]
    pub updates_queue: Vec<Map<String, Value>>,
}

impl TaskQueue {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PenwrightError::TaskNotFound(path.display().to_string()))?;
        let queue: TaskQueue = serde_json::from_str(&content)
            .map_err(|e| PenwrightError::InvalidTask(format!("{}: {e}", path.display())))?;
        info!(tasks = queue.updates_queue.len(), "Task queue loaded");
        Ok(queue)
    }

    pub fn len(&self) -> usize {
        self.updates_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates_queue.is_empty()
    }

    /// Defaults overlaid with the non-null values of one update.
    pub fn merged(&self, update: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.defaults.clone();
        for (key, value) in update {
            if !value.is_null() {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Every queued task as a merged JSON object, in queue order.
    pub fn merged_tasks(&self) -> Vec<Map<String, Value>> {
        self.updates_queue.iter().map(|u| self.merged(u)).collect()
    }
}

/// Writing persona applied to a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub prompt_injection: String,
    #[serde(default)]
    pub guidelines: Vec<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

pub fn load_authors(path: &Path) -> Result<Vec<Author>> {
    let content = std::fs::read_to_string(path)?;
    let authors: Vec<Author> = serde_json::from_str(&content)?;
    Ok(authors)
}

/// Pick one persona uniformly at random.
pub fn random_author(authors: &[Author]) -> Option<&Author> {
    authors.choose(&mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_task_gets_defaults() {
        let task = Task::from_value(json!({"query": "rust async"})).unwrap();
        assert_eq!(task.max_sections, 3);
        assert_eq!(task.source, ResearchSource::Web);
        assert!(!task.follow_guidelines);
        assert!(!task.seo);
        assert!(task.publish_formats.is_empty());
        assert_eq!(task.enabled_formats(&["md".to_string()]), vec!["md"]);
    }

    #[test]
    fn empty_object_is_empty_task() {
        let err = Task::from_value(json!({})).unwrap_err();
        assert!(matches!(err, PenwrightError::EmptyTask(_)));
    }

    #[test]
    fn blank_query_is_rejected() {
        let err = Task::from_value(json!({"query": "  "})).unwrap_err();
        assert!(matches!(err, PenwrightError::InvalidTask(_)));
    }

    #[test]
    fn local_source_needs_doc_path() {
        let err = Task::from_value(json!({"query": "q", "source": "local"})).unwrap_err();
        assert!(err.to_string().contains("doc_path"));
    }

    #[test]
    fn unknown_keys_round_trip() {
        let task = Task::from_value(json!({"query": "q", "report_type": "blog"})).unwrap();
        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["report_type"], "blog");
    }

    #[test]
    fn formats_normalised_and_filtered() {
        let task = Task::from_value(json!({
            "query": "q",
            "publish_formats": {"markdown": true, "pdf": false, "docx": true}
        }))
        .unwrap();
        assert_eq!(task.enabled_formats(&[]), vec!["docx", "md"]);
    }

    #[test]
    fn formats_fall_back_to_defaults_only_when_unlisted() {
        let task = Task::from_value(json!({"query": "q"})).unwrap();
        assert_eq!(task.enabled_formats(&["json".to_string()]), vec!["json"]);

        let task = Task::from_value(json!({"query": "q", "publish_formats": {"pdf": false}})).unwrap();
        assert!(task.enabled_formats(&["json".to_string()]).is_empty());
    }

    #[test]
    fn model_override_takes_part_after_colon() {
        let mut task = Task::new("q");
        task.apply_model_override("openai:gpt-4o-mini");
        assert_eq!(task.model.as_deref(), Some("gpt-4o-mini"));
        task.apply_model_override("claude-3-haiku");
        assert_eq!(task.model.as_deref(), Some("claude-3-haiku"));
    }

    #[test]
    fn author_applied_to_task() {
        let mut task = Task::new("Vector databases");
        let author = Author {
            name: "Ada".into(),
            tone: Some("playful".into()),
            prompt_injection: "Write with humour.".into(),
            guidelines: vec!["Use short paragraphs".into()],
            avatar: Some("ada.png".into()),
            bio: None,
        };
        task.apply_author(&author);
        assert_eq!(task.query, "Vector databases Write with humour.");
        assert_eq!(task.author.as_deref(), Some("Ada"));
        assert_eq!(task.tone.as_deref(), Some("playful"));
        assert_eq!(task.guidelines.len(), 1);
    }

    #[test]
    fn empty_injection_leaves_query_trimmed() {
        let mut task = Task::new("Topic");
        let author = Author {
            name: "B".into(),
            tone: None,
            prompt_injection: String::new(),
            guidelines: vec![],
            avatar: None,
            bio: None,
        };
        task.apply_author(&author);
        assert_eq!(task.query, "Topic");
    }

    #[test]
    fn queue_merge_ignores_nulls_and_keeps_defaults() {
        let queue: TaskQueue = serde_json::from_value(json!({
            "defaults": {"query": "base", "max_sections": 2, "tone": "formal"},
            "updates_queue": [
                {"query": "first", "tone": null},
                {"max_sections": 5}
            ]
        }))
        .unwrap();
        let tasks = queue.merged_tasks();
        assert_eq!(tasks[0]["query"], "first");
        assert_eq!(tasks[0]["tone"], "formal");
        assert_eq!(tasks[1]["query"], "base");
        assert_eq!(tasks[1]["max_sections"], 5);
        assert_eq!(queue.defaults["max_sections"], 2);
    }

    #[test]
    fn random_author_from_empty_list() {
        assert!(random_author(&[]).is_none());
    }

    #[test]
    fn save_then_load_task_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("task.json");
        let mut task = Task::new("Edge computing");
        task.max_sections = 4;
        save_task(&path, &task).unwrap();

        let loaded = load_task(&path).unwrap();
        assert_eq!(loaded.query, "Edge computing");
        assert_eq!(loaded.max_sections, 4);
    }

    #[test]
    fn authors_file_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"[{"name": "Ada", "tone": "dry", "prompt_injection": "Be brief.", "guidelines": ["g1"]}]"#,
        )
        .unwrap();
        let authors = load_authors(file.path()).unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(random_author(&authors).unwrap().name, "Ada");
    }

    #[test]
    fn load_task_missing_file() {
        let err = load_task(Path::new("/nonexistent/task.json")).unwrap_err();
        assert!(matches!(err, PenwrightError::TaskNotFound(_)));
    }
}
