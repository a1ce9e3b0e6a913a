use serde_json::json;

use penwright_core::task::{load_task, save_task};
use penwright_core::{PenwrightError, ResearchSource, TaskQueue};

#[test]
fn task_file_round_trips_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("task.json");
    std::fs::write(
        &path,
        json!({
            "query": "Is AI in a hype cycle?",
            "max_sections": 5,
            "publish_formats": {"markdown": true, "pdf": true, "docx": false},
            "source": "local",
            "doc_path": "./my-docs",
            "team": "research",
            "custom_flag": 7
        })
        .to_string(),
    )
    .unwrap();

    let task = load_task(&path).unwrap();
    assert_eq!(task.max_sections, 5);
    assert_eq!(task.source, ResearchSource::Local);
    assert_eq!(task.enabled_formats(&[]), vec!["md", "pdf"]);
    assert_eq!(task.extra["custom_flag"], 7);

    let copy = dir.path().join("nested").join("task.json");
    save_task(&copy, &task).unwrap();
    let reloaded = load_task(&copy).unwrap();
    assert_eq!(reloaded.team.as_deref(), Some("research"));
    assert_eq!(reloaded.extra["custom_flag"], 7);
}

#[test]
fn missing_and_empty_task_files_are_distinct_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = load_task(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(missing, PenwrightError::TaskNotFound(_)));

    let empty = dir.path().join("empty.json");
    std::fs::write(&empty, "{}").unwrap();
    assert!(matches!(
        load_task(&empty).unwrap_err(),
        PenwrightError::EmptyTask(_)
    ));
}

#[test]
fn queue_merge_never_mutates_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(
        &path,
        json!({
            "defaults": {"query": "base", "tone": "neutral", "seo": false},
            "updates_queue": [
                {"tone": "witty", "seo": true},
                {"query": "second", "tone": null}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let queue = TaskQueue::load(&path).unwrap();
    assert_eq!(queue.len(), 2);
    let merged = queue.merged_tasks();
    assert_eq!(merged[0]["tone"], "witty");
    assert_eq!(merged[0]["seo"], true);
    assert_eq!(merged[1]["query"], "second");
    assert_eq!(merged[1]["tone"], "neutral");
    assert_eq!(merged[1]["seo"], false);
    assert_eq!(queue.defaults["tone"], "neutral");
}
