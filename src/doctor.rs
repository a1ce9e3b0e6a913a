use std::path::Path;

use penwright_core::config::AppConfig;
use penwright_core::task::{load_authors, load_task};

const KNOWN_FORMATS: &[&str] = &["md", "markdown", "pdf", "docx", "json"];

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn ok(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn issue(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

pub fn run_doctor(config: &AppConfig) {
    let checks = vec![
        check_api_key(config),
        check_search(config),
        check_output_root(config),
        check_task_file(config),
        check_authors(config),
        check_formats(config),
        check_pipeline(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn usable_key(key: Option<&String>) -> bool {
    key.is_some_and(|k| !k.is_empty() && !k.starts_with("${"))
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let provider = &config.model.provider;
    if usable_key(config.model.api_key.as_ref()) || provider == "ollama" {
        CheckResult::ok(
            "API Key",
            format!("Configured for {} ({})", config.model.model_id, provider),
        )
    } else {
        CheckResult::issue("API Key", format!("No API key set for provider '{provider}'"))
    }
}

fn check_search(config: &AppConfig) -> CheckResult {
    let research = &config.research;
    let env_key = std::env::var("TAVILY_API_KEY").ok();
    if research.provider != "tavily" {
        return CheckResult::issue(
            "Search",
            format!("Unsupported provider '{}'", research.provider),
        );
    }
    if usable_key(research.api_key.as_ref()) || usable_key(env_key.as_ref()) {
        CheckResult::ok(
            "Search",
            format!("tavily ({} depth, {} results)", research.search_depth, research.max_results),
        )
    } else {
        CheckResult::issue("Search", "No Tavily API key (web research will fail)")
    }
}

fn check_output_root(config: &AppConfig) -> CheckResult {
    let root = config.output_root();
    if let Err(e) = std::fs::create_dir_all(&root) {
        return CheckResult::issue(
            "Output",
            format!("{} (cannot create: {e})", root.display()),
        );
    }
    let probe = root.join(".doctor_test");
    match std::fs::write(&probe, "test") {
        Ok(_) => {
            std::fs::remove_file(&probe).ok();
            CheckResult::ok("Output", root.display().to_string())
        }
        Err(e) => CheckResult::issue(
            "Output",
            format!("{} (not writable: {e})", root.display()),
        ),
    }
}

fn check_task_file(config: &AppConfig) -> CheckResult {
    let path = config.task_file();
    if !path.exists() {
        return CheckResult::ok(
            "Task",
            format!("{} not found (use `run --query`)", path.display()),
        );
    }
    match load_task(&path) {
        Ok(task) => CheckResult::ok(
            "Task",
            format!("{}: \"{}\"", path.display(), task.query),
        ),
        Err(e) => CheckResult::issue("Task", format!("{}: {e}", path.display())),
    }
}

fn check_authors(config: &AppConfig) -> CheckResult {
    let Some(path) = config.authors_file() else {
        return CheckResult::ok("Authors", "Not configured");
    };
    check_authors_file(&path)
}

fn check_authors_file(path: &Path) -> CheckResult {
    match load_authors(path) {
        Ok(authors) if authors.is_empty() => {
            CheckResult::issue("Authors", format!("{} is empty", path.display()))
        }
        Ok(authors) => CheckResult::ok(
            "Authors",
            format!("{} personas in {}", authors.len(), path.display()),
        ),
        Err(e) => CheckResult::issue("Authors", format!("{}: {e}", path.display())),
    }
}

fn check_formats(config: &AppConfig) -> CheckResult {
    let unknown: Vec<&str> = config
        .publish
        .formats
        .iter()
        .map(String::as_str)
        .filter(|f| !KNOWN_FORMATS.contains(&f.to_lowercase().as_str()))
        .collect();
    if unknown.is_empty() {
        CheckResult::ok("Publish", config.publish.formats.join(", "))
    } else {
        CheckResult::issue("Publish", format!("Unknown formats: {}", unknown.join(", ")))
    }
}

fn check_pipeline(config: &AppConfig) -> CheckResult {
    let p = &config.pipeline;
    if p.max_parallel_sections == 0 || p.llm_json_retries == 0 {
        return CheckResult::issue(
            "Pipeline",
            "max_parallel_sections and llm_json_retries must be at least 1",
        );
    }
    CheckResult::ok(
        "Pipeline",
        format!(
            "{} revisions, {} plan revisions, {} parallel sections",
            p.max_revisions, p.max_plan_revisions, p.max_parallel_sections
        ),
    )
}
