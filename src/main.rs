mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use penwright_core::config::{AppConfig, WatcherConfig};
use penwright_core::event::EventBus;
use penwright_core::task::load_task;
use penwright_core::traits::{LlmClient, Searcher};
use penwright_core::types::PipelineEvent;
use penwright_core::{Task, TaskQueue};

use penwright_agent::{
    apply_configured_author, AutoApprove, BatchRunner, ChiefEditor, ConsoleReviewer,
    PipelineContext, PlanReviewer,
};
use penwright_tools::Organizer;

#[derive(Parser)]
#[command(name = "penwright", version, about = "Multi-agent research and article pipeline")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "penwright.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research, write and publish one article
    Run {
        /// Task file (defaults to [pipeline].task_file)
        #[arg(long)]
        task: Option<PathBuf>,
        /// Run this query instead of reading a task file
        #[arg(long)]
        query: Option<String>,
        /// Accept the plan without asking for feedback
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Run every task of a queue file in sequence
    Batch {
        /// Queue file with `defaults` and `updates_queue`
        #[arg(long)]
        queue: PathBuf,
        /// Accept every plan without asking for feedback
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Watch the reports folder and file new Markdown under its title
    Watch,
    /// Organize Markdown files already in the reports folder, then exit
    Organize,
    /// Show current configuration
    Config,
    /// Run configuration health checks
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("penwright=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "penwright", &mut std::io::stdout());
        return Ok(());
    }

    // The organizer needs no model or search keys
    if matches!(cli.command, Commands::Watch | Commands::Organize) {
        let organizer = Organizer::new(watcher_config(&cli.config)?);
        if let Commands::Organize = cli.command {
            let moved = organizer.organize_existing().await?;
            println!("Organized {} file(s) into {}", moved.len(), organizer.dest_dir().display());
            return Ok(());
        }
        info!(
            watch = %organizer.watch_root().display(),
            dest = %organizer.dest_dir().display(),
            "Starting Markdown organizer"
        );
        organizer
            .watch(async {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down organizer...");
            })
            .await?;
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Completions { .. } | Commands::Watch | Commands::Organize => {
            unreachable!("handled before config load")
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Doctor => {
            println!("Penwright Doctor");
            println!("================");
            doctor::run_doctor(&config);
        }
        Commands::Run {
            task: task_path,
            query,
            yes,
        } => {
            let mut task = match query {
                Some(query) => {
                    let mut task = Task::new(query);
                    task.apply_env_model_override();
                    task
                }
                None => {
                    let path = task_path.unwrap_or_else(|| config.task_file());
                    load_task(&path)?
                }
            };
            apply_configured_author(&mut task, &config)?;

            let (chief, bus) = build_chief(config, yes)?;
            let printer = spawn_event_printer(&bus, task.verbose);
            let result = chief.run_research_task(task).await;
            drop(chief);
            drop(bus);
            printer.await.ok();

            let state = result?;
            println!("\nReport written to {}", state.output_dir.display());
            for (format, path) in &state.published {
                println!("  {format}: {}", path.display());
            }
        }
        Commands::Batch { queue, yes } => {
            let queue = TaskQueue::load(&queue)?;
            if queue.is_empty() {
                warn!("Task queue is empty");
                return Ok(());
            }
            let task_file = config.task_file();
            let (chief, bus) = build_chief(config, yes)?;
            let printer = spawn_event_printer(&bus, false);

            let summary = BatchRunner::new(&chief, &task_file).run(&queue).await;
            drop(chief);
            drop(bus);
            printer.await.ok();

            println!();
            for item in &summary.items {
                match &item.outcome {
                    Ok(state) => println!(
                        "  [OK] {}/{} {} -> {}",
                        item.index,
                        summary.total(),
                        item.query,
                        state.output_dir.display()
                    ),
                    Err(e) => println!("  [!!] {}/{} {}: {e}", item.index, summary.total(), item.query),
                }
            }
            println!(
                "\n  {} completed, {} failed, {} total",
                summary.completed(),
                summary.failed(),
                summary.total()
            );
            if summary.completed() == 0 {
                anyhow::bail!("every queued task failed");
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    eprintln!(
        "Warning: No config file found. Set OPENAI_API_KEY or ANTHROPIC_API_KEY or create penwright.toml"
    );
    eprintln!("See penwright.toml.example for reference.");
    Ok(AppConfig::from_env()?)
}

fn watcher_config(path: &Path) -> anyhow::Result<WatcherConfig> {
    if path.exists() {
        Ok(AppConfig::load(path)?.watcher)
    } else {
        Ok(WatcherConfig::default())
    }
}

fn build_chief(config: AppConfig, auto_approve: bool) -> anyhow::Result<(ChiefEditor, Arc<EventBus>)> {
    let llm: Arc<dyn LlmClient> = Arc::from(penwright_llm::build_client(&config));
    let searcher: Arc<dyn Searcher> = Arc::from(penwright_tools::create_searcher(&config.research)?);
    let bus = Arc::new(EventBus::default());
    info!(model = %config.model.model_id, search = searcher.name(), "Pipeline ready");

    let reviewer: Arc<dyn PlanReviewer> = if auto_approve {
        Arc::new(AutoApprove)
    } else {
        Arc::new(ConsoleReviewer)
    };
    let ctx = PipelineContext::new(config, llm, searcher, bus.clone());
    Ok((ChiefEditor::new(Arc::new(ctx)).with_plan_reviewer(reviewer), bus))
}

/// Print agent progress until every sender is gone.
fn spawn_event_printer(bus: &EventBus, verbose: bool) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event printer lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            match event {
                PipelineEvent::AgentLog { agent, message } => println!("{agent}: {message}"),
                PipelineEvent::ReviewFeedback { section, feedback } if verbose => match feedback {
                    Some(feedback) => println!("REVIEWER: [{section}] {feedback}"),
                    None => println!("REVIEWER: [{section}] accepted"),
                },
                PipelineEvent::Published { format, path } => {
                    println!("PUBLISHER: wrote {format} to {}", path.display());
                }
                PipelineEvent::RunComplete {
                    output_dir,
                    started_at,
                    ..
                } => {
                    let secs = (chrono::Utc::now() - started_at).num_seconds().max(0);
                    println!(
                        "MASTER: finished in {} ({})",
                        humanize(Duration::from_secs(secs as u64)),
                        output_dir.display()
                    );
                }
                PipelineEvent::RunError { error, .. } => eprintln!("MASTER: run failed: {error}"),
                _ => {}
            }
        }
    })
}

fn humanize(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
