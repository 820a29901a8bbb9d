use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;

use tasklens_core::analyzer::TaskAnalyzer;
use tasklens_core::config::{resolve_config, TasklensConfig};
use tasklens_core::sanitize::DependencySanitizer;
use tasklens_core::search::{format_task_table, option_label, search_tasks, validate_tasks_file};
use tasklens_core::store::{extract_task_section, load_store, load_tasks_from_file, write_store};

mod version;

#[derive(Parser)]
#[command(
    name = "tasklens",
    version = version::FULL,
    about = "Infer task metadata and keep markdown task stores consistent"
)]
struct Cli {
    /// Config file to use instead of the discovered one
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Infer dependencies, epic, priority, and category for a new task description
    Analyze {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Known epic names; defaults to the epics found in the store
        #[arg(long = "epic")]
        epics: Vec<String>,
        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Validate the dependency graph of a task store
    Sanitize {
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Remove orphaned dependencies and rewrite the store
        #[arg(long)]
        fix: bool,
        /// Epics that should exist even without tasks
        #[arg(long = "epic")]
        epics: Vec<String>,
    },
    /// Rank tasks against a free-text query
    Search {
        query: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Include completed tasks
        #[arg(long)]
        completed: bool,
        /// Append relevance scores to the table
        #[arg(long)]
        scores: bool,
    },
    /// Check that a task store exists and parses
    Validate {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print one task section
    Show {
        task_id: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print version information
    Version,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "tasklens=debug,tasklens_core=debug"
    } else {
        "tasklens=warn,tasklens_core=warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", json!({ "error": format!("{:#}", err) }));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let explicit_config = cli.config.as_deref();
    match cli.command {
        Command::Analyze {
            text,
            file,
            epics,
            compact,
        } => {
            let config = load_settings(explicit_config)?;
            let path = tasks_file(file, &config)?;
            let tasks = load_tasks_from_file(&path)?;
            let epics = if epics.is_empty() { None } else { Some(epics) };
            let analyzer =
                TaskAnalyzer::with_config(tasks, epics, config.analyzer_config()?, config.vocabulary())?;
            let analysis = analyzer.analyze(&text.join(" "));
            if compact {
                println!("{}", serde_json::to_string(&analysis)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            }
        }
        Command::Sanitize { file, fix, epics } => {
            let config = load_settings(explicit_config)?;
            let path = tasks_file(file, &config)?;
            let content = load_store(&path)?;
            let mut sanitizer = DependencySanitizer::from_content(&content).with_declared_epics(epics);
            let report = sanitizer.sanitize();
            println!("{}", serde_json::to_string_pretty(&report)?);

            if fix && report.critical_count > 0 {
                let fixes = sanitizer.fix_auto_fixable();
                if fixes.fixed > 0 {
                    write_store(&path, &sanitizer.render_store())?;
                }
                eprintln!("Fixed {} auto-fixable issues", fixes.fixed);
            }
        }
        Command::Search {
            query,
            file,
            limit,
            completed,
            scores,
        } => {
            let config = load_settings(explicit_config)?;
            let path = tasks_file(file, &config)?;
            let tasks = load_tasks_from_file(&path)?;
            let hits = search_tasks(&tasks, &query, limit, completed);
            let results: Vec<_> = hits
                .iter()
                .enumerate()
                .map(|(idx, hit)| {
                    json!({
                        "option": option_label(idx),
                        "task_id": hit.task.id,
                        "title": hit.task.title,
                        "status": hit.task.status,
                        "priority": hit.task.priority,
                        "score": hit.score,
                    })
                })
                .collect();
            let output = json!({
                "query": query,
                "total_results": hits.len(),
                "results": results,
                "table": format_task_table(&hits, scores),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Validate { file } => {
            let config = load_settings(explicit_config)?;
            let path = tasks_file(file, &config)?;
            let validation = validate_tasks_file(&path);
            println!("{}", serde_json::to_string(&validation)?);
            if !validation.valid {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Show { task_id, file } => {
            let config = load_settings(explicit_config)?;
            let path = tasks_file(file, &config)?;
            let content = load_store(&path)?;
            let section = extract_task_section(&content, &task_id)
                .ok_or_else(|| anyhow!("Task {} not found in {}", task_id, path.display()))?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", section)?;
        }
        Command::Version => {
            println!("tasklens {}", version::FULL);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_settings(explicit: Option<&Path>) -> Result<TasklensConfig> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let (config, source) = resolve_config(explicit, &cwd)?;
    debug!(source, "resolved configuration");
    Ok(config)
}

fn tasks_file(explicit: Option<PathBuf>, config: &TasklensConfig) -> Result<PathBuf> {
    explicit
        .or_else(|| config.tasks_file_path())
        .ok_or_else(|| anyhow!("No tasks file given; pass --file or set tasks_file in .tasklens.toml"))
}
