//! codegenie CLI - CodeGenie Pro server and command-line tools.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use codegenie::experiments::{ExperimentOutcome, ExperimentRecord, ExperimentRunner};
use codegenie::{AppState, Config, Dataset, comprehensive_analysis, insights};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Config file read when `--config` is not given.
const DEFAULT_CONFIG: &str = "codegenie.toml";

#[derive(Parser)]
#[command(name = "codegenie")]
#[command(version)]
#[command(about = "CodeGenie Pro - research, code playground, analytics and SAT experiments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults to ./codegenie.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Interface to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one goal through the assistant
    Ask {
        /// The goal, in free text
        goal: String,

        /// User the session belongs to
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Prefix the goal with "Research: "
        #[arg(short, long)]
        research: bool,
    },

    /// Search every configured research source
    Research {
        /// Search query
        query: String,

        /// Results per source (1-10)
        #[arg(short = 'n', long, default_value = "5")]
        max_results: usize,
    },

    /// Run a file through the code sandbox
    Execute {
        /// Path to the code file
        file: PathBuf,

        /// User charged against the rate limit
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// Analyze a CSV or JSON-records file
    Analyze {
        /// Path to a .csv or .json file
        file: PathBuf,
    },

    /// Run random 3-SAT experiments
    Sat {
        /// Number of variables
        #[arg(long, default_value = "20")]
        vars: usize,

        /// Number of clauses
        #[arg(long, default_value = "85")]
        clauses: usize,

        /// Solver name (dpll, python-sat)
        #[arg(short, long, default_value = "dpll")]
        solver: String,

        /// Number of independent runs
        #[arg(short, long, default_value = "1")]
        runs: usize,
    },

    /// Show the experiment log
    History {
        /// Only the most recent N records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let debug_env = std::env::var("DEBUG_MODE")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let level = if verbose || debug_env {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {path:?}"))?,
        None => Config::from_file_or_default(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to load config from {DEFAULT_CONFIG}"))?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_example_config() {
    let example = r#"# codegenie configuration file
# Every key is optional; the values below are the defaults.

[server]
host = "0.0.0.0"
port = 8501
session_idle_minutes = 120

[storage]
# false keeps cache, analytics and sessions in memory only
persist = true
path = "cache.json"

[security]
max_input_length = 2000
max_goal_length = 3000
max_code_length = 10000
execution_timeout_secs = 30
max_output_chars = 2000
interpreter = "python3"
goal_limit = { limit = 20, window_secs = 300 }
code_limit = { limit = 5, window_secs = 300 }
# blocked_patterns = ['import\s+(os|sys|shutil|subprocess|socket)', '__import__', 'eval\(']

[research]
sources = ["web", "wikipedia", "arxiv"]   # add "semantic_scholar" to enable it
request_timeout_secs = 10
source_timeout_secs = 15
cache_ttl_minutes = 60
web_attempts = 3
# Key can also come from the env var named below
# semantic_scholar_api_key = "${SEMANTIC_SCHOLAR_API_KEY}"
semantic_scholar_api_key_env = "SEMANTIC_SCHOLAR_API_KEY"

[experiments]
log_path = "experiment_log.jsonl"
max_vars = 500
max_clauses = 5000
actor = "codegenie"
max_decisions = 1000000
"#;
    println!("{example}");
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {path:?}"))?;
        let value: serde_json::Value =
            serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {path:?}"))?;
        Ok(Dataset::from_json_records(&value)?)
    } else {
        let file =
            std::fs::File::open(path).with_context(|| format!("Failed to open {path:?}"))?;
        Ok(Dataset::from_csv(file)?)
    }
}

fn print_record(record: &ExperimentRecord) {
    println!(
        "{}  {:>4} vars  {:>5} clauses  {:<10}  {:<14}  {:>8} decisions  {:>6} ms  approved by {}",
        record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        record.n_vars,
        record.clause_count,
        record.solver,
        record.outcome.as_str(),
        record.decisions,
        record.elapsed_ms,
        record.approval.actor,
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(cli.config.as_deref())?;

            info!("Configuration is valid");
            info!("  Server: {}", config.server.addr());
            info!(
                "  Storage: {}",
                if config.storage.persist {
                    config.storage.path.display().to_string()
                } else {
                    "in memory".to_string()
                }
            );
            info!(
                "  Research sources: {}",
                config
                    .research
                    .sources
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            info!("  Interpreter: {}", config.security.interpreter);
            info!("  Experiment log: {}", config.experiments.log_path.display());
            return Ok(());
        }

        Commands::Serve { host, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let state = AppState::from_config(&config, Handle::current())
                .context("Failed to initialize services")?;
            codegenie::server::serve(state, &config.server.addr()).await?;
        }

        Commands::Ask {
            goal,
            user,
            research,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let state = AppState::from_config(&config, Handle::current())?;

            let session = state.assistant.start_session(&user)?;
            let goal = if research {
                format!("Research: {goal}")
            } else {
                goal
            };
            let response = state
                .assistant
                .execute_goal(&session.session_id, &goal)
                .await?;

            println!("{}", response.content);
            info!(
                goal_type = response.metadata.goal_type.as_str(),
                elapsed_ms = response.metadata.processing_time_ms,
                "Done"
            );
        }

        Commands::Research { query, max_results } => {
            let config = load_config(cli.config.as_deref())?;
            let state = AppState::from_config(&config, Handle::current())?;

            let results = state
                .research
                .search(&query, max_results.clamp(1, 10))
                .await;
            if !results.has_any() {
                warn!(query = %query, "No results from any source");
            }
            for entry in &results.sources {
                println!("\n=== {} ({} results) ===", entry.source.title(), entry.results.len());
                for (i, result) in entry.results.iter().enumerate() {
                    println!("{}. {}", i + 1, result.title);
                    println!("   {}", result.url);
                    if !result.snippet.is_empty() {
                        println!("   {}", result.snippet);
                    }
                }
            }
        }

        Commands::Execute { file, user } => {
            let config = load_config(cli.config.as_deref())?;
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {file:?}"))?;
            let state = AppState::from_config(&config, Handle::current())?;

            let outcome = state.sandbox.execute(&code, &user).await;
            println!("{outcome}");
            if outcome.is_rejected() {
                bail!("execution rejected: {}", outcome.status());
            }
        }

        Commands::Analyze { file } => {
            let data = load_dataset(&file)?;
            println!("{}", comprehensive_analysis(&data));
            println!("\n---\n");
            println!("{}", insights(&data));
        }

        Commands::Sat {
            vars,
            clauses,
            solver,
            runs,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let runner = Arc::new(ExperimentRunner::new(config.experiments.clone()));

            let pb = ProgressBar::new(runs as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}",
                    )
                    .context("Invalid progress template")?
                    .progress_chars("##-"),
            );

            let mut records = Vec::with_capacity(runs);
            for _ in 0..runs {
                let runner = Arc::clone(&runner);
                let solver = solver.clone();
                let record = tokio::task::spawn_blocking(move || {
                    runner.run_random_3sat(vars, clauses, &solver)
                })
                .await
                .context("Experiment task panicked")??;
                pb.set_message(record.outcome.as_str());
                pb.inc(1);
                records.push(record);
            }
            pb.finish_with_message("done");

            let count = |outcome| records.iter().filter(|r| r.outcome == outcome).count();
            let total_ms: u64 = records.iter().map(|r| r.elapsed_ms).sum();
            let total_decisions: u64 = records.iter().map(|r| r.decisions).sum();
            let n = records.len().max(1) as f64;

            println!("\n=== SAT Experiments Complete ===");
            println!(
                "Instance:      {vars} vars, {clauses} clauses (ratio {:.2})",
                clauses as f64 / vars as f64
            );
            println!("Solver:        {solver}");
            println!("Runs:          {}", records.len());
            println!("Satisfiable:   {}", count(ExperimentOutcome::Satisfiable));
            println!("Unsatisfiable: {}", count(ExperimentOutcome::Unsatisfiable));
            println!("Failed:        {}", count(ExperimentOutcome::SolverFailed));
            println!("Avg decisions: {:.1}", total_decisions as f64 / n);
            println!("Avg time:      {:.1} ms", total_ms as f64 / n);
            println!("Log:           {:?}", config.experiments.log_path);
        }

        Commands::History { limit } => {
            let config = load_config(cli.config.as_deref())?;
            let runner = ExperimentRunner::new(config.experiments);
            let records = runner.history()?;

            let skip = limit.map_or(0, |l| records.len().saturating_sub(l));
            if records.is_empty() {
                println!("No experiments recorded yet");
            }
            for record in records.iter().skip(skip) {
                print_record(record);
            }
        }
    }

    Ok(())
}
