//! TripPlanner CLI entry point

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use sessionstore::StoreOptions;
use tripplanner::cli::{Cli, Command, OutputFormat, get_log_path};
use tripplanner::config::Config;
use tripplanner::critique::RuleCritic;
use tripplanner::generation::ItineraryGenerator;
use tripplanner::llm::create_client;
use tripplanner::parser::{LlmParser, QueryParser, RuleParser};
use tripplanner::providers::ProviderSet;
use tripplanner::render;
use tripplanner::state::StateManager;
use tripplanner::supervisor::{PlanError, Supervisor};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn store_dir(cli_dir: Option<&PathBuf>, config: &Config) -> PathBuf {
    cli_dir.cloned().unwrap_or_else(|| config.storage.expanded_session_dir())
}

fn spawn_state(cli_dir: Option<&PathBuf>, config: &Config) -> Result<StateManager> {
    let dir = store_dir(cli_dir, config);
    debug!(dir = %dir.display(), "spawn_state: called");
    let options = StoreOptions {
        ttl_ms: config.storage.session_ttl_ms,
        lease_ttl_ms: config.storage.lease_ttl_ms,
    };
    StateManager::spawn(&dir, options).context(format!("Failed to open session store at {}", dir.display()))
}

/// Wire parser, generator and critic from config
fn build_supervisor(config: &Config, state: StateManager) -> Supervisor {
    debug!(llm = %config.llm.provider, offline = config.providers.offline, "build_supervisor: called");
    let rules = RuleParser::new().with_max_duration_days(config.supervisor.max_trip_days);
    let parser: Arc<dyn QueryParser> = match create_client(&config.llm) {
        Ok(Some(client)) => Arc::new(LlmParser::new(client, rules, config.llm.max_tokens)),
        Ok(None) => Arc::new(rules),
        Err(e) => {
            warn!(error = %e, "LLM unavailable, parsing with rules only");
            Arc::new(rules)
        }
    };
    let generator = Arc::new(ItineraryGenerator::new(ProviderSet::from_config(&config.providers)));
    let critic = Arc::new(RuleCritic::new(config.critique.clone()));
    Supervisor::new(parser, generator, critic, config.supervisor.clone()).with_state(state)
}

async fn cmd_plan(
    config: &Config,
    cli_dir: Option<&PathBuf>,
    text: &str,
    session_id: Option<String>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    debug!(%session_id, ?format, "cmd_plan: called");
    let state = spawn_state(cli_dir, config)?;
    let supervisor = build_supervisor(config, state);

    match supervisor.plan(&session_id, text).await {
        Ok(plan) => {
            match format {
                OutputFormat::Json => println!("{}", render::plan_json(&plan)?),
                OutputFormat::Text => print!("{}", render::plan_text(&plan)),
            }
            if plan.status.is_hard_failure() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(PlanError::ConcurrencyConflict { session_id, detail }) => {
            eprintln!("Session {} is busy: {}", session_id, detail);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("Planning failed"),
    }
}

async fn cmd_status(config: &Config, cli_dir: Option<&PathBuf>, session_id: &str, format: OutputFormat) -> Result<ExitCode> {
    debug!(%session_id, ?format, "cmd_status: called");
    let state = spawn_state(cli_dir, config)?;
    match state.load(session_id).await? {
        Some(envelope) => {
            match format {
                OutputFormat::Json => println!("{}", render::plan_json(&envelope.data)?),
                OutputFormat::Text => print!("{}", render::plan_text(&envelope.data)),
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("No session {}", session_id);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_trace(config: &Config, cli_dir: Option<&PathBuf>, session_id: &str) -> Result<ExitCode> {
    debug!(%session_id, "cmd_trace: called");
    let state = spawn_state(cli_dir, config)?;
    match state.load(session_id).await? {
        Some(envelope) => {
            print!("{}", render::trace_text(&envelope.data));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("No session {}", session_id);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_sessions(config: &Config, cli_dir: Option<&PathBuf>, format: OutputFormat) -> Result<ExitCode> {
    debug!(?format, "cmd_sessions: called");
    let state = spawn_state(cli_dir, config)?;
    let sessions = state.list().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&render::sessions_json(&sessions))?),
        OutputFormat::Text => print!("{}", render::sessions_text(&sessions)),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_purge(config: &Config, cli_dir: Option<&PathBuf>) -> Result<ExitCode> {
    debug!("cmd_purge: called");
    let state = spawn_state(cli_dir, config)?;
    let removed = state.purge_expired().await?;
    println!("Removed {} expired sessions", removed);
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(config: &Config) -> Result<ExitCode> {
    debug!("cmd_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Command::Plan { offline: true, .. } = &cli.command {
        // offline means no network at all, the LLM included
        config.providers.offline = true;
        config.llm.provider = "none".to_string();
    }
    config.validate().context("Invalid configuration")?;

    let cli_dir = cli.store_dir.as_ref();
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Plan {
            text,
            session_id,
            format,
            ..
        } => cmd_plan(&config, cli_dir, &text, session_id, format).await,
        Command::Status { session_id, format } => cmd_status(&config, cli_dir, &session_id, format).await,
        Command::Trace { session_id } => cmd_trace(&config, cli_dir, &session_id).await,
        Command::Sessions { format } => cmd_sessions(&config, cli_dir, format).await,
        Command::Purge => cmd_purge(&config, cli_dir).await,
        Command::Config => cmd_config(&config),
    }
}
