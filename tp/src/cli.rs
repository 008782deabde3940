//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// TripPlanner - critique-driven travel itinerary planner
#[derive(Parser)]
#[command(
    name = "tp",
    about = "Plan a trip from a plain-language request with bounded critique-driven retries",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Session store directory (overrides config)
    #[arg(long = "store-dir", global = true, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Plan a trip, or resume a session
    Plan {
        /// Request text, e.g. "5 days in Tokyo for 2 with $2500, food and culture"
        text: String,

        /// Session id to create or resume (a new one is generated if omitted)
        #[arg(short, long = "session-id")]
        session_id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Use local fallback data for every provider
        #[arg(long)]
        offline: bool,
    },

    /// Show a stored session
    Status {
        session_id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the transition trace of a stored session
    Trace { session_id: String },

    /// List live sessions
    Sessions {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove expired sessions and stale leases
    Purge,

    /// Print the effective configuration
    Config,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripplanner")
        .join("logs")
        .join("tripplanner.log")
}

/// Output format for plan/status/sessions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("plain".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_plan_args() {
        let cli = Cli::try_parse_from([
            "tp",
            "plan",
            "trip to Oslo",
            "--offline",
            "--format",
            "json",
            "--store-dir",
            "/tmp/x",
            "-s",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.store_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Command::Plan {
                text,
                session_id,
                format,
                offline,
            } => {
                assert_eq!(text, "trip to Oslo");
                assert_eq!(session_id.as_deref(), Some("abc"));
                assert_eq!(format, OutputFormat::Json);
                assert!(offline);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["tp"]).is_err());
    }
}
