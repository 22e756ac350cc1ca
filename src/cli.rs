use crate::types::{LogChannel, LogLevel};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// opsdeck - operations console for database scripts, services and logs
#[derive(Parser, Debug)]
#[command(name = "opsdeck")]
#[command(about = "Terminal operations console: run database scripts, supervise services, follow logs")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON). Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dry-run mode: describe what actions would execute without spawning them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Diagnostic log of opsdeck itself (TUI mode; defaults to <tmp>/opsdeck.log)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the interactive dashboard (default)
    Tui {
        /// Generate synthetic log traffic while streaming
        #[arg(long)]
        demo: bool,
    },
    /// List configured actions
    Actions,
    /// Execute an action headless, streaming its output
    Run {
        /// Action id (see `opsdeck actions`)
        action: String,
        /// Confirm a destructive action
        #[arg(short, long)]
        yes: bool,
    },
    /// Start services and print their logs until interrupted
    Supervise {
        /// Start every service, not only those marked autostart
        #[arg(long)]
        all: bool,
    },
    /// Follow a log file through the aggregator
    Logs {
        /// File to follow
        #[arg(short, long)]
        file: PathBuf,
        /// Only entries of this level: debug, info, warn, error
        #[arg(short, long)]
        level: Option<LogLevel>,
        /// Only lines whose message or source contains this text
        #[arg(short, long)]
        grep: Option<String>,
        /// Channel the lines are published on
        #[arg(long, default_value = "services")]
        channel: LogChannel,
        /// Read the existing content before following
        #[arg(long)]
        from_start: bool,
    },
    /// Create or check configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigCommands {
    /// Write the default configuration to FILE
    Init {
        file: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate a configuration file
    Validate { file: PathBuf },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_tui() {
        let cli = Cli::try_parse_from(["opsdeck"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["opsdeck", "run", "db-clean", "--yes", "--dry-run"]).unwrap();
        assert!(cli.dry_run);
        assert_eq!(
            cli.command,
            Some(Commands::Run {
                action: "db-clean".into(),
                yes: true
            })
        );
    }

    #[test]
    fn test_cli_logs_level_parsing() {
        let cli = Cli::try_parse_from([
            "opsdeck", "logs", "--file", "/tmp/app.log", "--level", "WARN", "--grep", "timeout",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Logs { level, grep, channel, .. }) => {
                assert_eq!(level, Some(LogLevel::Warn));
                assert_eq!(grep.as_deref(), Some("timeout"));
                assert_eq!(channel, LogChannel::Services);
            }
            other => panic!("Expected Logs command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_logs_without_level_shows_all() {
        let cli = Cli::try_parse_from(["opsdeck", "logs", "-f", "x.log"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Logs { level: None, .. })));
    }

    #[test]
    fn test_cli_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["opsdeck", "logs", "-f", "x.log", "-l", "loud"]).is_err());
    }

    #[test]
    fn test_cli_config_subcommands() {
        let cli = Cli::try_parse_from(["opsdeck", "config", "validate", "deck.json"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Config {
                action: ConfigCommands::Validate { file: "deck.json".into() }
            })
        );
    }
}
