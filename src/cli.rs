//! Command-line interface for the warden daemon.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "warden")]
#[command(version = "0.1.0")]
#[command(about = "Wallet transaction authorization and execution daemon", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration directory (reads default.toml, then {WARDEN_ENV}.toml)
    #[arg(short, long, default_value = "config", env = "WARDEN_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: pipeline, sweepers, and health server
    Run,

    /// Apply pending database migrations and exit
    Migrate,

    /// Print kill-switch state, transaction counts, and recent audit events
    Status {
        /// Number of audit events to show
        #[arg(long, default_value_t = 10)]
        audit: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::parse_from(["warden"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, "config");
    }

    #[test]
    fn test_status_audit_flag() {
        let cli = Cli::parse_from(["warden", "status", "--audit", "25"]);
        match cli.command {
            Some(Commands::Status { audit }) => assert_eq!(audit, 25),
            _ => panic!("expected status subcommand"),
        }
    }
}
