//! CLI argument definitions using clap
//!
//! Commands:
//! - chronosync run --config <path>
//! - chronosync once --config <path> [--dry-run]
//! - chronosync check --config <path>
//! - chronosync status --config <path>
//! - chronosync refresh --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chronosync - incremental record sync connector
#[derive(Parser, Debug)]
#[command(name = "chronosync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the source and sync until interrupted
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./chronosync.json")]
        config: PathBuf,
    },

    /// Sync everything above the watermark, then exit
    Once {
        /// Path to configuration file
        #[arg(long, default_value = "./chronosync.json")]
        config: PathBuf,

        /// Fetch and transform only; nothing is delivered or committed
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration, formulas and source connectivity
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./chronosync.json")]
        config: PathBuf,
    },

    /// Print the committed watermark
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./chronosync.json")]
        config: PathBuf,
    },

    /// Resend the next slice of already synced records
    Refresh {
        /// Path to configuration file
        #[arg(long, default_value = "./chronosync.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_dry_run_flag() {
        let cli = Cli::try_parse_from(["chronosync", "once", "--config", "c.json", "--dry-run"])
            .unwrap();
        match cli.command {
            Command::Once { config, dry_run } => {
                assert_eq!(config, PathBuf::from("c.json"));
                assert!(dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["chronosync", "status"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Status { config } if config == PathBuf::from("./chronosync.json")
        ));
    }
}
