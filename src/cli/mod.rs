//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// sheetsync - mirror spreadsheet tables into a document store
#[derive(Parser, Debug)]
#[command(name = "sheetsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config_dir>/sheetsync/config.json)
    #[arg(long, global = true, env = "SHEETSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync tables from the sheet into the target store
    Run {
        /// Only sync these tables (repeatable)
        #[arg(long = "table", value_name = "NAME")]
        tables: Vec<String>,
    },

    /// Show what a run would do, without writing
    Status {
        /// Only inspect these tables (repeatable)
        #[arg(long = "table", value_name = "NAME")]
        tables: Vec<String>,
    },

    /// Validate the config file and environment
    Check,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_accepts_repeated_tables() {
        let cli = Cli::parse_from([
            "sheetsync", "run", "--table", "RefEtat", "--table", "RefForme", "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Run { tables } => assert_eq!(tables, vec!["RefEtat", "RefForme"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::parse_from(["sheetsync", "-vv", "check"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Check));
    }
}
