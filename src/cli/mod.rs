//! CLI command definitions for localdb-template
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and clean up LocalDB template instances
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML settings file (supplies the instance and directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show whether an instance exists and is running
    Info {
        /// Instance name (defaults to the one in --config)
        instance: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Stop a running instance
    Stop {
        /// Instance name (defaults to the one in --config)
        instance: Option<String>,
    },

    /// Stop and delete an instance, then remove its directory
    Delete {
        /// Instance name (defaults to the one in --config)
        instance: Option<String>,

        /// Directory to remove (defaults to the configured or default one)
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },

    /// Print the directory used for an instance's template and clones
    Dir {
        /// Instance name (defaults to the one in --config)
        instance: Option<String>,
    },
}

impl Command {
    /// Instance name given on the command line, if any.
    pub fn instance(&self) -> Option<&str> {
        match self {
            Command::Info { instance, .. }
            | Command::Stop { instance }
            | Command::Delete { instance, .. }
            | Command::Dir { instance } => instance.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let cli = Cli::parse_from(["localdb-template", "info", "Tests", "--json"]);
        assert!(matches!(cli.command, Command::Info { json: true, .. }));
        assert_eq!(cli.command.instance(), Some("Tests"));
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn test_parse_delete_with_directory() {
        let cli = Cli::parse_from([
            "localdb-template",
            "--verbose",
            "delete",
            "Tests",
            "--directory",
            "/tmp/LocalDb/Tests",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Delete { directory, .. } => {
                assert_eq!(directory, Some(PathBuf::from("/tmp/LocalDb/Tests")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_instance_from_config_only() {
        let cli = Cli::parse_from(["localdb-template", "--config", "localdb.yaml", "dir"]);
        assert_eq!(cli.command.instance(), None);
        assert_eq!(cli.config, Some(PathBuf::from("localdb.yaml")));
    }
}
