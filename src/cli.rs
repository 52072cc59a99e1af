// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lavis",
    version,
    about = "Headless desktop automation agent — cognitive core"
)]
pub struct Cli {
    /// Explicit config file (merged over the standard search paths)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (RUST_LOG-style filters also apply)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP surface and the scheduler (the default)
    Serve {
        /// Bind address override, e.g. 127.0.0.1:8377
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one goal through the reasoning loop and print the response
    Run {
        /// The goal text
        goal: String,
    },
    /// Print the merged configuration and exit
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_bind() {
        let cli = Cli::parse_from(["lavis", "serve", "--bind", "0.0.0.0:9000"]);
        match cli.command {
            Some(Commands::Serve { bind }) => assert_eq!(bind.as_deref(), Some("0.0.0.0:9000")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_run_goal() {
        let cli = Cli::parse_from(["lavis", "run", "open the mail app"]);
        match cli.command {
            Some(Commands::Run { goal }) => assert_eq!(goal, "open the mail app"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_is_allowed() {
        let cli = Cli::parse_from(["lavis"]);
        assert!(cli.command.is_none());
    }
}
