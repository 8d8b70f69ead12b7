// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "agentflow",
    about = "Conversational agent runtime: message bus, dispatcher, and tool-calling orchestrator",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file (overrides auto-discovery).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Workspace root the agent operates in (defaults to the current directory).
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the agent loop, reading lines from stdin as a local `cli` channel.
    Run,
    /// Print a one-shot health snapshot and exit with a status reflecting readiness.
    Doctor {
        /// Print the snapshot as JSON instead of a formatted report.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// The default subcommand when none is given on the command line.
    pub fn command_or_default(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
