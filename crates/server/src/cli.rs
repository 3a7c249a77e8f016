//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use newswire_core::Config;

/// newswire: scrape headlines, keep them reconciled, push every change live.
#[derive(Parser, Debug)]
#[command(name = "newswire", version, about)]
pub struct Cli {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` before `{KEY}`.
    #[arg(long, env = "NEWSWIRE_PROFILE")]
    pub profile: Option<String>,

    /// Override the HTTP port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the fetch interval in seconds.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Override the log directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP/WebSocket server with the periodic fetcher (default).
    Serve,
    /// Run a single fetch/reconcile tick, print its summary as JSON and exit.
    FetchOnce,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    /// Apply command-line overrides on top of the environment config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(interval) = self.interval {
            config.scheduler.interval_secs = interval;
        }
        if let Some(dir) = &self.log_dir {
            config.logging.dir = dir.clone();
        }
    }
}
