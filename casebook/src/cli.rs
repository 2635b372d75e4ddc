//! Command line interface
//!
//! CLI arguments and environment variable handling using clap.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "casebook")]
#[command(about = "Offline-first case management core for a small law office")]
#[command(version)]
pub struct Args {
    /// Directory holding the database, settings and exports
    #[arg(long, env = "CASEBOOK_DATA_DIR", default_value = "casebook-data")]
    pub data_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "CASEBOOK_LOG", default_value = "casebook=debug,info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the background services until interrupted (default)
    Run,

    /// Write the stored document to a JSON file
    Export { path: PathBuf },

    /// Write a timestamped export into the data directory
    Snapshot,

    /// Replace all data with the contents of a JSON file
    Import { path: PathBuf },

    /// Run one synchronization with the remote store
    Sync,

    /// List sessions that are past due and neither postponed nor decided
    Overdue,

    /// Postpone a session to a later date
    Postpone {
        session_id: String,

        /// Next session date (YYYY-MM-DD)
        next_date: NaiveDate,

        reason: String,

        /// Accept a weekend or holiday date
        #[arg(long)]
        confirm: bool,

        /// Allow postponing a session dated before today
        #[arg(long)]
        allow_past: bool,
    },
}

impl Args {
    pub fn action(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_run() {
        let args = Args::parse_from(["casebook", "--data-dir", "/tmp/office"]);
        assert_eq!(args.action(), Command::Run);
        assert_eq!(args.data_dir, PathBuf::from("/tmp/office"));
    }

    #[test]
    fn test_parse_postpone() {
        let args = Args::parse_from([
            "casebook",
            "postpone",
            "h1",
            "2024-05-14",
            "Expert report pending",
            "--confirm",
        ]);

        assert_eq!(
            args.action(),
            Command::Postpone {
                session_id: "h1".to_string(),
                next_date: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
                reason: "Expert report pending".to_string(),
                confirm: true,
                allow_past: false,
            }
        );
    }
}
