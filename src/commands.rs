//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use edt_assistant::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Ask { login, question, .. } = cli.command {
//!     println!("{login} asks {question}");
//! }
//! ```

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Configuration file to use instead of `<config_dir>/config.yaml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write the default configuration and templates.
    Init,

    /// Print a student's timetable as read from the feed.
    #[clap(name = "schedule", alias = "s")]
    Schedule {
        /// University login, e.g. `rcastelain`.
        login: String,
    },

    /// Download a student's timetable and index it.
    #[clap(name = "ingest")]
    Ingest {
        login: String,

        /// One chunk per course instead of one per week.
        #[arg(long)]
        per_event: bool,

        /// Replace chunks already indexed for this student.
        #[arg(long)]
        replace: bool,
    },

    /// Ask a question about a student's timetable.
    #[clap(name = "ask", alias = "a")]
    Ask {
        login: String,

        question: String,

        /// First day to consider (YYYY-MM-DD).
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Last day to consider (YYYY-MM-DD).
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Number of chunks to retrieve; defaults to the configured `top_k`.
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },

    /// Propose meeting slots for two students over at most two weeks.
    #[clap(name = "reunion", alias = "r")]
    Reunion {
        login: String,

        other_login: String,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,
    },

    /// Delete the persisted index.
    Wipe,
}
