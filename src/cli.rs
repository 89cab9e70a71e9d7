//! Command-line interface built on clap.
//!
//! [`Cli`] carries the [`Command`] subcommands (synth, status, list, demo)
//! and the global flags (--config, --max-attempts, --log-level, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::state_machine::{JobStatus, Requester};

/// Upper bound for `demo --jobs`.
pub const MAX_DEMO_JOBS: i64 = 256;

/// Narrator: background text-to-speech jobs with bounded retries.
#[derive(Debug, Parser)]
#[command(name = "narrator", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file (defaults to ./narrator.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the number of synthesis attempts per job.
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Show per-attempt details.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Who a job is created for, or filtered by.
#[derive(Debug, Clone, Default, Args)]
#[group(multiple = false)]
pub struct RequesterArgs {
    /// Registered user id.
    #[arg(long)]
    pub user: Option<String>,

    /// Guest session id.
    #[arg(long)]
    pub guest: Option<String>,
}

impl RequesterArgs {
    pub fn requester(&self) -> Option<Requester> {
        match (&self.user, &self.guest) {
            (Some(id), _) => Some(Requester::User(id.clone())),
            (None, Some(id)) => Some(Requester::Guest(id.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a synthesis job and wait for its result.
    Synth {
        /// Text to convert to speech.
        text: String,

        /// Voice name; defaults to the language's default voice.
        #[arg(long)]
        voice: Option<String>,

        /// Language code.
        #[arg(long, default_value = "en")]
        lang: String,

        #[command(flatten)]
        requester: RequesterArgs,

        /// Call the remote TTS service instead of the local worker.
        #[arg(long, default_value_t = false)]
        remote: bool,
    },

    /// Show one job record.
    Status {
        /// Job id.
        id: String,
    },

    /// List stored jobs.
    List {
        #[command(flatten)]
        requester: RequesterArgs,

        /// Only jobs in this status (CREATED, PROCESSING, READY, FAILED).
        #[arg(long)]
        status: Option<JobStatus>,

        /// Only unfinished jobs untouched for at least this many seconds.
        #[arg(long, conflicts_with = "status")]
        stale_secs: Option<u64>,
    },

    /// Submit several jobs at once against the simulated local model.
    Demo {
        /// Number of concurrent jobs.
        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..=MAX_DEMO_JOBS))]
        jobs: u32,
    },
}
