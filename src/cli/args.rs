//! CLI argument definitions (clap derive).

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fabula - resumable narrative analysis over LLM and image backends
#[derive(Parser, Debug)]
#[command(name = "fabula")]
#[command(about = "Run a story through a resumable multi-phase LLM analysis pipeline")]
#[command(long_about = r#"
fabula extracts a story's narrative DNA, builds character profiles and a chapter
structure, drafts a production plan and (optionally) generates cover art. Every
phase is checkpointed, so an interrupted or failed job resumes where it stopped.

EXAMPLES:
  # Analyse a manuscript
  fabula run alpha --source alpha.txt --title "Alpha"

  # Read the source text from stdin with the fast profile set
  cat alpha.txt | fabula run alpha --source - --profile fast

  # Continue after a failure or Ctrl-C
  fabula resume alpha

  # Show per-phase status, or every job
  fabula status alpha --json
  fabula status

PHASES:
  dna_extraction -> character_profiles -> narrative_structure
  -> production_plan -> cover_art

CONFIGURATION:
  Precedence: CLI flags > config file > defaults.
  The config file is found by searching upward from the working directory for
  .fabula/config.toml; use --config to name one explicitly.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// State directory for checkpoints, memory and telemetry (overrides FABULA_HOME)
    #[arg(long, global = true)]
    pub home: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Per-call model timeout in seconds
    #[arg(long, global = true)]
    pub call_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a job (or resume it if it exists) and run its phases
    Run {
        /// Job identifier ([A-Za-z0-9._-])
        job_id: String,

        /// Path to the source text, or '-' for stdin
        #[arg(long)]
        source: String,

        /// Display title (defaults to the job id)
        #[arg(long)]
        title: Option<String>,

        /// Model profile set for a new job
        #[arg(long)]
        profile: Option<String>,

        /// Print the job result as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Continue an existing job from its checkpoint
    Resume {
        job_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Show a job's per-phase status without running anything; all jobs when no id is given
    Status {
        job_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Inspect reasoning memory
    #[command(subcommand)]
    Memory(MemoryCommands),

    /// List the available model profile sets
    Profiles {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum MemoryCommands {
    /// List stored traces for a phase, best first
    List {
        /// Phase name, e.g. character_profiles
        phase: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
}
