//! CLI argument definitions (clap)

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use reelforge_project::Stage;

/// reelforge - resumable script-to-video pipeline
#[derive(Parser, Debug)]
#[command(name = "reelforge")]
#[command(about = "Turn a narration script into video, audio and subtitles, one resumable stage at a time")]
#[command(long_about = r#"
reelforge drives every line of a project script through three stages:
decision (which generation method to use), audio and media. Progress is
stored in the project document itself, so a run can be interrupted and
resumed, and lines that already succeeded are never regenerated unless
forced.

EXAMPLES:
  # Create a project from a text file, one line of narration per line
  reelforge init demo --from script.txt

  # Run all stages
  reelforge run demo.json

  # Only decide methods, using the LLM when configured
  reelforge run demo.json --decision

  # Regenerate the media of one line
  reelforge run demo.json --media --force media --line L3

  # Pin a method by hand
  reelforge assign demo.json L2 text_to_video

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .reelforge/config.toml
  Use --config to specify an explicit config file path

EXIT CODES:
  0 success, 2 invalid arguments, 3 some lines failed, 4 corrupt project,
  5 method registry error, 6 preflight check failed, 9 project locked,
  130 interrupted
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run pipeline stages over a project
    ///
    /// Without stage flags every stage runs. Stages that already succeeded
    /// are skipped unless named with --force.
    Run(RunArgs),

    /// List the registered generation methods
    ListMethods {
        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Show per-line status without running anything
    Status {
        /// Project document
        project: PathBuf,

        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a project document from lines of text (a file or stdin)
    ///
    /// EXAMPLES:
    ///   reelforge init demo --from script.txt
    ///   printf 'First line\nSecond line\n' | reelforge init demo --out projects
    Init {
        /// Project name
        name: String,

        /// Directory to write `<name>.json` into
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Read lines from this file instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,

        /// Overwrite an existing document
        #[arg(long)]
        force: bool,
    },

    /// Record a manual method decision for one line
    Assign {
        /// Project document
        project: PathBuf,

        /// Line id
        line: String,

        /// Registered method name
        method: String,

        /// Break a stale project lock
        #[arg(long)]
        force_lock: bool,
    },

    /// Check the provider account, API key and local tools before a run
    ///
    /// Queries the provider's account endpoint for status and balance and
    /// looks for the ffmpeg and headless browser the methods need.
    Check {
        /// Balance below which the account is rejected
        #[arg(long, default_value_t = reelforge_llm::DEFAULT_MIN_BALANCE)]
        min_balance: f64,

        /// Skip the account query (no network access)
        #[arg(long)]
        offline: bool,

        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Combine per-line subtitles into one timeline and write ffmpeg concat lists
    Assemble {
        /// Project document
        project: PathBuf,

        /// Output directory (default: `<output_dir>/<project>/assembled`)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },
}

/// Arguments of `reelforge run`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Project document
    pub project: PathBuf,

    /// Root directory for generated artifacts
    #[arg(long)]
    pub out: Option<String>,

    /// Run the decision stage
    #[arg(long)]
    pub decision: bool,

    /// Run the audio stage
    #[arg(long)]
    pub audio: bool,

    /// Run the media stage
    #[arg(long)]
    pub media: bool,

    /// Re-run a stage even where it already succeeded (repeatable)
    #[arg(long, value_name = "STAGE", value_parser = parse_stage)]
    pub force: Vec<Stage>,

    /// Only process this line id (repeatable)
    #[arg(long = "line", value_name = "ID")]
    pub lines: Vec<String>,

    /// Lines processed at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Hard limit on one stage invocation, in seconds
    #[arg(long)]
    pub stage_timeout: Option<u64>,

    /// Method used when no model decision is available
    #[arg(long)]
    pub default_method: Option<String>,

    /// Dedicated audio method for every line
    #[arg(long)]
    pub audio_method: Option<String>,

    /// LLM provider for method decisions (openai-compatible, none)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// Print the run summary as canonical JSON
    #[arg(long)]
    pub json: bool,

    /// Break a stale project lock
    #[arg(long)]
    pub force_lock: bool,
}

impl RunArgs {
    /// Stages selected by the flags, in execution order
    #[must_use]
    pub fn selected_stages(&self) -> Vec<Stage> {
        [
            (Stage::Decision, self.decision),
            (Stage::Audio, self.audio),
            (Stage::Media, self.media),
        ]
        .into_iter()
        .filter_map(|(stage, on)| on.then_some(stage))
        .collect()
    }
}

fn parse_stage(value: &str) -> Result<Stage, String> {
    Stage::from_str(&value.trim().to_ascii_lowercase())
        .map_err(|_| format!("unknown stage '{value}' (expected decision, audio or media)"))
}
