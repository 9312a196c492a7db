//! Command-line interface for corpusmill
//!
//! Provides argument parsing using clap derive macros.

use crate::import::KeyStyle;
use crate::ledger::LedgerSchema;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Speech corpus preparation
#[derive(Parser, Debug)]
#[command(
    name = "corpusmill",
    version,
    about = "Cut diarized recordings into samples and consolidate them into partitioned stores"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cut episodes of a recording corpus into samples
    ///
    /// Reads <recordings_dir>/<dataset>/<episode>.json and .wav and appends
    /// samples to <recordings_dir>/<dataset>.blob and its ledger.
    Segment {
        /// Recording corpus name
        dataset: String,

        /// Episodes to segment
        #[arg(required = true)]
        episodes: Vec<String>,
    },

    /// Label a segmented corpus with dialects per speaker
    ///
    /// Runs the classifier command from [classification] over groups of each
    /// speaker's phoneme strings and writes the majority label to the ledger.
    Classify {
        /// Corpus name
        dataset: String,

        /// Upper bound in seconds for one classifier input group
        #[arg(long, value_name = "SECS")]
        group_max_secs: Option<f64>,
    },

    /// Import an external corpus of ready-cut clips
    ///
    /// A .tsv manifest is read as a table with a header row; any other file
    /// as per-speaker `sample|text` metadata next to its WAV clips.
    Import {
        /// Corpus name
        dataset: String,

        /// Manifest files
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Directory clip paths of a table are relative to (default: the manifest's)
        #[arg(long, value_name = "DIR")]
        audio_dir: Option<PathBuf>,

        /// How clip paths become sample names: folder-stem, stem or last-dash
        #[arg(long, value_name = "STYLE")]
        keys: Option<KeyStyle>,

        /// Speaker of per-speaker metadata
        #[arg(long, value_name = "ID")]
        speaker: Option<String>,

        /// Dialect of per-speaker metadata
        #[arg(long, value_name = "DIALECT")]
        dialect: Option<String>,

        /// Canton of per-speaker metadata; sets speaker SPEAKER_ch_<canton> and its region
        #[arg(long, value_name = "CANTON", conflicts_with = "dialect")]
        canton: Option<String>,
    },

    /// Move one corpus's samples into per-dialect stores
    ToDialects {
        /// Corpus name
        dataset: String,

        /// Ledger schema: detailed or reduced (default: detected)
        #[arg(long, value_name = "SCHEMA")]
        schema: Option<LedgerSchema>,

        /// Maximum concurrent partition workers (0: one per partition)
        #[arg(long, short = 'j', value_name = "N")]
        max_workers: Option<usize>,
    },

    /// Shuffle corpora into duration-bounded shards
    ToShards {
        /// Corpora to shard
        #[arg(required = true)]
        datasets: Vec<String>,

        /// Corpus spread over all shards by count
        #[arg(long, value_name = "DATASET")]
        distributed: Option<String>,

        /// Number of shards
        #[arg(long, value_name = "N")]
        shards: Option<usize>,

        /// Ledger schema of every corpus: detailed or reduced (default: detected per corpus)
        #[arg(long, value_name = "SCHEMA")]
        schema: Option<LedgerSchema>,

        /// Maximum concurrent partition workers (0: one per partition)
        #[arg(long, short = 'j', value_name = "N")]
        max_workers: Option<usize>,
    },

    /// List keys and attribute names of a store file
    Inspect {
        /// Path to a .blob store
        store: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

impl Cli {
    /// Default log filter for the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
