//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::domain::recording::{BackendKind, RecordConfig, TimeLimit};

/// record-engine - microphone capture to file or stdout
#[derive(Parser, Debug)]
#[command(name = "record-engine")]
#[command(version)]
#[command(about = "Record audio from a microphone to a file or stream raw PCM")]
#[command(long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record to a file until the time limit or Ctrl-C
    Record(RecordArgs),
    /// Write raw 16-bit PCM to stdout
    Stream(StreamArgs),
    /// List audio input devices
    Devices,
    /// Show which encoders each backend supports
    Encoders {
        /// Only show this backend
        #[arg(short = 'B', long, value_name = "BACKEND")]
        backend: Option<BackendArg>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Input format shared by `record` and `stream`
#[derive(Args, Debug, Clone, Default)]
pub struct FormatArgs {
    /// Sample rate in Hz
    #[arg(short = 'r', long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Channel count (1 or 2)
    #[arg(short = 'c', long, value_name = "N")]
    pub channels: Option<u16>,

    /// Input device name (see `record-engine devices`)
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// Stop after this much recorded time (e.g., 500ms, 30s, 2m30s)
    #[arg(short = 'd', long, value_name = "TIME")]
    pub duration: Option<String>,
}

/// `record` arguments
#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    /// Output file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: PathBuf,

    /// Encoder (aacLc, aacHe, amrNb, amrWb, opus, flac, pcm16bits, wav)
    #[arg(short = 'e', long, value_name = "ENCODER")]
    pub encoder: Option<String>,

    /// Target bit rate in bits per second
    #[arg(short = 'b', long, value_name = "BPS")]
    pub bit_rate: Option<u32>,

    /// Capture backend
    #[arg(short = 'B', long, value_name = "BACKEND")]
    pub backend: Option<BackendArg>,

    #[command(flatten)]
    pub format: FormatArgs,
}

/// `stream` arguments
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    #[command(flatten)]
    pub format: FormatArgs,
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Backend argument for clap ValueEnum
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Native,
    Helper,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Native => BackendKind::Native,
            BackendArg::Helper => BackendKind::Helper,
        }
    }
}

/// Parsed `record` options
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub output: PathBuf,
    pub config: RecordConfig,
    pub time_limit: Option<TimeLimit>,
    pub backend: BackendKind,
    pub helper_path: Option<PathBuf>,
}

/// Parsed `stream` options
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub config: RecordConfig,
    pub time_limit: Option<TimeLimit>,
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "encoder",
    "sample_rate",
    "channels",
    "bit_rate",
    "device",
    "backend",
    "helper_path",
];

/// Check if a config key is valid
pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}
