use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::workflow::Stage;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Translate,
    Sync,
    Rtl,
    Embed,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Translate => Stage::Translate,
            StageArg::Sync => Stage::Sync,
            StageArg::Rtl => Stage::RtlFix,
            StageArg::Embed => Stage::Embed,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline over a season folder
    Run {
        /// Season folder containing the videos
        season_dir: PathBuf,

        /// Read source subtitles from this folder instead of the configured one
        #[arg(short, long)]
        english_dir: Option<PathBuf>,

        /// Stages to run, in pipeline order (comma-separated)
        #[arg(
            short,
            long,
            value_enum,
            value_delimiter = ',',
            default_values_t = [StageArg::Translate, StageArg::Sync, StageArg::Rtl, StageArg::Embed]
        )]
        stages: Vec<StageArg>,

        /// Keep the run's temporary folder
        #[arg(long)]
        keep_temp: bool,

        /// Pair files identified only by bare digit runs such as `601`
        #[arg(long)]
        accept_low_confidence: bool,
    },

    /// Show how videos and subtitles in a season folder pair up
    Match {
        season_dir: PathBuf,

        /// Subtitle folder to match against (default: configured English folder)
        #[arg(short, long)]
        subtitle_dir: Option<PathBuf>,

        #[arg(long)]
        accept_low_confidence: bool,
    },

    /// Translate a single subtitle file
    Translate {
        /// Input subtitle file
        #[arg(short, long)]
        input: PathBuf,

        /// Output subtitle file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Synchronize a subtitle file to a video
    Sync {
        #[arg(short, long)]
        video: PathBuf,

        #[arg(short, long)]
        subtitle: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Fix right-to-left punctuation in a subtitle file, in place
    Rtl {
        subtitle: PathBuf,
    },

    /// Embed a subtitle file into a video
    Embed {
        #[arg(short, long)]
        video: PathBuf,

        #[arg(short, long)]
        subtitle: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check that the translation provider and external tools are reachable
    CheckTools,

    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = "config.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
