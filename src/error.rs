use std::path::PathBuf;
use thiserror::Error;

use crate::episode::EpisodeKey;

#[derive(Error, Debug)]
pub enum SeasonSubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Subtitle parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Translation provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("External tool error: {0}")]
    ToolInvocation(#[from] ToolInvocationError),

    #[error("RTL correction error: {0}")]
    Automation(#[from] AutomationError),

    #[error("Translation provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No episodes could be matched in {}", .0.display())]
    NoMatchedEpisodes(PathBuf),

    #[error("No subtitle blocks found in {}", .0.display())]
    EmptySubtitle(PathBuf),
}

pub type Result<T> = std::result::Result<T, SeasonSubError>;

/// Why an asset was left out of the episode join.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("no episode marker found in {}", path.display())]
    Unidentified { path: PathBuf },

    #[error("{} duplicates {key} already claimed by {}", path.display(), kept.display())]
    DuplicateKey {
        path: PathBuf,
        key: EpisodeKey,
        kept: PathBuf,
    },

    #[error("{} looks like {key} but only by a low-confidence rule; rename it or accept low-confidence matches", path.display())]
    LowConfidence { path: PathBuf, key: EpisodeKey },

    #[error("{} ({key}) has no counterpart", path.display())]
    NoCounterpart { path: PathBuf, key: EpisodeKey },
}

impl MatchError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Unidentified { path }
            | Self::DuplicateKey { path, .. }
            | Self::LowConfidence { path, .. }
            | Self::NoCounterpart { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The bytes are neither UTF-8 nor the configured fallback encoding
    Encoding,
    /// Expected an index line
    MissingIndex,
    /// Time range line does not match `H:MM:SS,mmm --> H:MM:SS,mmm`
    MalformedTimeRange,
    /// End time lies before start time
    InvertedTimeRange,
    /// Input ended right after an index line
    UnexpectedEof,
}

/// Malformed subtitle document. Parsing is atomic, so this is the only outcome
/// of a failed parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} in block {block} at byte {offset} (line {line}): {detail}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// 1-based ordinal of the block being read
    pub block: usize,
    /// Byte offset of the offending line in the normalized text
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
    pub detail: String,
}

/// Translation provider gave up on a window after exhausting its retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("window {window} failed after {attempts} attempts: {message}")]
pub struct ProviderError {
    pub window: usize,
    pub attempts: u32,
    pub message: String,
}

/// An external subprocess exited with an error or never produced its output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocationError {
    #[error("failed to launch {tool}: {message}")]
    Launch { tool: String, message: String },

    #[error("{tool} exited with {code:?}: {stderr}")]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("{tool} did not write {}", path.display())]
    MissingOutput { tool: String, path: PathBuf },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("RTL correction failed for {}", path.display())]
pub struct AutomationError {
    pub path: PathBuf,
}
