// External media tools
//
// - commands: subprocess runner and command-line builders
// - processor: alass and mkvmerge backed collaborators

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::ToolsConfig;
use crate::error::ToolInvocationError;

/// One subtitle stream to add to the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub path: PathBuf,
    /// ISO 639-2 tag, e.g. `heb`
    pub language: String,
    pub name: String,
    pub default_track: bool,
}

/// Aligns a subtitle to a video's audio track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Write a synchronized copy of `subtitle_path` to `output_path`.
    async fn synchronize(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<(), ToolInvocationError>;

    /// Version line of the underlying tool
    async fn check_availability(&self) -> Result<String, ToolInvocationError>;
}

/// Muxes subtitle tracks into a video container.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Multiplexer: Send + Sync {
    async fn multiplex(
        &self,
        video_path: &Path,
        tracks: &[SubtitleTrack],
        output_path: &Path,
    ) -> Result<(), ToolInvocationError>;

    async fn check_availability(&self) -> Result<String, ToolInvocationError>;
}

/// Factory for the tool-backed collaborators
pub struct MediaToolFactory;

impl MediaToolFactory {
    pub fn create_synchronizer(config: &ToolsConfig) -> Arc<dyn Synchronizer> {
        Arc::new(AlassSynchronizer::new(config))
    }

    pub fn create_multiplexer(config: &ToolsConfig) -> Arc<dyn Multiplexer> {
        Arc::new(MkvmergeMultiplexer::new(config))
    }
}
