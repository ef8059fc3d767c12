use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ToolsConfig;
use crate::error::ToolInvocationError;
use super::{
    ensure_output, resolve_binary, Multiplexer, SubtitleTrack, Synchronizer, ToolCommandBuilder,
};

/// Audio-based subtitle synchronizer driving `alass-cli`
pub struct AlassSynchronizer {
    binary_path: String,
    command_builder: ToolCommandBuilder,
}

impl AlassSynchronizer {
    pub fn new(config: &ToolsConfig) -> Self {
        let binary_path = resolve_binary(&config.synchronizer_path, &["alass-cli", "alass"]);
        Self {
            command_builder: ToolCommandBuilder::new(
                &binary_path,
                Duration::from_secs(config.sync_timeout_secs),
            ),
            binary_path,
        }
    }
}

#[async_trait]
impl Synchronizer for AlassSynchronizer {
    async fn synchronize(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<(), ToolInvocationError> {
        info!("Synchronizing {} against {}", subtitle_path.display(), video_path.display());

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ToolInvocationError::Launch {
                tool: self.binary_path.clone(),
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        self.command_builder
            .synchronize(video_path, subtitle_path, output_path)
            .execute()
            .await?;
        ensure_output(&self.binary_path, output_path).await?;

        debug!("Synchronized subtitle written to {}", output_path.display());
        Ok(())
    }

    async fn check_availability(&self) -> Result<String, ToolInvocationError> {
        let version = self.command_builder.version_check().execute().await?.first_line();
        info!("Synchronizer is available: {}", version);
        Ok(version)
    }
}

/// Container muxer driving `mkvmerge`
pub struct MkvmergeMultiplexer {
    binary_path: String,
    command_builder: ToolCommandBuilder,
}

impl MkvmergeMultiplexer {
    pub fn new(config: &ToolsConfig) -> Self {
        let binary_path = resolve_binary(&config.multiplexer_path, &["mkvmerge"]);
        Self {
            command_builder: ToolCommandBuilder::new(
                &binary_path,
                Duration::from_secs(config.mux_timeout_secs),
            ),
            binary_path,
        }
    }
}

#[async_trait]
impl Multiplexer for MkvmergeMultiplexer {
    async fn multiplex(
        &self,
        video_path: &Path,
        tracks: &[SubtitleTrack],
        output_path: &Path,
    ) -> Result<(), ToolInvocationError> {
        info!(
            "Embedding {} subtitle track(s) into {} -> {}",
            tracks.len(),
            video_path.display(),
            output_path.display()
        );

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ToolInvocationError::Launch {
                tool: self.binary_path.clone(),
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        let output = self
            .command_builder
            .multiplex(video_path, tracks, output_path)
            .execute()
            .await?;
        if output.code == Some(1) {
            warn!("mkvmerge finished with warnings: {}", output.first_line());
        }
        ensure_output(&self.binary_path, output_path).await?;

        Ok(())
    }

    async fn check_availability(&self) -> Result<String, ToolInvocationError> {
        let version = self.command_builder.version_check().execute().await?.first_line();
        info!("Multiplexer is available: {}", version);
        Ok(version)
    }
}
