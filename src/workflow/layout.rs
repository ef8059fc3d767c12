use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LayoutConfig;
use crate::episode::find_subfolder;

/// Directories used by one run over one season.
///
/// ```text
/// <season>/
///   *.mkv                 videos
///   Subtitle_ENGLISH/     source subtitles (Translate input)
///   Subtitle_HEBREW/      translated subtitles
///   Output/               muxed videos
///   .<run-id>/synced/     Sync results
///   .<run-id>/rtl/        RtlFix working copies
/// ```
#[derive(Debug, Clone)]
pub struct SeasonLayout {
    pub season_dir: PathBuf,
    pub run_id: String,
    pub english_dir: PathBuf,
    pub subtitle_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_root: PathBuf,
}

impl SeasonLayout {
    /// Subfolders are located case-insensitively; missing ones resolve to their
    /// configured name under the season directory.
    pub fn new(season_dir: &Path, config: &LayoutConfig) -> Self {
        let run_id = Uuid::new_v4().simple().to_string();
        let resolve = |name: &str| {
            find_subfolder(season_dir, name).unwrap_or_else(|| season_dir.join(name))
        };

        let layout = Self {
            season_dir: season_dir.to_path_buf(),
            english_dir: resolve(&config.english_folder_name),
            subtitle_dir: resolve(&config.subtitle_folder_name),
            output_dir: season_dir.join(&config.output_folder_name),
            temp_root: season_dir.join(format!(".{}", run_id)),
            run_id,
        };
        debug!("Season layout: {:?}", layout);
        layout
    }

    /// Read source subtitles from somewhere other than the season's English folder.
    pub fn with_english_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.english_dir = dir.into();
        self
    }

    pub fn synced_dir(&self) -> PathBuf {
        self.temp_root.join("synced")
    }

    pub fn rtl_dir(&self) -> PathBuf {
        self.temp_root.join("rtl")
    }

    /// Remove this run's temporary tree. Failures are logged, never raised.
    pub async fn cleanup(&self) {
        if !self.temp_root.exists() {
            return;
        }
        match tokio::fs::remove_dir_all(&self.temp_root).await {
            Ok(()) => debug!("Removed temporary directory {}", self.temp_root.display()),
            Err(e) => warn!(
                "Failed to remove temporary directory {}: {}",
                self.temp_root.display(),
                e
            ),
        }
    }
}
