// Right-to-left display correction for translated subtitles
//
// - text: rewrites the document through the subtitle codec
// - editor: drives an external subtitle editor

pub mod editor;
pub mod text;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use editor::EditorAutomationCorrector;
pub use text::{RtlStrategy, TextRtlCorrector};

use crate::config::{Config, RtlBackend};
use crate::error::Result;

/// Fixes a subtitle file in place so RTL lines render correctly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RtlCorrector: Send + Sync {
    /// `true` when the file was corrected (or needed nothing); `false` on failure.
    async fn apply(&self, path: &Path) -> bool;
}

/// Factory for creating RTL correctors
pub struct RtlCorrectorFactory;

impl RtlCorrectorFactory {
    pub fn create_corrector(config: &Config) -> Result<Arc<dyn RtlCorrector>> {
        let text_corrector = |strategy| -> Result<Arc<dyn RtlCorrector>> {
            Ok(Arc::new(
                TextRtlCorrector::new(strategy, config.layout.write_bom)
                    .with_fallback_encoding(config.layout.hebrew_encoding()?),
            ))
        };

        match config.tools.rtl_backend {
            RtlBackend::MovePunctuation => text_corrector(RtlStrategy::MovePunctuation),
            RtlBackend::DirectionalMarks => text_corrector(RtlStrategy::DirectionalMarks),
            RtlBackend::EditorAutomation => Ok(Arc::new(EditorAutomationCorrector::new(
                config.tools.editor_automation_command.clone(),
                config.tools.editor_timeout_secs.map(Duration::from_secs),
            ))),
        }
    }
}
