use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use super::RtlCorrector;
use crate::media::ToolCommand;

/// Hands the subtitle to an external editor automation script (for example one
/// that drives Subtitle Edit's "Fix RTL" action) and trusts its exit status.
pub struct EditorAutomationCorrector {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl EditorAutomationCorrector {
    /// `command` is the program followed by its fixed arguments; the subtitle
    /// path is appended last.
    pub fn new(command: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl RtlCorrector for EditorAutomationCorrector {
    async fn apply(&self, path: &Path) -> bool {
        let Some((program, fixed_args)) = self.command.split_first() else {
            warn!("No editor automation command configured");
            return false;
        };

        info!("Running editor automation on {}", path.display());

        let mut cmd = ToolCommand::new(program.as_str(), "Editor RTL automation")
            .args(fixed_args.iter().cloned())
            .path(path);
        if let Some(timeout) = self.timeout {
            cmd = cmd.timeout(timeout);
        }

        match cmd.execute().await {
            Ok(_) => path.is_file(),
            Err(e) => {
                warn!("Editor automation failed for {}: {}", path.display(), e);
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_status_decides_the_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ep.srt");
        std::fs::write(&path, "1\n00:00:01,000 --> 00:00:02,000\nשלום.\n\n").unwrap();

        let ok = EditorAutomationCorrector::new(
            vec!["sh".into(), "-c".into(), "test -f \"$0\"".into()],
            Some(Duration::from_secs(10)),
        );
        assert!(ok.apply(&path).await);

        let command = vec!["sh".into(), "-c".into(), "exit 3".into()];
        let failing = EditorAutomationCorrector::new(command, None);
        assert!(!failing.apply(&path).await);

        assert!(!EditorAutomationCorrector::new(Vec::new(), None).apply(&path).await);
    }
}
