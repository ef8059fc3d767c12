use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use super::{RunTally, Stage, StageStatus};
use crate::episode::EpisodeKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StageStarted {
        stage: Stage,
        total: usize,
    },
    /// Sent after every job's attempt at a stage
    JobFinished {
        stage: Stage,
        key: EpisodeKey,
        status: StageStatus,
        completed: usize,
        total: usize,
    },
    RunFinished {
        tally: RunTally,
        cancelled: bool,
    },
}

/// Fire-and-forget progress sink. Implementations must not block the run.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

/// Writes progress to the log.
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn notify(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage, total } => {
                info!("=== {} ({} episodes) ===", stage, total);
            }
            ProgressEvent::JobFinished { stage, key, status, completed, total } => {
                info!("[{}/{}] {} {}: {:?}", completed, total, stage, key, status);
            }
            ProgressEvent::RunFinished { tally, cancelled } => {
                info!(
                    "Pipeline finished{}: {} completed, {} fallback, {} failed, {} not attempted",
                    if *cancelled { " (cancelled)" } else { "" },
                    tally.completed,
                    tally.fallback,
                    tally.failed,
                    tally.not_attempted
                );
            }
        }
    }
}

/// Forwards events into a tokio channel; a dropped receiver is ignored.
pub struct ChannelObserver {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelObserver {
    fn notify(&self, event: &ProgressEvent) {
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn channel_observer_forwards_and_survives_closed_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);
        let event = ProgressEvent::StageStarted { stage: Stage::Sync, total: 3 };

        observer.notify(&event);
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        observer.notify(&event);
    }
}
