// Season pipeline: Translate -> Sync -> RtlFix -> Embed
//
// - layout: every directory a run reads or writes
// - progress: observers notified as jobs move through stages
// - orchestrator: stage-major driver

pub mod layout;
pub mod orchestrator;
pub mod progress;

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub use layout::SeasonLayout;
pub use orchestrator::{Collaborators, Orchestrator};
pub use progress::{ChannelObserver, ProgressEvent, ProgressObserver, TracingObserver};

use crate::episode::{EpisodeKey, EpisodeMatch};
use crate::error::MatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Translate,
    Sync,
    RtlFix,
    Embed,
}

impl Stage {
    /// Pipeline order
    pub const ALL: [Stage; 4] = [Stage::Translate, Stage::Sync, Stage::RtlFix, Stage::Embed];

    pub fn name(self) -> &'static str {
        match self {
            Self::Translate => "Translate",
            Self::Sync => "Sync",
            Self::RtlFix => "RtlFix",
            Self::Embed => "Embed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// Stage failed but the job carried on with its unmodified input
    SkippedFallback,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::SkippedFallback)
    }

    /// Statuses only move forward: Pending -> Running -> terminal.
    pub fn can_transition_to(self, next: StageStatus) -> bool {
        match self {
            Self::Pending => next == Self::Running,
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "FAILED",
            Self::SkippedFallback => "fallback",
        }
    }
}

/// Where a job ended up after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Completed, but at least one stage fell back
    Fallback,
    Failed(Stage),
    /// Left untouched by cancellation
    NotAttempted,
}

impl JobOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::Fallback)
    }
}

/// One matched episode travelling through the enabled stages.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub key: EpisodeKey,
    pub video: PathBuf,
    /// Subtitle the job started from
    pub source_subtitle: PathBuf,
    /// Latest subtitle produced for this job
    pub working_subtitle: PathBuf,
    /// Final artifact, once written
    pub output: Option<PathBuf>,
    statuses: BTreeMap<Stage, StageStatus>,
    failures: BTreeMap<Stage, String>,
}

impl PipelineJob {
    /// Only enabled stages get a status entry.
    pub fn new(matched: &EpisodeMatch, stages: &[Stage]) -> Self {
        Self {
            key: matched.key,
            video: matched.video.path.clone(),
            source_subtitle: matched.subtitle.path.clone(),
            working_subtitle: matched.subtitle.path.clone(),
            output: None,
            statuses: stages.iter().map(|&stage| (stage, StageStatus::Pending)).collect(),
            failures: BTreeMap::new(),
        }
    }

    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.statuses.get(&stage).copied()
    }

    pub fn failure(&self, stage: Stage) -> Option<&str> {
        self.failures.get(&stage).map(String::as_str)
    }

    /// Apply a forward transition; anything else is refused and logged.
    pub fn transition(&mut self, stage: Stage, next: StageStatus) -> bool {
        match self.statuses.get_mut(&stage) {
            Some(current) if current.can_transition_to(next) => {
                *current = next;
                true
            }
            current => {
                warn!("{}: refusing {} transition {:?} -> {:?}", self.key, stage, current, next);
                false
            }
        }
    }

    pub fn fail(&mut self, stage: Stage, reason: impl Into<String>) -> bool {
        let moved = self.transition(stage, StageStatus::Failed);
        if moved {
            self.failures.insert(stage, reason.into());
        }
        moved
    }

    /// Pending for `stage` with no earlier stage failed.
    pub fn is_eligible(&self, stage: Stage) -> bool {
        self.status(stage) == Some(StageStatus::Pending)
            && !self
                .statuses
                .range(..stage)
                .any(|(_, status)| *status == StageStatus::Failed)
    }

    pub fn outcome(&self) -> JobOutcome {
        if let Some((stage, _)) = self.statuses.iter().find(|(_, s)| **s == StageStatus::Failed) {
            return JobOutcome::Failed(*stage);
        }
        if self.statuses.values().any(|s| !s.is_terminal()) {
            return JobOutcome::NotAttempted;
        }
        if self.statuses.values().any(|s| *s == StageStatus::SkippedFallback) {
            JobOutcome::Fallback
        } else {
            JobOutcome::Completed
        }
    }
}

/// Cooperative cancellation flag shared with whoever drives the run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub completed: usize,
    pub fallback: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub season_dir: PathBuf,
    pub run_id: String,
    pub stages: Vec<Stage>,
    pub jobs: Vec<PipelineJob>,
    pub match_errors: Vec<MatchError>,
    pub cancelled: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl RunSummary {
    pub fn tally(&self) -> RunTally {
        let mut tally = RunTally::default();
        for job in &self.jobs {
            match job.outcome() {
                JobOutcome::Completed => tally.completed += 1,
                JobOutcome::Fallback => tally.fallback += 1,
                JobOutcome::Failed(_) => tally.failed += 1,
                JobOutcome::NotAttempted => tally.not_attempted += 1,
            }
        }
        tally
    }

    pub fn job(&self, key: EpisodeKey) -> Option<&PipelineJob> {
        self.jobs.iter().find(|job| job.key == key)
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    fn display_path(&self, path: &Path) -> String {
        pathdiff::diff_paths(path, &self.season_dir)
            .unwrap_or_else(|| path.to_path_buf())
            .display()
            .to_string()
    }

    /// Per-job per-stage status table followed by the tally line.
    pub fn render_table(&self) -> String {
        let mut out = format!("{:<8}", "Episode");
        for stage in &self.stages {
            out.push_str(&format!(" {:<10}", stage.name()));
        }
        out.push_str(" Output\n");
        out.push_str(&"-".repeat(9 + 11 * self.stages.len() + 30));
        out.push('\n');

        for job in &self.jobs {
            out.push_str(&format!("{:<8}", job.key.to_string()));
            for &stage in &self.stages {
                let label = job.status(stage).map(StageStatus::label).unwrap_or("-");
                out.push_str(&format!(" {:<10}", label));
            }
            let output = match (&job.output, job.outcome()) {
                (_, JobOutcome::Failed(stage)) => {
                    format!("{} failed: {}", stage, job.failure(stage).unwrap_or("unknown error"))
                }
                (Some(path), _) => self.display_path(path),
                (None, _) => String::new(),
            };
            out.push_str(&format!(" {}\n", output));
        }

        let tally = self.tally();
        out.push_str(&format!(
            "\n{} completed, {} completed with fallback, {} failed, {} not attempted",
            tally.completed, tally.fallback, tally.failed, tally.not_attempted
        ));
        if !self.match_errors.is_empty() {
            out.push_str(&format!(", {} files unmatched", self.match_errors.len()));
        }
        out.push('\n');
        out
    }

    pub fn log(&self) {
        let tally = self.tally();
        info!(
            "Run {} finished in {}s: {} completed, {} fallback, {} failed, {} not attempted{}",
            self.run_id,
            self.elapsed().num_seconds(),
            tally.completed,
            tally.fallback,
            tally.failed,
            tally.not_attempted,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        for job in &self.jobs {
            if let JobOutcome::Failed(stage) = job.outcome() {
                let reason = job.failure(stage).unwrap_or("unknown error");
                warn!("{} failed at {}: {}", job.key, stage, reason);
            }
        }
    }
}
