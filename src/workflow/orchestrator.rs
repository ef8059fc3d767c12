use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info, warn};

use super::progress::{ProgressEvent, ProgressObserver};
use super::{CancelHandle, PipelineJob, RunSummary, SeasonLayout, Stage, StageStatus};
use crate::config::Config;
use crate::episode::{match_assets_with, scan_assets, AssetKind, MatchOutcome, MatchPolicy};
use crate::error::{AutomationError, Result, SeasonSubError};
use crate::media::{MediaToolFactory, Multiplexer, SubtitleTrack, Synchronizer};
use crate::rtl::{RtlCorrector, RtlCorrectorFactory};
use crate::subtitle::{read_document_with_fallback, write_document};
use crate::translate::{BatchTranslator, ProviderFactory, Sleeper, TranslationProvider};

/// Everything the pipeline talks to outside its own process.
pub struct Collaborators {
    pub provider: Arc<dyn TranslationProvider>,
    pub synchronizer: Arc<dyn Synchronizer>,
    pub multiplexer: Arc<dyn Multiplexer>,
    pub rtl_corrector: Arc<dyn RtlCorrector>,
}

impl Collaborators {
    /// The production backends selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            provider: ProviderFactory::create_provider(&config.translate)?,
            synchronizer: MediaToolFactory::create_synchronizer(&config.tools),
            multiplexer: MediaToolFactory::create_multiplexer(&config.tools),
            rtl_corrector: RtlCorrectorFactory::create_corrector(config)?,
        })
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    translator: BatchTranslator,
    synchronizer: Arc<dyn Synchronizer>,
    multiplexer: Arc<dyn Multiplexer>,
    rtl_corrector: Arc<dyn RtlCorrector>,
    observers: Vec<Arc<dyn ProgressObserver>>,
    cancel: CancelHandle,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Self {
        let translator = BatchTranslator::new(config.translate.clone(), collaborators.provider);
        Self {
            config,
            translator,
            synchronizer: collaborators.synchronizer,
            multiplexer: collaborators.multiplexer,
            rtl_corrector: collaborators.rtl_corrector,
            observers: Vec::new(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.translator = self.translator.with_sleeper(sleeper);
        self
    }

    /// Share an externally owned cancellation flag (e.g. a Ctrl-C handler).
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for stopping the run between jobs.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn notify(&self, event: ProgressEvent) {
        for observer in &self.observers {
            observer.notify(&event);
        }
    }

    /// Probe the external tools the enabled stages need. Returns `(tool, result)`
    /// pairs; nothing here aborts a run.
    pub async fn verify_tools(
        &self,
        stages: &[Stage],
    ) -> Vec<(&'static str, std::result::Result<String, String>)> {
        let mut results = Vec::new();

        if stages.contains(&Stage::Sync) {
            let found = self.synchronizer.check_availability().await;
            results.push(("synchronizer", found.map_err(|e| e.to_string())));
        }
        if stages.contains(&Stage::Embed) {
            let found = self.multiplexer.check_availability().await;
            results.push(("multiplexer", found.map_err(|e| e.to_string())));
        }

        for (tool, result) in &results {
            match result {
                Ok(version) => info!("{} found: {}", tool, version),
                Err(e) => warn!("{} unavailable: {}", tool, e),
            }
        }
        results
    }

    /// Match the season's videos with the subtitles the first enabled stage reads.
    pub fn plan(&self, layout: &SeasonLayout, stages: &[Stage]) -> Result<MatchOutcome> {
        let extensions = &self.config.layout.video_extensions;
        let videos = scan_assets(&layout.season_dir, AssetKind::Video, extensions)?;

        let subtitle_dir = if stages.contains(&Stage::Translate) {
            &layout.english_dir
        } else {
            &layout.subtitle_dir
        };
        let subtitles = if subtitle_dir.is_dir() {
            scan_assets(subtitle_dir, AssetKind::Subtitle, &["srt".to_string()])?
        } else {
            warn!("Subtitle folder not found: {}", subtitle_dir.display());
            Vec::new()
        };

        let policy = MatchPolicy {
            accept_low_confidence: self.config.matching.accept_low_confidence,
        };
        let outcome = match_assets_with(&videos, &subtitles, policy);
        outcome.log_report();
        Ok(outcome)
    }

    pub async fn run(&self, season_dir: &Path, stages: &[Stage]) -> Result<RunSummary> {
        self.run_with_layout(SeasonLayout::new(season_dir, &self.config.layout), stages).await
    }

    /// Execute the enabled stages stage-major over every matched episode.
    ///
    /// Only an empty match set fails the run; everything else is recorded per
    /// job in the returned summary.
    pub async fn run_with_layout(
        &self,
        layout: SeasonLayout,
        stages: &[Stage],
    ) -> Result<RunSummary> {
        let started_at = Local::now();
        let stages: Vec<Stage> = Stage::ALL.into_iter().filter(|s| stages.contains(s)).collect();

        if !layout.season_dir.is_dir() {
            return Err(SeasonSubError::FileNotFound(layout.season_dir.display().to_string()));
        }
        info!("Processing season: {} (run {})", layout.season_dir.display(), layout.run_id);

        let outcome = self.plan(&layout, &stages)?;
        if outcome.matches.is_empty() {
            return Err(SeasonSubError::NoMatchedEpisodes(layout.season_dir.clone()));
        }

        let mut jobs: Vec<PipelineJob> =
            outcome.matches.iter().map(|m| PipelineJob::new(m, &stages)).collect();

        for &stage in &stages {
            if self.cancel.is_cancelled() {
                break;
            }
            self.run_stage(stage, &mut jobs, &layout).await;
        }

        if !stages.contains(&Stage::Embed) {
            self.publish_subtitles(&mut jobs, &layout).await;
        }

        if self.config.layout.keep_temp_files {
            info!("Keeping temporary files in {}", layout.temp_root.display());
        } else {
            layout.cleanup().await;
        }

        let cancelled = self.cancel.is_cancelled();
        let summary = RunSummary {
            season_dir: layout.season_dir.clone(),
            run_id: layout.run_id.clone(),
            stages,
            jobs,
            match_errors: outcome
                .unmatched_videos
                .into_iter()
                .chain(outcome.unmatched_subtitles)
                .collect(),
            cancelled,
            started_at,
            finished_at: Local::now(),
        };

        self.notify(ProgressEvent::RunFinished {
            tally: summary.tally(),
            cancelled,
        });
        summary.log();
        Ok(summary)
    }

    async fn run_stage(&self, stage: Stage, jobs: &mut [PipelineJob], layout: &SeasonLayout) {
        let eligible: Vec<usize> =
            (0..jobs.len()).filter(|&i| jobs[i].is_eligible(stage)).collect();
        let total = eligible.len();
        self.notify(ProgressEvent::StageStarted { stage, total });

        for (n, &i) in eligible.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Cancelled during {}; {} episodes not attempted", stage, total - n);
                return;
            }

            let job = &mut jobs[i];
            job.transition(stage, StageStatus::Running);

            let status = match self.attempt(stage, job, layout).await {
                Ok(status) => {
                    job.transition(stage, status);
                    status
                }
                Err(e) => {
                    error!("{} {} failed: {}", job.key, stage, e);
                    job.fail(stage, e.to_string());
                    StageStatus::Failed
                }
            };

            self.notify(ProgressEvent::JobFinished {
                stage,
                key: job.key,
                status,
                completed: n + 1,
                total,
            });
        }
    }

    async fn attempt(
        &self,
        stage: Stage,
        job: &mut PipelineJob,
        layout: &SeasonLayout,
    ) -> Result<StageStatus> {
        match stage {
            Stage::Translate => self.translate(job, layout).await,
            Stage::Sync => self.sync(job, layout).await,
            Stage::RtlFix => self.fix_rtl(job, layout).await,
            Stage::Embed => self.embed(job, layout).await,
        }
    }

    async fn translate(&self, job: &mut PipelineJob, layout: &SeasonLayout) -> Result<StageStatus> {
        let file_name = file_name(&job.source_subtitle)?;
        let destination = layout.subtitle_dir.join(file_name);
        info!("Translating {} -> {}", job.source_subtitle.display(), destination.display());

        let encoding = self.config.layout.english_encoding()?;
        let document = read_document_with_fallback(&job.working_subtitle, encoding).await?;
        if document.is_empty() {
            return Err(SeasonSubError::EmptySubtitle(job.working_subtitle.clone()));
        }
        let outcome = self.translator.translate(&document).await?;
        if !outcome.report.is_complete() {
            warn!(
                "{}: {} blocks left untranslated in {} partial windows",
                job.key, outcome.report.untranslated_blocks, outcome.report.partial_windows
            );
        }
        write_document(&outcome.document, &destination, self.config.layout.write_bom).await?;

        job.working_subtitle = destination;
        Ok(StageStatus::Done)
    }

    async fn sync(&self, job: &mut PipelineJob, layout: &SeasonLayout) -> Result<StageStatus> {
        let destination = layout.synced_dir().join(format!("{}.srt", job.key));
        fs::create_dir_all(layout.synced_dir()).await?;

        let status = match self
            .synchronizer
            .synchronize(&job.video, &job.working_subtitle, &destination)
            .await
        {
            Ok(()) => StageStatus::Done,
            Err(e) => {
                warn!("{}: sync failed ({}), continuing with the unsynced subtitle", job.key, e);
                fs::copy(&job.working_subtitle, &destination).await?;
                StageStatus::SkippedFallback
            }
        };

        job.working_subtitle = destination;
        Ok(status)
    }

    async fn fix_rtl(&self, job: &mut PipelineJob, layout: &SeasonLayout) -> Result<StageStatus> {
        // Correct a private copy so user files are never edited in place
        let working_copy = layout.rtl_dir().join(format!("{}.srt", job.key));
        fs::create_dir_all(layout.rtl_dir()).await?;
        fs::copy(&job.working_subtitle, &working_copy).await?;

        if !self.rtl_corrector.apply(&working_copy).await {
            return Err(AutomationError { path: working_copy }.into());
        }

        job.working_subtitle = working_copy;
        Ok(StageStatus::Done)
    }

    async fn embed(&self, job: &mut PipelineJob, layout: &SeasonLayout) -> Result<StageStatus> {
        let output = layout.output_dir.join(file_name(&job.video)?);

        if self.config.embed.skip_existing && output.exists() {
            warn!("Skipping {}: output already exists at {}", job.key, output.display());
            job.output = Some(output);
            return Ok(StageStatus::Done);
        }

        fs::create_dir_all(&layout.output_dir).await?;
        let track = SubtitleTrack {
            path: job.working_subtitle.clone(),
            language: self.config.embed.language.clone(),
            name: self.config.embed.track_name.clone(),
            default_track: self.config.embed.default_track,
        };
        self.multiplexer.multiplex(&job.video, &[track], &output).await?;

        job.output = Some(output);
        Ok(StageStatus::Done)
    }

    /// Without Embed, the last stage's subtitle is the deliverable: copy it out of
    /// the temporary tree as `<video stem>.srt` in the output folder.
    async fn publish_subtitles(&self, jobs: &mut [PipelineJob], layout: &SeasonLayout) {
        for job in jobs.iter_mut() {
            if !job.outcome().is_success() {
                continue;
            }
            if !job.working_subtitle.starts_with(&layout.temp_root) {
                job.output = Some(job.working_subtitle.clone());
                continue;
            }

            let Some(stem) = job.video.file_stem() else {
                continue;
            };
            let destination = layout.output_dir.join(format!("{}.srt", stem.to_string_lossy()));
            let copied = match fs::create_dir_all(&layout.output_dir).await {
                Ok(()) => fs::copy(&job.working_subtitle, &destination).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match copied {
                Ok(()) => job.output = Some(destination),
                Err(e) => warn!("{}: could not write {}: {}", job.key, destination.display(), e),
            }
        }
    }
}

fn file_name(path: &Path) -> Result<PathBuf> {
    path.file_name()
        .map(PathBuf::from)
        .ok_or_else(|| SeasonSubError::Config(format!("Invalid file name: {}", path.display())))
}
