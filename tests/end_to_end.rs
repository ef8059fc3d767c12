use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use seasonsub::config::Config;
use seasonsub::episode::EpisodeKey;
use seasonsub::error::ToolInvocationError;
use seasonsub::media::{Multiplexer, SubtitleTrack, Synchronizer};
use seasonsub::rtl::{RtlStrategy, TextRtlCorrector};
use seasonsub::subtitle::SubtitleDocument;
use seasonsub::translate::{ProviderFailure, TranslationProvider, TranslationRequest};
use seasonsub::workflow::{Collaborators, Orchestrator, Stage, StageStatus};

const PILOT: &str = "\
1
00:00:01,000 --> 00:00:02,500
Hello.

2
00:00:03,000 --> 00:00:04,000
Who are you?

3
00:00:05,000 --> 00:00:07,250
I'm the new doctor.
";

/// Answers every line with a fixed Hebrew sentence.
struct StubProvider;

#[async_trait]
impl TranslationProvider for StubProvider {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderFailure> {
        Ok(vec!["אני רופא."; request.lines.len()].join("\n"))
    }
}

/// Copies the subtitle through unchanged.
struct CopySynchronizer;

#[async_trait]
impl Synchronizer for CopySynchronizer {
    async fn synchronize(
        &self,
        _video: &Path,
        subtitle: &Path,
        output: &Path,
    ) -> Result<(), ToolInvocationError> {
        std::fs::copy(subtitle, output).map(|_| ()).map_err(|e| ToolInvocationError::Launch {
            tool: "stub".into(),
            message: e.to_string(),
        })
    }

    async fn check_availability(&self) -> Result<String, ToolInvocationError> {
        Ok("stub".into())
    }
}

/// Writes the embedded subtitle into the "container" and remembers the call.
#[derive(Default)]
struct RecordingMultiplexer {
    calls: Mutex<Vec<(String, SubtitleTrack)>>,
}

#[async_trait]
impl Multiplexer for RecordingMultiplexer {
    async fn multiplex(
        &self,
        video: &Path,
        tracks: &[SubtitleTrack],
        output: &Path,
    ) -> Result<(), ToolInvocationError> {
        let subtitle = std::fs::read_to_string(&tracks[0].path).unwrap();
        std::fs::write(output, subtitle).unwrap();
        self.calls
            .lock()
            .unwrap()
            .push((video.file_name().unwrap().to_string_lossy().to_string(), tracks[0].clone()));
        Ok(())
    }

    async fn check_availability(&self) -> Result<String, ToolInvocationError> {
        Ok("stub".into())
    }
}

#[tokio::test]
async fn single_episode_runs_through_all_four_stages() {
    let season = TempDir::new().unwrap();
    season.child("Show.S01E01.mkv").write_str("video").unwrap();
    season.child("Subtitle_ENGLISH/Show - 1x01 - Pilot.srt").write_str(PILOT).unwrap();

    let mut config = Config::default();
    config.translate.inter_batch_delay_secs = 0.0;
    config.layout.write_bom = false;

    let multiplexer = Arc::new(RecordingMultiplexer::default());
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Collaborators {
            provider: Arc::new(StubProvider),
            synchronizer: Arc::new(CopySynchronizer),
            multiplexer: multiplexer.clone(),
            rtl_corrector: Arc::new(TextRtlCorrector::new(RtlStrategy::MovePunctuation, false)),
        },
    );

    let summary = orchestrator.run(season.path(), &Stage::ALL).await.unwrap();

    let job = summary.job(EpisodeKey::new(1, 1)).unwrap();
    for stage in Stage::ALL {
        assert_eq!(job.status(stage), Some(StageStatus::Done), "{} not done", stage);
    }
    assert_eq!(summary.tally().completed, 1);
    assert!(summary.match_errors.is_empty());

    // Exactly one output, named after the video
    let outputs: Vec<_> = std::fs::read_dir(season.path().join("Output"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(outputs, vec!["Show.S01E01.mkv"]);

    // Embedded subtitle is translated, RTL-fixed and keeps the original timing
    let embedded = std::fs::read_to_string(season.path().join("Output/Show.S01E01.mkv")).unwrap();
    let embedded = SubtitleDocument::parse(&embedded).unwrap();
    let source = SubtitleDocument::parse(PILOT).unwrap();
    assert_eq!(embedded.len(), 3);
    for (fixed, original) in embedded.blocks().iter().zip(source.blocks()) {
        assert_eq!((fixed.start, fixed.end), (original.start, original.end));
        assert_eq!(fixed.text, vec![".אני רופא"]);
    }

    let calls = multiplexer.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "Show.S01E01.mkv");
    assert_eq!(calls[0].1.language, "heb");
    assert!(calls[0].1.default_track);

    // Translation lands in the Hebrew folder, temporary files are gone
    let translated =
        std::fs::read_to_string(season.path().join("Subtitle_HEBREW/Show - 1x01 - Pilot.srt"))
            .unwrap();
    assert!(translated.contains("אני רופא."));
    let hidden = std::fs::read_dir(season.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(hidden, 0);
}
