//! seasonsub - batch subtitle pipeline for TV seasons
//!
//! Entry point: parses the command line, sets up logging and configuration and
//! hands off to the pipeline or to a single-stage command.

use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use seasonsub::cli::{Args, Commands};
use seasonsub::config::Config;
use seasonsub::episode::{find_subfolder, match_assets_with, scan_assets, AssetKind, MatchPolicy};
use seasonsub::error::{AutomationError, SeasonSubError};
use seasonsub::media::{MediaToolFactory, SubtitleTrack};
use seasonsub::rtl::RtlCorrectorFactory;
use seasonsub::subtitle::{read_document_with_fallback, write_document};
use seasonsub::translate::{check_provider_availability, BatchTranslator, ProviderFactory};
use seasonsub::workflow::{
    CancelHandle, Collaborators, Orchestrator, ProgressEvent, ProgressObserver, SeasonLayout, Stage,
    TracingObserver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Run { season_dir, english_dir, stages, keep_temp, accept_low_confidence } => {
            config.layout.keep_temp_files |= keep_temp;
            config.matching.accept_low_confidence |= accept_low_confidence;
            config.validate()?;
            let config = Arc::new(config);

            let stages: Vec<Stage> = stages.into_iter().map(Stage::from).collect();
            if stages.contains(&Stage::Translate) {
                check_provider_availability(&config.translate.endpoint, &config.translate.model)
                    .await?;
            }

            let cancel = CancelHandle::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing the current episode before stopping...");
                    ctrl_c.cancel();
                }
            });

            let collaborators = Collaborators::from_config(&config)?;
            let orchestrator = Orchestrator::new(config.clone(), collaborators)
                .with_observer(Arc::new(TracingObserver))
                .with_observer(Arc::new(BarObserver::new()))
                .with_cancel_handle(cancel);

            let missing: Vec<_> = orchestrator
                .verify_tools(&stages)
                .await
                .into_iter()
                .filter_map(|(tool, result)| result.err().map(|e| format!("{}: {}", tool, e)))
                .collect();
            if !missing.is_empty() {
                return Err(anyhow::anyhow!("Required tools are missing:\n{}", missing.join("\n")));
            }

            let mut layout = SeasonLayout::new(&season_dir, &config.layout);
            if let Some(dir) = english_dir {
                layout = layout.with_english_dir(dir);
            }

            let summary = orchestrator.run_with_layout(layout, &stages).await?;
            println!("\n{}", summary.render_table());
            let elapsed = summary.elapsed().num_seconds().max(0) as u64;
            println!("Finished in {}", format_duration(elapsed));

            if summary.tally().failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Match { season_dir, subtitle_dir, accept_low_confidence } => {
            let subtitle_dir = match subtitle_dir {
                Some(dir) => dir,
                None => {
                    let folder = &config.layout.english_folder_name;
                    find_subfolder(&season_dir, folder).ok_or_else(|| {
                        SeasonSubError::FileNotFound(season_dir.join(folder).display().to_string())
                    })?
                }
            };

            let videos =
                scan_assets(&season_dir, AssetKind::Video, &config.layout.video_extensions)?;
            let subtitles = scan_assets(&subtitle_dir, AssetKind::Subtitle, &["srt".to_string()])?;
            let policy = MatchPolicy {
                accept_low_confidence: accept_low_confidence
                    || config.matching.accept_low_confidence,
            };
            let outcome = match_assets_with(&videos, &subtitles, policy);

            println!("\n{:<8} {:<50} {:<50}", "Episode", "Video", "Subtitle");
            println!("{}", "-".repeat(110));
            for m in &outcome.matches {
                println!(
                    "{:<8} {:<50} {:<50}",
                    m.key.to_string(),
                    m.video.file_name(),
                    m.subtitle.file_name()
                );
            }
            for error in outcome.unmatched_videos.iter().chain(&outcome.unmatched_subtitles) {
                println!("  unmatched: {}", error);
            }
            println!(
                "\n{} matched, {} videos and {} subtitles unmatched",
                outcome.matches.len(),
                outcome.unmatched_videos.len(),
                outcome.unmatched_subtitles.len()
            );
        }
        Commands::Translate { input, output } => {
            config.validate()?;
            check_provider_availability(&config.translate.endpoint, &config.translate.model).await?;

            let provider = ProviderFactory::create_provider(&config.translate)?;
            let translator = BatchTranslator::new(config.translate.clone(), provider);
            let document =
                read_document_with_fallback(&input, config.layout.english_encoding()?).await?;
            if document.is_empty() {
                return Err(SeasonSubError::EmptySubtitle(input).into());
            }
            let outcome = translator.translate(&document).await?;
            write_document(&outcome.document, &output, config.layout.write_bom).await?;

            println!(
                "Translated {} blocks in {} windows ({} left untranslated) -> {}",
                outcome.document.len(),
                outcome.report.windows,
                outcome.report.untranslated_blocks,
                output.display()
            );
        }
        Commands::Sync { video, subtitle, output } => {
            let synchronizer = MediaToolFactory::create_synchronizer(&config.tools);
            synchronizer.synchronize(&video, &subtitle, &output).await?;
            println!("Synchronized subtitle written to {}", output.display());
        }
        Commands::Rtl { subtitle } => {
            config.validate()?;
            let corrector = RtlCorrectorFactory::create_corrector(&config)?;
            if !corrector.apply(&subtitle).await {
                return Err(SeasonSubError::Automation(AutomationError { path: subtitle }).into());
            }
            println!("RTL fix complete: {}", subtitle.display());
        }
        Commands::Embed { video, subtitle, output } => {
            let multiplexer = MediaToolFactory::create_multiplexer(&config.tools);
            let track = SubtitleTrack {
                path: subtitle,
                language: config.embed.language.clone(),
                name: config.embed.track_name.clone(),
                default_track: config.embed.default_track,
            };
            multiplexer.multiplex(&video, &[track], &output).await?;
            println!("Embedded subtitle into {}", output.display());
        }
        Commands::CheckTools => {
            let synchronizer = MediaToolFactory::create_synchronizer(&config.tools);
            let multiplexer = MediaToolFactory::create_multiplexer(&config.tools);

            let provider =
                check_provider_availability(&config.translate.endpoint, &config.translate.model)
                    .await
                    .map(|_| config.translate.model.clone())
                    .map_err(|e| e.to_string());
            let sync = synchronizer.check_availability().await.map_err(|e| e.to_string());
            let mux = multiplexer.check_availability().await.map_err(|e| e.to_string());

            println!("\n{:<15} {:<10} {}", "Tool", "Status", "Details");
            println!("{}", "-".repeat(70));
            let results = [("provider", provider), ("synchronizer", sync), ("multiplexer", mux)];
            for (name, result) in results {
                match result {
                    Ok(details) => println!("{:<15} {:<10} {}", name, "OK", details),
                    Err(e) => println!("{:<15} {:<10} {}", name, "MISSING", e),
                }
            }
        }
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                return Err(anyhow::anyhow!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ));
            }
            Config::default().save_to_file(&path)?;
            println!("Default configuration written to {}", path.display());
        }
    }

    Ok(())
}

/// One progress bar per stage.
struct BarObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<Stage, ProgressBar>>,
}

impl BarObserver {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }
}

impl ProgressObserver for BarObserver {
    fn notify(&self, event: &ProgressEvent) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        match event {
            ProgressEvent::StageStarted { stage, total } => {
                let bar = self.multi.add(ProgressBar::new(*total as u64));
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{prefix:>10} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                {
                    bar.set_style(style.progress_chars("#>-"));
                }
                bar.set_prefix(stage.name());
                bars.insert(*stage, bar);
            }
            ProgressEvent::JobFinished { stage, key, status, completed, .. } => {
                if let Some(bar) = bars.get(stage) {
                    bar.set_position(*completed as u64);
                    bar.set_message(format!("{} {:?}", key, status));
                }
            }
            ProgressEvent::RunFinished { .. } => {
                for bar in bars.values() {
                    bar.finish();
                }
            }
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".seasonsub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "seasonsub.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("seasonsub.log").display()
    );

    Ok(())
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
