use std::sync::Arc;
use tracing::{debug, info, warn};

use super::retry::{RetryDecision, RetryPolicy, RetryState, Sleeper, TokioSleeper};
use super::window::{plan_windows, TranslationWindow};
use super::{ProviderFailure, TranslationProvider, TranslationRequest, LINE_BREAK_MARKER};
use crate::config::TranslateConfig;
use crate::error::ProviderError;
use crate::subtitle::{SubtitleBlock, SubtitleDocument};

/// What happened while translating one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationReport {
    pub windows: usize,
    /// Windows whose reply had fewer lines than requested
    pub partial_windows: usize,
    /// Blocks left in the source language
    pub untranslated_blocks: usize,
}

impl TranslationReport {
    pub fn is_complete(&self) -> bool {
        self.partial_windows == 0
    }
}

#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub document: SubtitleDocument,
    pub report: TranslationReport,
}

/// Translates documents window by window through a [`TranslationProvider`].
pub struct BatchTranslator {
    config: TranslateConfig,
    provider: Arc<dyn TranslationProvider>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl BatchTranslator {
    pub fn new(config: TranslateConfig, provider: Arc<dyn TranslationProvider>) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            config,
            provider,
            sleeper: Arc::new(TokioSleeper),
            policy,
        }
    }

    /// Replace the clock used for backoff and inter-batch pauses.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Produce a translated copy of `document`. Timing, block count and order are
    /// preserved; only text changes.
    pub async fn translate(
        &self,
        document: &SubtitleDocument,
    ) -> Result<TranslationOutcome, ProviderError> {
        let source = document.blocks();
        let windows = plan_windows(source.len(), self.config.window_size, self.config.context_size);
        let mut translated: Vec<SubtitleBlock> = source.to_vec();
        let mut report = TranslationReport {
            windows: windows.len(),
            ..Default::default()
        };
        let mut called_before = false;

        info!(
            "Translating {} blocks in {} windows into {}",
            source.len(),
            windows.len(),
            self.config.target_language
        );

        for window in &windows {
            // Blocks without text are kept as-is and never sent
            let slots: Vec<usize> = window
                .range
                .clone()
                .filter(|&i| !source[i].text.is_empty())
                .collect();
            if slots.is_empty() {
                debug!("Window {} has no text, skipping", window.ordinal + 1);
                continue;
            }

            let request = TranslationRequest {
                target_language: self.config.target_language.clone(),
                context: window
                    .context
                    .clone()
                    .filter(|&i| !source[i].text.is_empty())
                    .map(|i| flatten(&source[i]))
                    .collect(),
                lines: slots.iter().map(|&i| flatten(&source[i])).collect(),
            };

            if called_before {
                self.sleeper.sleep(self.config.inter_batch_delay()).await;
            }
            called_before = true;

            info!(
                "┌─ Translating window {}/{} (blocks {}-{}, {} context)",
                window.ordinal + 1,
                windows.len(),
                window.range.start + 1,
                window.range.end,
                request.context.len()
            );

            let reply = self.request_with_retry(window, &request).await?;
            let lines = reply_lines(&reply);

            if lines.len() < slots.len() {
                let missing = slots.len() - lines.len();
                warn!(
                    "│ Partial translation: got {} of {} lines, {} blocks keep their original text",
                    lines.len(),
                    slots.len(),
                    missing
                );
                report.partial_windows += 1;
                report.untranslated_blocks += missing;
            } else if lines.len() > slots.len() {
                debug!("│ Discarding {} extra lines", lines.len() - slots.len());
            }

            for (&slot, line) in slots.iter().zip(&lines) {
                let block = &source[slot];
                translated[slot] =
                    SubtitleBlock::new(block.index, block.start, block.end, unflatten(line));
            }

            info!("└─ Window {}/{} done", window.ordinal + 1, windows.len());
        }

        Ok(TranslationOutcome {
            document: SubtitleDocument::new(translated),
            report,
        })
    }

    async fn request_with_retry(
        &self,
        window: &TranslationWindow,
        request: &TranslationRequest,
    ) -> Result<String, ProviderError> {
        let mut state = RetryState::new(self.policy);

        loop {
            let failure = match self.provider.translate(request).await {
                Ok(reply) => return Ok(reply),
                Err(failure) => failure,
            };

            match state.record_failure() {
                RetryDecision::RetryAfter(wait) => {
                    match &failure {
                        ProviderFailure::Throttled(_) => warn!(
                            "│ Rate limited. Waiting {:.0}s before retry ({}/{})",
                            wait.as_secs_f64(),
                            state.attempts(),
                            self.policy.max_retries
                        ),
                        ProviderFailure::Failed(message) => warn!(
                            "│ Request failed: {}. Waiting {:.0}s before retry ({}/{})",
                            message,
                            wait.as_secs_f64(),
                            state.attempts(),
                            self.policy.max_retries
                        ),
                    }
                    self.sleeper.sleep(wait).await;
                }
                RetryDecision::GiveUp => {
                    return Err(ProviderError {
                        window: window.ordinal + 1,
                        attempts: state.attempts(),
                        message: failure.to_string(),
                    });
                }
            }
        }
    }
}

fn flatten(block: &SubtitleBlock) -> String {
    block.text.join(LINE_BREAK_MARKER)
}

fn unflatten(line: &str) -> Vec<String> {
    line.split(LINE_BREAK_MARKER).map(|part| part.trim().to_string()).collect()
}

/// Non-empty, trimmed reply lines in order.
fn reply_lines(reply: &str) -> Vec<&str> {
    reply.lines().map(str::trim).filter(|line| !line.is_empty()).collect()
}
