// Batch translation of subtitle documents
//
// - window: splits a document into request-sized windows with preceding context
// - retry: bounded backoff state machine behind a swappable clock
// - engine: drives a provider window by window and aligns the replies
// - ollama: HTTP provider talking to an Ollama server

pub mod engine;
pub mod ollama;
pub mod retry;
pub mod window;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use engine::{BatchTranslator, TranslationOutcome, TranslationReport};
pub use ollama::{check_provider_availability, OllamaProvider};
pub use retry::{RetryDecision, RetryPolicy, RetryState, Sleeper, TokioSleeper};
pub use window::{plan_windows, TranslationWindow};

use crate::config::TranslateConfig;
use crate::error::Result;

/// Joins the lines of a multi-line block inside a single request line.
pub const LINE_BREAK_MARKER: &str = "<br>";

/// Why a single provider call did not produce text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// Rate limited or out of quota; worth waiting for
    #[error("throttled: {0}")]
    Throttled(String),

    #[error("{0}")]
    Failed(String),
}

impl ProviderFailure {
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Throttled(m) | Self::Failed(m) => m,
        }
    }
}

/// One window worth of work handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub target_language: String,
    /// Preceding lines, for understanding only
    pub context: Vec<String>,
    /// Lines to translate, one per block
    pub lines: Vec<String>,
}

impl TranslationRequest {
    pub fn expected_lines(&self) -> usize {
        self.lines.len()
    }

    /// Plain-text prompt asking for exactly one translated line per input line.
    pub fn render_prompt(&self) -> String {
        let mut prompt = format!(
            "You are a professional subtitle translator. Translate the following subtitles into {}.\n\
             Use natural, conversational language and keep each line concise.\n\
             Keep the marker {} wherever it appears; it separates lines of the same subtitle.\n",
            self.target_language, LINE_BREAK_MARKER
        );

        if !self.context.is_empty() {
            prompt.push_str("\n### CONTEXT (previous subtitles - DO NOT translate, use for understanding only):\n");
            prompt.push_str(&self.context.join("\n"));
            prompt.push('\n');
        }

        prompt.push_str(&format!(
            "\n### TRANSLATE THESE LINES:\nReturn exactly {} lines, one translation per line, in the same order.\n\n{}\n\n### OUTPUT:\n{} translations only, one per line, same order as input:",
            self.expected_lines(),
            self.lines.join("\n"),
            self.target_language
        ));

        prompt
    }
}

/// A remote (or fake) translation backend. One call per window.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> std::result::Result<String, ProviderFailure>;
}

/// Factory for creating provider instances
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_provider(config: &TranslateConfig) -> Result<Arc<dyn TranslationProvider>> {
        Ok(Arc::new(OllamaProvider::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: &[&str], lines: &[&str]) -> TranslationRequest {
        TranslationRequest {
            target_language: "Hebrew".to_string(),
            context: context.iter().map(|s| s.to_string()).collect(),
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn prompt_carries_line_count_and_text() {
        let prompt = request(&[], &["Hello.", "Get me a chest x-ray."]).render_prompt();

        assert!(prompt.contains("into Hebrew"));
        assert!(prompt.contains("Return exactly 2 lines"));
        assert!(prompt.contains("Hello.\nGet me a chest x-ray."));
        assert!(!prompt.contains("CONTEXT"));
    }

    #[test]
    fn prompt_marks_context_as_untranslated() {
        let prompt = request(&["Earlier line."], &["Now."]).render_prompt();

        let context_at = prompt.find("DO NOT translate").unwrap();
        let earlier_at = prompt.find("Earlier line.").unwrap();
        let lines_at = prompt.find("TRANSLATE THESE LINES").unwrap();
        assert!(context_at < earlier_at && earlier_at < lines_at);
    }

    #[test]
    fn failure_classification() {
        assert!(ProviderFailure::Throttled("429".into()).is_throttled());
        assert!(!ProviderFailure::Failed("boom".into()).is_throttled());
        assert_eq!(ProviderFailure::Failed("boom".into()).message(), "boom");
    }
}
