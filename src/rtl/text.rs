use async_trait::async_trait;
use encoding_rs::Encoding;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::RtlCorrector;
use crate::subtitle::{read_document, read_document_with_fallback, write_document};

static HEBREW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{0590}-\x{05FF}]").expect("valid regex"));
static TRAILING_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?,;:\-"')\]}]+$"#).expect("valid regex"));
static LEADING_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[.!?,;:\-"'(\[{]+"#).expect("valid regex"));

/// RIGHT-TO-LEFT MARK
pub const RLM: char = '\u{200F}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtlStrategy {
    /// `שלום.` becomes `.שלום`, which most players then render correctly
    MovePunctuation,
    /// Prefix the line with U+200F and leave the text alone
    DirectionalMarks,
}

pub fn contains_rtl(line: &str) -> bool {
    HEBREW.is_match(line)
}

impl RtlStrategy {
    /// Correct one text line. Lines without RTL characters pass through, and
    /// applying the strategy twice changes nothing.
    pub fn fix_line(self, line: &str) -> String {
        if !contains_rtl(line) {
            return line.to_string();
        }

        match self {
            Self::MovePunctuation => {
                let stripped = line.trim();
                if LEADING_PUNCTUATION.is_match(stripped) {
                    return line.to_string();
                }
                let Some(found) = TRAILING_PUNCTUATION.find(stripped) else {
                    return line.to_string();
                };
                let indent = &line[..line.len() - line.trim_start().len()];
                format!("{}{}{}", indent, found.as_str(), &stripped[..found.start()])
            }
            Self::DirectionalMarks => {
                if line.starts_with(RLM) {
                    line.to_string()
                } else {
                    format!("{}{}", RLM, line)
                }
            }
        }
    }
}

/// Corrects the document through the subtitle codec, no external tools involved.
/// The corrected file is always written back as UTF-8.
pub struct TextRtlCorrector {
    strategy: RtlStrategy,
    write_bom: bool,
    fallback_encoding: Option<&'static Encoding>,
}

impl TextRtlCorrector {
    pub fn new(strategy: RtlStrategy, write_bom: bool) -> Self {
        Self {
            strategy,
            write_bom,
            fallback_encoding: None,
        }
    }

    /// Accept files in a legacy encoding such as windows-1255.
    pub fn with_fallback_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.fallback_encoding = Some(encoding);
        self
    }
}

#[async_trait]
impl RtlCorrector for TextRtlCorrector {
    async fn apply(&self, path: &Path) -> bool {
        info!("Fixing RTL in: {}", path.display());

        let read = match self.fallback_encoding {
            Some(encoding) => read_document_with_fallback(path, encoding).await,
            None => read_document(path).await,
        };
        let mut document = match read {
            Ok(document) => document,
            Err(e) => {
                warn!("Cannot read {} for RTL correction: {}", path.display(), e);
                return false;
            }
        };

        let mut changed = 0usize;
        document.map_text_lines(|line| {
            let fixed = self.strategy.fix_line(line);
            if fixed != line {
                changed += 1;
            }
            fixed
        });
        debug!("{} lines adjusted with {:?}", changed, self.strategy);

        match write_document(&document, path, self.write_bom).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot write RTL-corrected {}: {}", path.display(), e);
                false
            }
        }
    }
}
