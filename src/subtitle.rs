//! SubRip document model and codec.
//!
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:04,000
//! Hello, world!
//!
//! 2
//! 00:00:05,000 --> 00:00:08,000
//! This is a test.
//! ```
//!
//! Block position is authoritative; the index line is display-only and is
//! renumbered from 1 on every write.

use encoding_rs::Encoding;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ParseError, ParseErrorKind, Result};

const UTF8_BOM: &str = "\u{feff}";
const TIME_RANGE_ARROW: &str = " --> ";

/// Non-negative point in time with millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timecode(u64);

impl Timecode {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn from_parts(hours: u64, minutes: u64, seconds: u64, millis: u64) -> Self {
        Self(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// `from_parts` that returns `None` instead of overflowing.
    fn checked_from_parts(hours: u64, minutes: u64, seconds: u64, millis: u64) -> Option<Self> {
        hours
            .checked_mul(3_600_000)?
            .checked_add(minutes * 60_000 + seconds * 1_000 + millis)
            .map(Self)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Parse `H:MM:SS,mmm` (one or more hour digits).
    pub fn parse(s: &str) -> Option<Self> {
        let (clock, millis) = s.split_once(',')?;
        let mut parts = clock.split(':');
        let hours = parts.next()?;
        let minutes = parts.next()?;
        let seconds = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        if hours.is_empty() || minutes.len() != 2 || seconds.len() != 2 || millis.len() != 3 {
            return None;
        }
        if ![hours, minutes, seconds, millis]
            .iter()
            .all(|p| p.bytes().all(|b| b.is_ascii_digit()))
        {
            return None;
        }
        let minutes: u64 = minutes.parse().ok()?;
        let seconds: u64 = seconds.parse().ok()?;
        if minutes >= 60 || seconds >= 60 {
            return None;
        }
        Self::checked_from_parts(hours.parse().ok()?, minutes, seconds, millis.parse().ok()?)
    }
}

impl fmt::Display for Timecode {
    /// SRT time format (HH:MM:SS,mmm)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3_600_000;
        let minutes = (self.0 % 3_600_000) / 60_000;
        let secs = (self.0 % 60_000) / 1_000;
        let millis = self.0 % 1_000;
        write!(f, "{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleBlock {
    /// Display index as read from disk
    pub index: u32,
    pub start: Timecode,
    pub end: Timecode,
    pub text: Vec<String>,
}

impl SubtitleBlock {
    /// Whitespace-only lines become empty and trailing empty lines are dropped, since
    /// the on-disk format cannot tell them apart from the block separator.
    pub fn new(index: u32, start: Timecode, end: Timecode, text: Vec<String>) -> Self {
        let mut text: Vec<String> = text
            .into_iter()
            .map(|line| if line.trim().is_empty() { String::new() } else { line })
            .collect();
        while text.last().is_some_and(|line| line.is_empty()) {
            text.pop();
        }
        Self { index, start, end, text }
    }

    /// Same timing and text, ignoring the display index.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end && self.text == other.text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleDocument {
    blocks: Vec<SubtitleBlock>,
}

impl SubtitleDocument {
    pub fn new(blocks: Vec<SubtitleBlock>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[SubtitleBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [SubtitleBlock] {
        &mut self.blocks
    }

    pub fn into_blocks(self) -> Vec<SubtitleBlock> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn content_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.blocks.iter().zip(&other.blocks).all(|(a, b)| a.content_eq(b))
    }

    /// Text of each block, lines joined with `\n`.
    pub fn texts(&self) -> Vec<String> {
        self.blocks.iter().map(|b| b.text.join("\n")).collect()
    }

    /// Apply `f` to every text line, keeping timing and block order.
    pub fn map_text_lines<F: FnMut(&str) -> String>(&mut self, mut f: F) {
        for block in &mut self.blocks {
            for line in &mut block.text {
                *line = f(line);
            }
        }
    }

    /// Parse SRT text. Any error aborts the whole document.
    pub fn parse(content: &str) -> std::result::Result<Self, ParseError> {
        Parser::new(content).parse()
    }

    /// Serialize to SRT, renumbering blocks from 1.
    pub fn to_srt_string(&self) -> String {
        let mut srt_content = String::new();

        for (index, block) in self.blocks.iter().enumerate() {
            srt_content.push_str(&format!("{}\n{} --> {}\n", index + 1, block.start, block.end));
            for line in &block.text {
                srt_content.push_str(line);
                srt_content.push('\n');
            }
            srt_content.push('\n');
        }

        srt_content
    }
}

fn is_index_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

fn parse_time_range(line: &str) -> Option<(Timecode, Timecode)> {
    let (start, end) = line.trim().split_once(TIME_RANGE_ARROW)?;
    Some((Timecode::parse(start)?, Timecode::parse(end)?))
}

struct Parser {
    /// (byte offset, line) pairs of the normalized text
    lines: Vec<(usize, String)>,
    pos: usize,
}

impl Parser {
    fn new(content: &str) -> Self {
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
        let normalized = content.replace("\r\n", "\n").replace('\r', "\n");

        let mut lines = Vec::new();
        let mut offset = 0;
        for line in normalized.split('\n') {
            lines.push((offset, line.to_string()));
            offset += line.len() + 1;
        }
        // A trailing newline leaves one empty piece behind
        if normalized.ends_with('\n') {
            lines.pop();
        }

        Self { lines, pos: 0 }
    }

    fn is_blank(&self, pos: usize) -> bool {
        self.lines[pos].1.trim().is_empty()
    }

    fn error(
        &self,
        kind: ParseErrorKind,
        block: usize,
        pos: usize,
        detail: impl Into<String>,
    ) -> ParseError {
        let offset = self
            .lines
            .get(pos)
            .map(|(offset, _)| *offset)
            .unwrap_or_else(|| self.lines.last().map(|(o, l)| o + l.len()).unwrap_or(0));
        ParseError {
            kind,
            block,
            offset,
            line: pos + 1,
            detail: detail.into(),
        }
    }

    fn starts_block(&self, pos: usize) -> bool {
        is_index_line(&self.lines[pos].1)
            && self
                .lines
                .get(pos + 1)
                .is_some_and(|(_, timing)| timing.contains(TIME_RANGE_ARROW))
    }

    fn skip_blank_run(&self, from: usize) -> usize {
        let mut pos = from;
        while pos < self.lines.len() && self.is_blank(pos) {
            pos += 1;
        }
        pos
    }

    fn parse(mut self) -> std::result::Result<SubtitleDocument, ParseError> {
        let mut blocks = Vec::new();
        self.pos = self.skip_blank_run(0);

        while self.pos < self.lines.len() {
            let ordinal = blocks.len() + 1;
            blocks.push(self.parse_block(ordinal)?);
        }

        debug!("Parsed {} subtitle blocks", blocks.len());
        Ok(SubtitleDocument::new(blocks))
    }

    fn parse_block(&mut self, ordinal: usize) -> std::result::Result<SubtitleBlock, ParseError> {
        let index_line = self.lines[self.pos].1.trim();
        if !is_index_line(index_line) {
            return Err(self.error(
                ParseErrorKind::MissingIndex,
                ordinal,
                self.pos,
                format!("expected an index line, found {:?}", index_line),
            ));
        }
        let index = index_line.parse().map_err(|_| {
            self.error(ParseErrorKind::MissingIndex, ordinal, self.pos, "index out of range")
        })?;
        self.pos += 1;

        if self.pos >= self.lines.len() {
            return Err(self.error(
                ParseErrorKind::UnexpectedEof,
                ordinal,
                self.pos,
                "missing time range",
            ));
        }
        let timing = self.lines[self.pos].1.as_str();
        let (start, end) = parse_time_range(timing).ok_or_else(|| {
            self.error(
                ParseErrorKind::MalformedTimeRange,
                ordinal,
                self.pos,
                format!("malformed time range {:?}", timing),
            )
        })?;
        if end < start {
            return Err(self.error(
                ParseErrorKind::InvertedTimeRange,
                ordinal,
                self.pos,
                format!("{} ends before it starts", timing.trim()),
            ));
        }
        self.pos += 1;

        let mut text = Vec::new();
        while self.pos < self.lines.len() {
            if !self.is_blank(self.pos) {
                text.push(self.lines[self.pos].1.clone());
                self.pos += 1;
                continue;
            }
            // A blank run ends the block only at EOF or before an index line that
            // is followed by a time range arrow; other digit lines stay text
            let after = self.skip_blank_run(self.pos);
            if after == self.lines.len() || self.starts_block(after) {
                self.pos = after;
                break;
            }
            text.extend(std::iter::repeat_n(String::new(), after - self.pos));
            self.pos = after;
        }

        Ok(SubtitleBlock::new(index, start, end, text))
    }
}

/// Read and parse an SRT file (UTF-8, optional BOM).
pub async fn read_document<P: AsRef<Path>>(path: P) -> Result<SubtitleDocument> {
    read_document_with(path.as_ref(), None).await
}

/// Read and parse an SRT file, decoding it with `fallback` when it is not UTF-8.
pub async fn read_document_with_fallback<P: AsRef<Path>>(
    path: P,
    fallback: &'static Encoding,
) -> Result<SubtitleDocument> {
    read_document_with(path.as_ref(), Some(fallback)).await
}

async fn read_document_with(
    path: &Path,
    fallback: Option<&'static Encoding>,
) -> Result<SubtitleDocument> {
    let bytes = fs::read(path).await?;
    let content = decode_subtitle(&bytes, fallback).map_err(|mut e| {
        e.detail = format!("{}: {}", path.display(), e.detail);
        e
    })?;
    Ok(SubtitleDocument::parse(&content)?)
}

/// Decode raw subtitle bytes.
///
/// A byte order mark decides the encoding when present. Otherwise the bytes must
/// be UTF-8, or decode cleanly with `fallback`.
pub fn decode_subtitle(
    bytes: &[u8],
    fallback: Option<&'static Encoding>,
) -> std::result::Result<String, ParseError> {
    let encoding_error = |offset: usize, detail: String| ParseError {
        kind: ParseErrorKind::Encoding,
        block: 0,
        offset,
        line: 0,
        detail,
    };

    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        return encoding
            .decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
            .map(|text| text.into_owned())
            .ok_or_else(|| {
                let detail = format!("invalid {} after byte order mark", encoding.name());
                encoding_error(bom_length, detail)
            });
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(utf8_error) => {
            let offset = utf8_error.valid_up_to();
            let Some(encoding) = fallback else {
                return Err(encoding_error(offset, "not valid UTF-8".to_string()));
            };
            let text = encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| {
                    encoding_error(offset, format!("neither UTF-8 nor {}", encoding.name()))
                })?;
            debug!("Decoded subtitle as {}", encoding.name());
            Ok(text.into_owned())
        }
    }
}

/// Write a document as SRT, creating parent directories as needed.
pub async fn write_document<P: AsRef<Path>>(
    document: &SubtitleDocument,
    output_path: P,
    with_bom: bool,
) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Writing SRT file: {}", output_path.display());

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut srt_content = String::new();
    if with_bom {
        srt_content.push_str(UTF8_BOM);
    }
    srt_content.push_str(&document.to_srt_string());

    fs::write(output_path, srt_content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: u64, end: u64, lines: &[&str]) -> SubtitleBlock {
        SubtitleBlock::new(
            0,
            Timecode::from_millis(start),
            Timecode::from_millis(end),
            lines.iter().map(|l| l.to_string()).collect(),
        )
    }

    #[test]
    fn test_format_srt_time() {
        assert_eq!(Timecode::from_millis(0).to_string(), "00:00:00,000");
        assert_eq!(Timecode::from_millis(65_123).to_string(), "00:01:05,123");
        assert_eq!(Timecode::from_millis(3_661_500).to_string(), "01:01:01,500");
    }

    #[test]
    fn texts_join_block_lines() {
        let doc = SubtitleDocument::new(vec![
            block(0, 1_000, &["Hello,", "Carter."]),
            block(1_000, 2_000, &[]),
        ]);
        assert_eq!(doc.texts(), vec!["Hello,\nCarter.".to_string(), String::new()]);
    }

    #[test]
    fn test_parse_timecode() {
        assert_eq!(Timecode::parse("0:00:01,250"), Some(Timecode::from_millis(1_250)));
        assert_eq!(Timecode::parse("01:02:03,004"), Some(Timecode::from_parts(1, 2, 3, 4)));
        assert_eq!(Timecode::parse("00:00:01.250"), None);
        assert_eq!(Timecode::parse("00:61:00,000"), None);
        assert_eq!(Timecode::parse("00:1:00,000"), None);
    }

    #[test]
    fn test_parse_basic_document() {
        let srt = "1\n00:00:01,000 --> 00:00:04,000\nHello, world!\n\n\
                   2\n00:00:05,000 --> 00:00:08,000\nTwo\nlines\n";

        let doc = SubtitleDocument::parse(srt).unwrap();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.blocks()[0].text, vec!["Hello, world!"]);
        assert_eq!(doc.blocks()[1].start, Timecode::from_millis(5_000));
        assert_eq!(doc.blocks()[1].text, vec!["Two", "lines"]);
    }

    #[test]
    fn test_parse_tolerates_bom_crlf_and_stray_blank_lines() {
        let srt = "\u{feff}7\r\n00:00:01,000 --> 00:00:02,000\r\nfirst\r\n\r\nstill first\r\n\r\n\r\n\
                   8\r\n00:00:03,000 --> 00:00:04,000\r\nsecond";

        let doc = SubtitleDocument::parse(srt).unwrap();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.blocks()[0].index, 7);
        assert_eq!(doc.blocks()[0].text, vec!["first", "", "still first"]);
        assert_eq!(doc.blocks()[1].text, vec!["second"]);
    }

    #[test]
    fn test_malformed_time_range_fails_whole_document() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nok\n\n2\n00:00:03 --> 00:00:04,000\nbad\n";

        let err = SubtitleDocument::parse(srt).unwrap_err();

        assert_eq!(err.kind, ParseErrorKind::MalformedTimeRange);
        assert_eq!(err.block, 2);
        assert_eq!(err.line, 6);
        assert_eq!(err.offset, srt.find("00:00:03 -->").unwrap());
    }

    #[test]
    fn test_inverted_range_and_missing_index_are_rejected() {
        let inverted = "1\n00:00:05,000 --> 00:00:04,000\ntext\n";
        assert_eq!(
            SubtitleDocument::parse(inverted).unwrap_err().kind,
            ParseErrorKind::InvertedTimeRange
        );

        let no_index = "Hello\n00:00:01,000 --> 00:00:02,000\n";
        assert_eq!(
            SubtitleDocument::parse(no_index).unwrap_err().kind,
            ParseErrorKind::MissingIndex
        );

        let truncated = "1\n";
        assert_eq!(
            SubtitleDocument::parse(truncated).unwrap_err().kind,
            ParseErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_number_after_blank_line_stays_text() {
        let doc = SubtitleDocument::new(vec![
            block(1_000, 2_000, &["How many?", "", "42"]),
            block(3_000, 4_000, &["Forty-two."]),
        ]);

        let reparsed = SubtitleDocument::parse(&doc.to_srt_string()).unwrap();

        assert!(reparsed.content_eq(&doc));
        assert_eq!(reparsed.blocks()[0].text, vec!["How many?", "", "42"]);
    }

    #[test]
    fn test_oversized_hours_are_rejected_not_wrapped() {
        assert_eq!(Timecode::parse("99999999999999999:00:00,000"), None);
        assert_eq!(
            Timecode::parse("5124095576:00:00,000"),
            Some(Timecode::from_parts(5_124_095_576, 0, 0, 0))
        );

        let srt = "1\n99999999999999999:00:00,000 --> 99999999999999999:00:01,000\nlong\n";
        assert_eq!(
            SubtitleDocument::parse(srt).unwrap_err().kind,
            ParseErrorKind::MalformedTimeRange
        );
    }

    #[test]
    fn test_serialize_renumbers_from_one() {
        let mut first = block(1_000, 2_000, &["a"]);
        first.index = 40;
        let doc = SubtitleDocument::new(vec![first, block(3_000, 4_500, &["b", "c"])]);

        assert_eq!(
            doc.to_srt_string(),
            "1\n00:00:01,000 --> 00:00:02,000\na\n\n2\n00:00:03,000 --> 00:00:04,500\nb\nc\n\n"
        );
    }

    #[test]
    fn test_round_trip_preserves_timing_and_text() {
        let doc = SubtitleDocument::new(vec![
            block(0, 0, &["zero length"]),
            block(1_000, 2_000, &["", "leading blank", "", "inner blank"]),
            block(2_000, 3_000, &[]),
            block(36_000_000 * 3, 36_000_000 * 3 + 1, &["שלום, עולם!", "  indented"]),
        ]);

        let reparsed = SubtitleDocument::parse(&doc.to_srt_string()).unwrap();

        assert!(reparsed.content_eq(&doc));
    }

    #[test]
    fn test_block_normalizes_trailing_blank_lines() {
        let b = block(0, 1, &["text", "   ", ""]);
        assert_eq!(b.text, vec!["text"]);
    }

    #[tokio::test]
    async fn test_file_round_trip_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.srt");
        let doc = SubtitleDocument::new(vec![block(500, 1_500, &["שלום"])]);

        write_document(&doc, &path, true).await.unwrap();
        let raw = std::fs::read(&path).unwrap();
        assert!(raw.starts_with(&[0xEF, 0xBB, 0xBF]));

        let loaded = read_document(&path).await.unwrap();
        assert!(loaded.content_eq(&doc));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.srt");
        std::fs::write(&path, b"1\n00:00:01,000 --> 00:00:02,000\ncaf\xe9\n").unwrap();

        let err = read_document(&path).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::SeasonSubError::Parse(ParseError { kind: ParseErrorKind::Encoding, .. })
        ));

        let doc = read_document_with_fallback(&path, encoding_rs::WINDOWS_1252).await.unwrap();
        assert_eq!(doc.blocks()[0].text, vec!["café"]);
    }

    #[tokio::test]
    async fn test_legacy_hebrew_file_decodes_with_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp1255.srt");
        // "שלום" in windows-1255
        let srt = b"1\r\n00:00:01,000 --> 00:00:02,000\r\n\xf9\xec\xe5\xed.\r\n";
        std::fs::write(&path, srt).unwrap();

        let doc = read_document_with_fallback(&path, encoding_rs::WINDOWS_1255).await.unwrap();

        assert_eq!(doc.blocks()[0].text, vec!["שלום."]);
    }

    #[test]
    fn test_byte_order_mark_selects_encoding() {
        let mut utf16 = vec![0xff, 0xfe];
        for unit in "1\n00:00:01,000 --> 00:00:02,000\nHi\n".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }

        let text = decode_subtitle(&utf16, None).unwrap();

        assert!(text.starts_with("1\n00:00:01,000"));
        assert_eq!(SubtitleDocument::parse(&text).unwrap().blocks()[0].text, vec!["Hi"]);
    }
}
