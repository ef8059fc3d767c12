//! Episode identification and pairing of video files with subtitle files.
//!
//! Filenames are reduced to an [`EpisodeKey`] by an ordered list of rules where
//! the first rule that matches wins. The two asset sets are then joined on that key.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{MatchError, Result, SeasonSubError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeKey {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    High,
}

/// Result of running the rule list over one filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identification {
    pub key: EpisodeKey,
    pub confidence: Confidence,
    /// Name of the rule that produced the key
    pub rule: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Video,
    Subtitle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: AssetKind,
    pub identity: Option<Identification>,
}

impl MediaAsset {
    pub fn new(path: impl Into<PathBuf>, kind: AssetKind) -> Self {
        let path = path.into();
        let identity = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(identify);
        Self { path, kind, identity }
    }

    pub fn key(&self) -> Option<EpisodeKey> {
        self.identity.map(|id| id.key)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

// S06E01, s6.e1, S06 E01
static EXPLICIT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])s(\d{1,2})[ ._-]?e(\d{1,2})(?:[^0-9]|$)").expect("valid regex")
});

// 6x01
static SEPARATOR_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])(\d{1,2})x(\d{1,2})(?:[^0-9]|$)").expect("valid regex")
});

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

type Rule = fn(&str) -> Option<EpisodeKey>;

const RULES: [(&str, Confidence, Rule); 3] = [
    ("explicit-marker", Confidence::High, explicit_marker),
    ("separator-marker", Confidence::High, separator_marker),
    ("concatenated-digits", Confidence::Low, concatenated_digits),
];

/// Extract an episode key from a filename. Rules are tried in priority order and the
/// first hit is returned; `None` means the name carries no recognizable marker.
pub fn identify(filename: &str) -> Option<Identification> {
    RULES.iter().find_map(|(rule, confidence, extract)| {
        extract(filename).map(|key| Identification {
            key,
            confidence: *confidence,
            rule: *rule,
        })
    })
}

fn two_groups(re: &Regex, filename: &str) -> Option<EpisodeKey> {
    let caps = re.captures(filename)?;
    let season = caps.get(1)?.as_str().parse().ok()?;
    let episode = caps.get(2)?.as_str().parse().ok()?;
    Some(EpisodeKey::new(season, episode))
}

fn explicit_marker(filename: &str) -> Option<EpisodeKey> {
    two_groups(&EXPLICIT_MARKER, filename)
}

fn separator_marker(filename: &str) -> Option<EpisodeKey> {
    two_groups(&SEPARATOR_MARKER, filename)
}

/// `601` is read as season 6 episode 01, `1203` as season 12 episode 03. Digit runs
/// glued to letters (`x264`, `720p`) and four-digit years are skipped.
fn concatenated_digits(filename: &str) -> Option<EpisodeKey> {
    for run in DIGIT_RUN.find_iter(filename) {
        let digits = run.as_str();
        if !(3..=4).contains(&digits.len()) {
            continue;
        }
        let before = filename[..run.start()].chars().next_back();
        let after = filename[run.end()..].chars().next();
        if before.is_some_and(|c| c.is_alphanumeric())
            || after.is_some_and(|c| c.is_alphanumeric())
        {
            continue;
        }
        if digits.len() == 4 && (digits.starts_with("19") || digits.starts_with("20")) {
            continue;
        }
        let (season, episode) = digits.split_at(digits.len() - 2);
        let (Ok(season), Ok(episode)) = (season.parse::<u32>(), episode.parse::<u32>()) else {
            continue;
        };
        if season == 0 {
            continue;
        }
        return Some(EpisodeKey::new(season, episode));
    }
    None
}

/// How strictly identifications are trusted when joining.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPolicy {
    pub accept_low_confidence: bool,
}

#[derive(Debug, Clone)]
pub struct EpisodeMatch {
    pub key: EpisodeKey,
    pub video: MediaAsset,
    pub subtitle: MediaAsset,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Sorted by key ascending
    pub matches: Vec<EpisodeMatch>,
    pub unmatched_videos: Vec<MatchError>,
    pub unmatched_subtitles: Vec<MatchError>,
}

impl MatchOutcome {
    pub fn is_fully_aligned(&self) -> bool {
        self.unmatched_videos.is_empty() && self.unmatched_subtitles.is_empty()
    }

    pub fn log_report(&self) {
        info!("Matched {} episodes", self.matches.len());
        for m in &self.matches {
            debug!("Matched: {} -> {} <-> {}", m.key, m.video.file_name(), m.subtitle.file_name());
        }
        for error in self.unmatched_videos.iter().chain(&self.unmatched_subtitles) {
            warn!("Unmatched: {}", error);
        }
    }
}

/// Pair videos with subtitles using the default (strict) policy.
pub fn match_assets(videos: &[MediaAsset], subtitles: &[MediaAsset]) -> MatchOutcome {
    match_assets_with(videos, subtitles, MatchPolicy::default())
}

pub fn match_assets_with(
    videos: &[MediaAsset],
    subtitles: &[MediaAsset],
    policy: MatchPolicy,
) -> MatchOutcome {
    let (mut video_keys, mut unmatched_videos) = group_by_key(videos, policy);
    let (mut subtitle_keys, mut unmatched_subtitles) = group_by_key(subtitles, policy);

    let mut matches = Vec::new();
    while let Some((key, video)) = video_keys.pop_first() {
        match subtitle_keys.remove(&key) {
            Some(subtitle) => matches.push(EpisodeMatch { key, video, subtitle }),
            None => unmatched_videos.push(MatchError::NoCounterpart { path: video.path, key }),
        }
    }
    unmatched_subtitles.extend(
        subtitle_keys
            .into_iter()
            .map(|(key, subtitle)| MatchError::NoCounterpart { path: subtitle.path, key }),
    );

    MatchOutcome {
        matches,
        unmatched_videos,
        unmatched_subtitles,
    }
}

fn group_by_key(
    assets: &[MediaAsset],
    policy: MatchPolicy,
) -> (BTreeMap<EpisodeKey, MediaAsset>, Vec<MatchError>) {
    let mut by_key: BTreeMap<EpisodeKey, MediaAsset> = BTreeMap::new();
    let mut rejected = Vec::new();

    for asset in assets {
        let Some(identity) = asset.identity else {
            rejected.push(MatchError::Unidentified { path: asset.path.clone() });
            continue;
        };
        if identity.confidence == Confidence::Low && !policy.accept_low_confidence {
            rejected.push(MatchError::LowConfidence {
                path: asset.path.clone(),
                key: identity.key,
            });
            continue;
        }
        if let Some(kept) = by_key.get(&identity.key) {
            rejected.push(MatchError::DuplicateKey {
                path: asset.path.clone(),
                key: identity.key,
                kept: kept.path.clone(),
            });
            continue;
        }
        by_key.insert(identity.key, asset.clone());
    }

    (by_key, rejected)
}

/// List the files directly inside `dir` whose extension is one of `extensions`,
/// sorted by path.
pub fn scan_assets(dir: &Path, kind: AssetKind, extensions: &[String]) -> Result<Vec<MediaAsset>> {
    if !dir.is_dir() {
        return Err(SeasonSubError::FileNotFound(dir.display().to_string()));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| SeasonSubError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            if extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)) {
                paths.push(entry.path().to_path_buf());
            }
        }
    }
    paths.sort();

    Ok(paths.into_iter().map(|p| MediaAsset::new(p, kind)).collect())
}

/// Find `name` inside `parent`, falling back to a case-insensitive lookup.
pub fn find_subfolder(parent: &Path, name: &str) -> Option<PathBuf> {
    let exact = parent.join(name);
    if exact.is_dir() {
        return Some(exact);
    }
    WalkDir::new(parent)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().is_dir() && e.file_name().to_string_lossy().eq_ignore_ascii_case(name)
        })
        .map(|e| e.path().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(name: &str) -> MediaAsset {
        MediaAsset::new(format!("/season/{}", name), AssetKind::Video)
    }

    fn subtitle(name: &str) -> MediaAsset {
        MediaAsset::new(format!("/season/subs/{}", name), AssetKind::Subtitle)
    }

    #[test]
    fn test_identify_common_conventions() {
        let mkv = identify("ER.1994.S06E01.720p.WEB-DL.x264.mkv").unwrap();
        assert_eq!(mkv.key, EpisodeKey::new(6, 1));
        assert_eq!(mkv.confidence, Confidence::High);
        assert_eq!(mkv.rule, "explicit-marker");

        let srt = identify("ER - 6x01 - Leave It to Weaver.srt").unwrap();
        assert_eq!(srt.key, EpisodeKey::new(6, 1));
        assert_eq!(srt.rule, "separator-marker");

        assert_eq!(identify("show.s6.e12.srt").unwrap().key, EpisodeKey::new(6, 12));
    }

    #[test]
    fn test_first_rule_wins() {
        // Both an explicit marker and a separator marker are present
        let id = identify("Show 2x05 S03E04.srt").unwrap();
        assert_eq!(id.key, EpisodeKey::new(3, 4));
    }

    #[test]
    fn test_concatenated_digits_is_low_confidence() {
        let id = identify("ER 601 Leave It to Weaver.srt").unwrap();
        assert_eq!(id.key, EpisodeKey::new(6, 1));
        assert_eq!(id.confidence, Confidence::Low);

        assert_eq!(identify("Show 1203.srt").unwrap().key, EpisodeKey::new(12, 3));
    }

    #[test]
    fn test_concatenated_digits_skips_years_and_codecs() {
        assert!(identify("Documentary 1994 720p x264.mkv").is_none());
        assert!(identify("no markers here.srt").is_none());
    }

    #[test]
    fn test_match_assets_pairs_aligned_sets() {
        let videos = vec![video("ER.1994.S06E02.720p.mkv"), video("ER.1994.S06E01.720p.mkv")];
        let subs = vec![
            subtitle("ER - 6x01 - Leave It to Weaver.srt"),
            subtitle("ER - 6x02 - Last Rites.srt"),
        ];

        let outcome = match_assets(&videos, &subs);

        assert!(outcome.is_fully_aligned());
        let keys: Vec<_> = outcome.matches.iter().map(|m| m.key).collect();
        assert_eq!(keys, vec![EpisodeKey::new(6, 1), EpisodeKey::new(6, 2)]);
        assert_eq!(outcome.matches[0].video.file_name(), "ER.1994.S06E01.720p.mkv");
    }

    #[test]
    fn test_duplicate_key_first_seen_wins() {
        let videos = vec![video("Show.S01E01.mkv")];
        let subs = vec![subtitle("Show 1x01 a.srt"), subtitle("Show 1x01 b.srt")];

        let outcome = match_assets(&videos, &subs);

        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.matches[0].subtitle.path.ends_with("Show 1x01 a.srt"));
        assert_eq!(outcome.unmatched_subtitles.len(), 1);
        assert!(matches!(
            &outcome.unmatched_subtitles[0],
            MatchError::DuplicateKey { kept, .. } if kept.ends_with("Show 1x01 a.srt")
        ));
    }

    #[test]
    fn test_unmatched_and_unidentified_are_reported() {
        let videos = vec![video("Show.S01E01.mkv"), video("Show.S01E02.mkv"), video("extras.mkv")];
        let subs = vec![subtitle("Show 1x01.srt"), subtitle("Show 1x09.srt")];

        let outcome = match_assets(&videos, &subs);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.unmatched_videos.len(), 2);
        assert!(outcome
            .unmatched_videos
            .iter()
            .any(|e| matches!(e, MatchError::Unidentified { .. })));
        assert!(matches!(
            outcome.unmatched_subtitles[0],
            MatchError::NoCounterpart { key, .. } if key == EpisodeKey::new(1, 9)
        ));
    }

    #[test]
    fn test_low_confidence_needs_opt_in() {
        let videos = vec![video("ER.S06E01.mkv")];
        let subs = vec![subtitle("ER 601.srt")];

        let strict = match_assets(&videos, &subs);
        assert!(strict.matches.is_empty());
        assert!(matches!(strict.unmatched_subtitles[0], MatchError::LowConfidence { .. }));

        let policy = MatchPolicy { accept_low_confidence: true };
        let lenient = match_assets_with(&videos, &subs, policy);
        assert_eq!(lenient.matches.len(), 1);
    }

    #[test]
    fn test_scan_assets_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Show.S01E02.MKV"), b"").unwrap();
        std::fs::write(dir.path().join("Show.S01E01.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("Subtitle_HEBREW")).unwrap();

        let assets = scan_assets(dir.path(), AssetKind::Video, &["mkv".to_string()]).unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].file_name(), "Show.S01E01.mkv");
        assert_eq!(
            find_subfolder(dir.path(), "subtitle_hebrew"),
            Some(dir.path().join("Subtitle_HEBREW"))
        );
    }
}
