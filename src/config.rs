use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::error::{Result, SeasonSubError};

// Defaults for fields that older config files may not carry
fn default_max_backoff_secs() -> f64 {
    120.0
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_video_extensions() -> Vec<String> {
    vec!["mkv".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_english_encoding() -> String {
    "windows-1252".to_string()
}

fn default_hebrew_encoding() -> String {
    "windows-1255".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub translate: TranslateConfig,
    pub tools: ToolsConfig,
    pub layout: LayoutConfig,
    pub embed: EmbedConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Provider endpoint URL
    pub endpoint: String,
    /// Model to use for translation
    pub model: String,
    /// Target language name used in the prompt
    pub target_language: String,
    /// Number of blocks sent per request
    pub window_size: usize,
    /// Number of preceding blocks sent as read-only context
    pub context_size: usize,
    /// Pause between successful window requests (seconds)
    pub inter_batch_delay_secs: f64,
    /// Backoff base; attempt n waits base * (n + 1) (seconds)
    pub retry_base_delay_secs: f64,
    /// Upper bound for a single backoff wait (seconds)
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: f64,
    /// Retries per window after the first attempt
    pub max_retries: u32,
    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the audio-based synchronizer (alass). When it cannot be found,
    /// `alass-cli` and `alass` are looked up in `./tools` and on `PATH`
    pub synchronizer_path: String,
    /// Path to mkvmerge
    pub multiplexer_path: String,
    pub sync_timeout_secs: u64,
    pub mux_timeout_secs: u64,
    /// Which RTL correction backend to use
    pub rtl_backend: RtlBackend,
    /// Command driving the external subtitle editor; receives the subtitle path as
    /// its last argument
    #[serde(default)]
    pub editor_automation_command: Vec<String>,
    #[serde(default)]
    pub editor_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RtlBackend {
    /// Move trailing punctuation of RTL lines to the front
    MovePunctuation,
    /// Prefix RTL lines with a right-to-left mark
    DirectionalMarks,
    /// Drive the external subtitle editor
    EditorAutomation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Subtitle subfolder inside the season folder; translated output lands here
    pub subtitle_folder_name: String,
    /// Folder of English subtitles, relative to the season folder unless absolute
    pub english_folder_name: String,
    /// Folder for embedded videos
    pub output_folder_name: String,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    /// Keep per-stage working directories after the run
    pub keep_temp_files: bool,
    /// Write subtitles with a UTF-8 byte order mark
    #[serde(default = "default_true")]
    pub write_bom: bool,
    /// Encoding tried when an English subtitle is not UTF-8
    #[serde(default = "default_english_encoding")]
    pub english_fallback_encoding: String,
    /// Encoding tried when a Hebrew subtitle is not UTF-8
    #[serde(default = "default_hebrew_encoding")]
    pub hebrew_fallback_encoding: String,
}

impl LayoutConfig {
    pub fn english_encoding(&self) -> Result<&'static Encoding> {
        encoding_for_label("layout.english_fallback_encoding", &self.english_fallback_encoding)
    }

    pub fn hebrew_encoding(&self) -> Result<&'static Encoding> {
        encoding_for_label("layout.hebrew_fallback_encoding", &self.hebrew_fallback_encoding)
    }
}

fn encoding_for_label(field: &str, label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| SeasonSubError::Config(format!("{}: unknown encoding {:?}", field, label)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// ISO 639-2 language tag of the subtitle track
    pub language: String,
    /// Display name of the subtitle track
    pub track_name: String,
    /// Mark the subtitle track as default
    pub default_track: bool,
    /// Leave existing output files untouched
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Pair assets identified only by the concatenated-digit rule
    #[serde(default)]
    pub accept_low_confidence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translate: TranslateConfig {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2:3b".to_string(),
                target_language: "Hebrew".to_string(),
                window_size: 20,
                context_size: 10,
                inter_batch_delay_secs: 2.0,
                retry_base_delay_secs: 30.0,
                max_backoff_secs: 120.0,
                max_retries: 5,
                request_timeout_secs: 300,
            },
            tools: ToolsConfig {
                synchronizer_path: "alass-cli".to_string(),
                multiplexer_path: "mkvmerge".to_string(),
                sync_timeout_secs: 300,
                mux_timeout_secs: 600,
                rtl_backend: RtlBackend::MovePunctuation,
                editor_automation_command: Vec::new(),
                editor_timeout_secs: None,
            },
            layout: LayoutConfig {
                subtitle_folder_name: "Subtitle_HEBREW".to_string(),
                english_folder_name: "Subtitle_ENGLISH".to_string(),
                output_folder_name: "Output".to_string(),
                video_extensions: default_video_extensions(),
                keep_temp_files: false,
                write_bom: true,
                english_fallback_encoding: default_english_encoding(),
                hebrew_fallback_encoding: default_hebrew_encoding(),
            },
            embed: EmbedConfig {
                language: "heb".to_string(),
                track_name: "Hebrew".to_string(),
                default_track: true,
                skip_existing: true,
            },
            matching: MatchingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SeasonSubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SeasonSubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SeasonSubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.translate.window_size == 0 {
            return Err(SeasonSubError::Config(
                "translate.window_size must be at least 1".to_string(),
            ));
        }
        for (name, secs) in [
            ("translate.inter_batch_delay_secs", self.translate.inter_batch_delay_secs),
            ("translate.retry_base_delay_secs", self.translate.retry_base_delay_secs),
            ("translate.max_backoff_secs", self.translate.max_backoff_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(SeasonSubError::Config(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
        for (name, folder) in [
            ("layout.subtitle_folder_name", &self.layout.subtitle_folder_name),
            ("layout.english_folder_name", &self.layout.english_folder_name),
            ("layout.output_folder_name", &self.layout.output_folder_name),
        ] {
            if folder.trim().is_empty() {
                return Err(SeasonSubError::Config(format!("{} must not be empty", name)));
            }
        }
        self.layout.english_encoding()?;
        self.layout.hebrew_encoding()?;
        if self.tools.rtl_backend == RtlBackend::EditorAutomation
            && self.tools.editor_automation_command.is_empty()
        {
            return Err(SeasonSubError::Config(
                "tools.editor_automation_command is required for the EditorAutomation backend"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl TranslateConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_batch_delay_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_base_delay_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.max_backoff_secs)
    }
}
