use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ClarifyError, Result};

/// Top-level configuration for the clarify service.
///
/// Loaded from `~/.clarify/config.toml` by default. Each section corresponds
/// to one collaborator or to the dialogue policy itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClarifyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dialog: DialogConfig,
    #[serde(default)]
    pub faq: FaqConfig,
    #[serde(default)]
    pub levels: LevelConfig,
    #[serde(default)]
    pub chatter: ChatterConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

impl ClarifyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClarifyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ClarifyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding catalogs, FAQ exports and transcripts.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.clarify/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP / WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Longest accepted utterance, in characters.
    pub max_message_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
            max_message_length: 2000,
        }
    }
}

/// Decision policy thresholds and persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Candidates scoring below this are never chosen outside the last-resort
    /// fallback (0.0 to 1.0).
    pub score_thresh: f64,
    /// Candidates below this fraction of the top score drop out of contention
    /// (0.0 to 1.0).
    pub score_perc: f64,
    /// How often a keyword confirmation may recur before the step is skipped.
    pub rep_confirm: usize,
    /// How often the user may be asked for an extra keyword.
    pub rep_extend: usize,
    /// Level committed when the user denies both a study and a faculty.
    pub broad_level: String,
    /// Name the assistant introduces itself with.
    pub bot_name: String,
    /// Language used when detection is inconclusive: "english" or "dutch".
    pub default_language: String,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            score_thresh: 0.5,
            score_perc: 0.75,
            rep_confirm: 1,
            rep_extend: 1,
            broad_level: "University".to_string(),
            bot_name: "Clarify".to_string(),
            default_language: "english".to_string(),
        }
    }
}

/// FAQ similarity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqConfig {
    /// Minimum cosine similarity before an FAQ entry is offered.
    pub faq_thres: f64,
    /// JSON export of the English FAQ.
    pub english_path: Option<String>,
    /// JSON export of the Dutch FAQ.
    pub dutch_path: Option<String>,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            faq_thres: 0.6,
            english_path: None,
            dutch_path: None,
        }
    }
}

/// Level (study / faculty) matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// JSON catalog of studies, faculties and abbreviations.
    pub catalog_path: Option<String>,
    /// Keyword-overlap ratio a level name must exceed.
    pub study_thresh: f64,
    /// Weight of the overlap threshold in the typo-tolerant threshold.
    pub bigram_factor: f64,
    /// Whole-utterance edit similarity a level name must exceed.
    pub naive_thresh: f64,
}

impl LevelConfig {
    /// Threshold for the typo-tolerant bigram layer.
    pub fn bigram_thresh(&self) -> f64 {
        self.study_thresh * self.bigram_factor + 1.0 - self.bigram_factor
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            study_thresh: 0.5,
            bigram_factor: 0.5,
            naive_thresh: 0.85,
        }
    }
}

/// Small-talk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatterConfig {
    /// JSON catalog of prompt/reply pairs; built-in pairs are used when unset.
    pub catalog_path: Option<String>,
    /// Words ignored when matching small talk by keyword subset.
    pub extra_words: Vec<String>,
}

impl Default for ChatterConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            extra_words: ["i", "ik", "you", "jij", "mijn", "my", "want"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
        }
    }
}

/// Search backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// "http" for a remote search service, "static" for an in-process corpus.
    pub kind: String,
    /// Endpoint of the remote search service.
    pub url: String,
    /// Request timeout for the remote service.
    pub timeout_secs: u64,
    /// JSON corpus for the static backend.
    pub corpus_path: Option<String>,
    /// Append the keywords to the source text before sending.
    pub append_keywords_to_source: bool,
    /// Maximum number of records the static backend returns.
    pub max_results: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "static".to_string(),
            url: "http://127.0.0.1:8000/query".to_string(),
            timeout_secs: 10,
            corpus_path: None,
            append_keywords_to_source: true,
            max_results: 10,
        }
    }
}

/// Conversation transcript settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Whether transcripts are written at all.
    pub enabled: bool,
    /// Directory transcripts are written to.
    pub dir: String,
    /// Transcripts with at most this many lines are deleted on close.
    pub min_lines: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "logs".to_string(),
            min_lines: 5,
        }
    }
}
