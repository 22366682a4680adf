//! Shared data types for the dialogue engine.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Language / utterance type
// =============================================================================

/// Conversation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Dutch,
    English,
}

impl Language {
    /// Numeric code used on the backend and client wire.
    pub fn code(self) -> u8 {
        match self {
            Language::Dutch => 0,
            Language::English => 1,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Language::Dutch),
            1 => Some(Language::English),
            _ => None,
        }
    }

    /// Parse a configuration name such as `"english"` or `"nl"`.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "english" | "en" => Some(Language::English),
            "dutch" | "nl" | "nederlands" => Some(Language::Dutch),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Language::Dutch => "Dutch",
            Language::English => "English",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Question type of an utterance, derived from its question word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UtteranceType {
    #[default]
    Unknown,
    Who,
    What,
    Where,
    Why,
    When,
    How,
    Which,
}

impl UtteranceType {
    /// Numeric code sent to the backend.
    pub fn code(self) -> u8 {
        match self {
            UtteranceType::Unknown => 0,
            UtteranceType::Who => 1,
            UtteranceType::What => 2,
            UtteranceType::Where => 3,
            UtteranceType::Why => 4,
            UtteranceType::When => 5,
            UtteranceType::How => 6,
            UtteranceType::Which => 7,
        }
    }
}

// =============================================================================
// Candidates
// =============================================================================

/// One scored prospective answer returned by the backend.
///
/// Equality is by value over all five fields; this is what deduplication
/// during a merge compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    /// Relevance score (0.0 to 1.0).
    pub score: f64,
    /// Scope label; `None` means the candidate applies regardless of level.
    pub level: Option<String>,
    pub keywords: BTreeSet<String>,
    pub answer: String,
}

impl Candidate {
    /// Create a candidate with no level, keywords or answer text.
    pub fn new(url: impl Into<String>, score: f64) -> Self {
        Self {
            url: url.into(),
            score,
            level: None,
            keywords: BTreeSet::new(),
            answer: String::new(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Clarifying action chosen by the decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    ConfirmLevel,
    ConfirmKeyword,
    ExtendKeyword,
    Rephrase,
    OtherMeasures,
}

/// One entry of the decision history: an action plus the keyword it is
/// about, when it is about one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decision {
    pub action: ActionKind,
    pub keyword: Option<String>,
}

impl Decision {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            keyword: None,
        }
    }

    pub fn confirm_keyword(keyword: impl Into<String>) -> Self {
        Self {
            action: ActionKind::ConfirmKeyword,
            keyword: Some(keyword.into()),
        }
    }
}

// =============================================================================
// Collaborator payloads
// =============================================================================

/// Features extracted from a single utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub language: Language,
    pub tokens: Vec<String>,
    pub keywords: BTreeSet<String>,
    pub utterance_type: UtteranceType,
    pub level_guess: Option<String>,
}

/// A request to the backend search service.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub language: Language,
    pub utterance_type: UtteranceType,
    pub level: Option<String>,
    pub keywords: BTreeSet<String>,
    pub source_text: String,
}

/// A record as returned by the backend, before level expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRecord {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Level", default)]
    pub levels: Vec<String>,
    #[serde(rename = "Keywords", default)]
    pub keywords: Vec<String>,
    #[serde(rename = "Answer", default)]
    pub answer: String,
}

/// An FAQ entry matched against the active keywords.
#[derive(Debug, Clone, PartialEq)]
pub struct FaqMatch {
    pub question: String,
    pub answer: String,
    pub keywords: Vec<String>,
}

// =============================================================================
// Transport events
// =============================================================================

/// Inbound event from the user's side of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// One free-text message.
    Utterance(String),
    /// The user switched the conversation language.
    Language(Language),
}

/// Outbound event to the user's side of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A text or HTML-fragment message from the assistant.
    Message(String),
    /// Echo of the user's raw input.
    Echo(String),
    /// The session language changed.
    Language(Language),
}
