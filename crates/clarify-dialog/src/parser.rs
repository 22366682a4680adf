//! Rule-based feature extraction.
//!
//! Turns an utterance into tokens, a language, a question type, keywords
//! and an optional level guess, without any statistical model.

use std::path::Path;
use std::sync::LazyLock;

use clarify_core::config::LevelConfig;
use regex::Regex;
use tracing::debug;

use crate::error::DialogError;
use crate::level::{LevelCatalog, LevelMatcher};
use crate::types::{Features, Language, UtteranceType};

/// Extracts [`Features`] from an utterance.
pub trait FeatureExtractor: Send + Sync {
    /// `fallback` is used when the language cannot be told from the text.
    fn extract(&self, text: &str, fallback: Language) -> Features;
}

// =============================================================================
// Word tables
// =============================================================================

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}]+)?").expect("Invalid token regex"));

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "don't", "down", "during", "each", "few",
    "for", "from", "further", "get", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "it's", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "please", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those", "through",
    "to", "too", "under", "until", "up", "very", "want", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your",
    "yours", "yourself", "yourselves",
];

const DUTCH_STOPWORDS: &[&str] = &[
    "aan", "al", "alle", "alles", "als", "ben", "bij", "dan", "dat", "de", "der", "deze", "die",
    "dit", "doch", "doen", "door", "dus", "een", "eens", "en", "er", "ge", "geen", "geweest",
    "had", "heb", "hebben", "heeft", "hem", "het", "hier", "hij", "hoe", "hun", "iemand", "iets",
    "ik", "in", "is", "ja", "je", "jij", "jou", "jouw", "kan", "kon", "kunnen", "kun", "maar",
    "me", "meer", "men", "met", "mij", "mijn", "moet", "na", "naar", "niet", "niets", "nog",
    "nu", "of", "om", "omdat", "onder", "ons", "ook", "op", "over", "reeds", "te", "tegen",
    "toch", "toen", "tot", "u", "uit", "uw", "van", "veel", "voor", "waar", "waarom", "wanneer",
    "want", "was", "wat", "we", "welke", "wel", "werd", "wie", "wij", "wil", "wordt", "worden",
    "zal", "ze", "zelf", "zich", "zij", "zijn", "zo", "zonder", "zou",
];

/// Question words and common misspellings, by type.
const QUESTION_WORDS: &[(UtteranceType, &[&str])] = &[
    (UtteranceType::Who, &["who", "wie"]),
    (UtteranceType::What, &["what", "wat", "whut"]),
    (UtteranceType::Where, &["where", "waar", "war"]),
    (
        UtteranceType::Why,
        &["why", "wy", "waarom", "wrm", "warom", "waarrom"],
    ),
    (
        UtteranceType::When,
        &["when", "wen", "wanneer", "waneer", "wanner"],
    ),
    (UtteranceType::How, &["how", "hoe"]),
    (UtteranceType::Which, &["which", "welke"]),
];

/// Lower-cased word tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str().replace('’', "'"))
        .collect()
}

/// Stop-word vote between English and Dutch.
pub fn detect_language(tokens: &[String], fallback: Language) -> Language {
    let english = tokens
        .iter()
        .filter(|t| ENGLISH_STOPWORDS.contains(&t.as_str()))
        .count();
    let dutch = tokens
        .iter()
        .filter(|t| DUTCH_STOPWORDS.contains(&t.as_str()))
        .count();
    match english.cmp(&dutch) {
        std::cmp::Ordering::Greater => Language::English,
        std::cmp::Ordering::Less => Language::Dutch,
        std::cmp::Ordering::Equal => fallback,
    }
}

/// Type of the first question word found, in table order.
pub fn utterance_type(tokens: &[String]) -> UtteranceType {
    QUESTION_WORDS
        .iter()
        .find(|(_, words)| tokens.iter().any(|t| words.contains(&t.as_str())))
        .map(|(kind, _)| *kind)
        .unwrap_or_default()
}

/// Content words of `tokens` in first-occurrence order.
pub fn keywords(tokens: &[String], language: Language) -> Vec<String> {
    let stopwords = match language {
        Language::English => ENGLISH_STOPWORDS,
        Language::Dutch => DUTCH_STOPWORDS,
    };
    let mut ordered: Vec<String> = Vec::new();
    for token in tokens {
        if token.chars().count() >= 2
            && !stopwords.contains(&token.as_str())
            && !ordered.contains(token)
        {
            ordered.push(token.clone());
        }
    }
    ordered
}

// =============================================================================
// RuleExtractor
// =============================================================================

/// Stop-word and table driven [`FeatureExtractor`].
#[derive(Debug, Clone, Default)]
pub struct RuleExtractor {
    levels: Option<LevelMatcher>,
}

impl RuleExtractor {
    pub fn new(levels: Option<LevelMatcher>) -> Self {
        Self { levels }
    }

    /// Build from the level settings, loading the catalog when one is set.
    pub fn from_config(config: &LevelConfig) -> Result<Self, DialogError> {
        let levels = match &config.catalog_path {
            Some(path) => Some(LevelMatcher::new(LevelCatalog::load(Path::new(path))?, config)),
            None => None,
        };
        Ok(Self::new(levels))
    }
}

impl FeatureExtractor for RuleExtractor {
    fn extract(&self, text: &str, fallback: Language) -> Features {
        let tokens = tokenize(text);
        let language = detect_language(&tokens, fallback);
        let ordered = keywords(&tokens, language);
        let level_guess = self
            .levels
            .as_ref()
            .and_then(|matcher| matcher.guess(text, &ordered));
        let features = Features {
            language,
            utterance_type: utterance_type(&tokens),
            keywords: ordered.into_iter().collect(),
            tokens,
            level_guess,
        };
        debug!(
            language = %features.language,
            utterance_type = ?features.utterance_type,
            keywords = features.keywords.len(),
            "Features extracted"
        );
        features
    }
}
