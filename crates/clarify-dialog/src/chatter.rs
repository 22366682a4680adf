//! Small talk: greetings, thanks, the time and the date.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Local;
use clarify_core::config::ChatterConfig;
use serde::Deserialize;
use tracing::debug;

use crate::error::DialogError;
use crate::parser::tokenize;
use crate::types::Language;

/// Answers small talk that needs no search.
pub trait SmallTalk: Send + Sync {
    /// Reply for `utterance` with the given keywords, if it is small talk.
    fn reply(
        &self,
        keywords: &BTreeSet<String>,
        utterance: &str,
        language: Language,
    ) -> Option<String>;
}

const TIME_WORDS: &[&str] = &["time", "tijd", "laat", "late", "how"];
const DATE_WORDS: &[&str] = &[
    "date", "datum", "day", "dag", "vandaag", "today", "what", "welke",
];

const ENGLISH_PAIRS: &[(&str, &str)] = &[
    ("hello", "Hello! What would you like to know?"),
    ("hi", "Hi! What can I do for you?"),
    ("good morning", "Good morning! How can I help?"),
    ("how are you", "I am fine, thanks for asking. What is your question?"),
    ("thank you", "You are welcome!"),
    ("thanks", "No problem!"),
    ("who are you", "I am {name}, I answer questions about your studies."),
    ("what is your name", "My name is {name}."),
    ("tell me a joke", "I would, but my jokes are not included in the study guide."),
];

const DUTCH_PAIRS: &[(&str, &str)] = &[
    ("hallo", "Hallo! Wat wil je weten?"),
    ("hoi", "Hoi! Wat kan ik voor je doen?"),
    ("goedemorgen", "Goedemorgen! Waarmee kan ik helpen?"),
    ("hoe gaat het", "Goed, bedankt dat je het vraagt. Wat is je vraag?"),
    ("dankjewel", "Graag gedaan!"),
    ("bedankt", "Geen probleem!"),
    ("wie ben jij", "Ik ben {name}, ik beantwoord vragen over je studie."),
    ("hoe heet je", "Ik heet {name}."),
];

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    english: Vec<(String, String)>,
    #[serde(default)]
    dutch: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Pair {
    tokens: Vec<String>,
    reply: String,
}

impl Pair {
    fn new(prompt: &str, reply: &str, bot_name: &str) -> Self {
        Self {
            tokens: alpha_tokens(prompt),
            reply: reply.replace("{name}", bot_name),
        }
    }
}

fn alpha_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().all(char::is_alphabetic))
        .collect()
}

/// Prompt/reply pairs per language.
#[derive(Debug, Clone)]
pub struct ChatterCatalog {
    english: Vec<Pair>,
    dutch: Vec<Pair>,
    extra_words: BTreeSet<String>,
    bot_name: String,
}

impl ChatterCatalog {
    /// The built-in pairs.
    pub fn builtin(bot_name: &str, extra_words: &[String]) -> Self {
        let build = |pairs: &[(&str, &str)]| -> Vec<Pair> {
            pairs
                .iter()
                .map(|(p, r)| Pair::new(p, r, bot_name))
                .collect()
        };
        Self::assemble(build(ENGLISH_PAIRS), build(DUTCH_PAIRS), bot_name, extra_words)
    }

    /// Pairs from a JSON file `{"english": [[prompt, reply], ..], "dutch": [..]}`.
    pub fn load(path: &Path, bot_name: &str, extra_words: &[String]) -> Result<Self, DialogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DialogError::Catalog(format!("{}: {e}", path.display())))?;
        let file: CatalogFile = serde_json::from_str(&content)?;
        let build = |pairs: &[(String, String)]| -> Vec<Pair> {
            pairs
                .iter()
                .map(|(p, r)| Pair::new(p, r, bot_name))
                .collect()
        };
        Ok(Self::assemble(
            build(&file.english),
            build(&file.dutch),
            bot_name,
            extra_words,
        ))
    }

    pub fn from_config(config: &ChatterConfig, bot_name: &str) -> Result<Self, DialogError> {
        match &config.catalog_path {
            Some(path) => Self::load(Path::new(path), bot_name, &config.extra_words),
            None => Ok(Self::builtin(bot_name, &config.extra_words)),
        }
    }

    fn assemble(english: Vec<Pair>, dutch: Vec<Pair>, bot_name: &str, extra: &[String]) -> Self {
        let bot_name = bot_name.to_lowercase();
        let mut extra_words: BTreeSet<String> = extra.iter().map(|w| w.to_lowercase()).collect();
        extra_words.insert(bot_name.clone());
        Self {
            english,
            dutch,
            extra_words,
            bot_name,
        }
    }

    fn pairs(&self, language: Language) -> &[Pair] {
        match language {
            Language::English => &self.english,
            Language::Dutch => &self.dutch,
        }
    }
}

impl SmallTalk for ChatterCatalog {
    fn reply(
        &self,
        keywords: &BTreeSet<String>,
        utterance: &str,
        language: Language,
    ) -> Option<String> {
        let pairs = self.pairs(language);

        let sentence = alpha_tokens(utterance);
        if let Some(pair) = pairs.iter().find(|p| p.tokens == sentence) {
            debug!("Small talk matched on sentence");
            return Some(pair.reply.clone());
        }

        if keywords.is_empty() {
            return None;
        }

        let named: Vec<&String> = keywords.iter().filter(|k| **k != self.bot_name).collect();
        if !named.is_empty() {
            if named.iter().all(|k| TIME_WORDS.contains(&k.as_str())) {
                return Some(Local::now().format("%H:%M:%S").to_string());
            }
            if named.iter().all(|k| DATE_WORDS.contains(&k.as_str())) {
                return Some(Local::now().format("%A %d-%m-%Y").to_string());
            }
        }

        pairs.iter().find_map(|pair| {
            let prompt: BTreeSet<String> = pair.tokens.iter().cloned().collect();
            let widened: BTreeSet<String> = prompt.union(&self.extra_words).cloned().collect();
            let hit = if keywords.len() == 1 && pair.tokens.len() > 5 {
                *keywords == prompt || *keywords == widened
            } else {
                keywords.is_subset(&widened)
            };
            hit.then(|| {
                debug!("Small talk matched on keywords");
                pair.reply.clone()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ChatterCatalog {
        ChatterCatalog::from_config(&ChatterConfig::default(), "Clarify").unwrap()
    }

    fn kw(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_sentence_match() {
        let reply = catalog().reply(&kw(&[]), "How are you?", Language::English);
        assert_eq!(
            reply.as_deref(),
            Some("I am fine, thanks for asking. What is your question?")
        );
    }

    #[test]
    fn test_bot_name_substituted() {
        let reply = catalog()
            .reply(&kw(&["name"]), "what is your name", Language::English)
            .unwrap();
        assert_eq!(reply, "My name is Clarify.");
    }

    #[test]
    fn test_keyword_subset_match() {
        // "hello clarify" is not a prompt sentence, but its keywords are.
        let reply = catalog().reply(&kw(&["hello", "clarify"]), "hello clarify", Language::English);
        assert_eq!(reply.as_deref(), Some("Hello! What would you like to know?"));
    }

    #[test]
    fn test_time_question() {
        let reply = catalog()
            .reply(&kw(&["time"]), "time please", Language::English)
            .unwrap();
        assert_eq!(reply.len(), 8);
        assert_eq!(reply.matches(':').count(), 2);
    }

    #[test]
    fn test_date_question() {
        let reply = catalog()
            .reply(&kw(&["date", "today"]), "date today", Language::English)
            .unwrap();
        assert_eq!(reply.matches('-').count(), 2);
    }

    #[test]
    fn test_question_is_not_small_talk() {
        let reply = catalog().reply(
            &kw(&["thesis", "deadline"]),
            "what is the thesis deadline",
            Language::English,
        );
        assert!(reply.is_none());
    }

    #[test]
    fn test_language_specific_pairs() {
        let c = catalog();
        assert!(c.reply(&kw(&["hallo"]), "hallo", Language::Dutch).is_some());
        assert!(c.reply(&kw(&["hallo"]), "hallo", Language::English).is_none());
    }

    #[test]
    fn test_single_keyword_against_long_prompt_needs_equality() {
        let c = ChatterCatalog::assemble(
            vec![Pair::new("tell me a funny joke about cats", "Meow.", "x")],
            vec![],
            "x",
            &[],
        );
        assert!(c.reply(&kw(&["cats"]), "cats", Language::English).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatter.json");
        std::fs::write(&path, r#"{"english":[["ping","pong {name}"]]}"#).unwrap();
        let c = ChatterCatalog::load(&path, "Bot", &[]).unwrap();
        assert_eq!(
            c.reply(&kw(&["ping"]), "ping", Language::English).as_deref(),
            Some("pong Bot")
        );
        assert!(c.reply(&kw(&["hallo"]), "hallo", Language::Dutch).is_none());
    }
}
