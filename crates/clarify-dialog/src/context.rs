//! Discourse context: what one conversation has said so far.

use std::collections::BTreeSet;

use crate::types::{BackendRequest, Features, Language};

/// One user utterance and the features extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub features: Features,
}

/// Accumulated linguistic state of one question.
///
/// Created fresh for every new question, carried across rephrasings, and
/// mutated only by the orchestrator.
#[derive(Debug, Clone)]
pub struct DiscourseContext {
    language: Language,
    keywords: BTreeSet<String>,
    level: Option<String>,
    utterances: Vec<Utterance>,
    offered_faqs: Vec<String>,
    /// Text sent to the backend; the newest rephrasing replaces it.
    source_text: String,
}

impl DiscourseContext {
    /// Start a context from the first utterance of a question.
    pub fn new(text: impl Into<String>, features: Features) -> Self {
        let text = text.into();
        Self {
            language: features.language,
            keywords: features.keywords.clone(),
            level: features.level_guess.clone(),
            source_text: text.clone(),
            utterances: vec![Utterance { text, features }],
            offered_faqs: Vec::new(),
        }
    }

    /// Fold a rephrasing into the context.
    ///
    /// The keywords are unioned in and the rephrasing becomes the backend
    /// source text. A level guess is only taken if none is held yet.
    pub fn add_rephrase(&mut self, text: impl Into<String>, features: Features) {
        let text = text.into();
        self.keywords.extend(features.keywords.iter().cloned());
        if self.level.is_none() {
            self.level = features.level_guess.clone();
        }
        self.source_text = text.clone();
        self.utterances.push(Utterance { text, features });
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn add_keyword(&mut self, keyword: impl Into<String>) {
        self.keywords.insert(keyword.into());
    }

    pub fn remove_keyword(&mut self, keyword: &str) {
        self.keywords.remove(keyword);
    }

    pub fn remove_keywords<'a>(&mut self, keywords: impl IntoIterator<Item = &'a String>) {
        for keyword in keywords {
            self.keywords.remove(keyword);
        }
    }

    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    pub fn set_level(&mut self, level: impl Into<String>) {
        self.level = Some(level.into());
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn last_utterance(&self) -> Option<&Utterance> {
        self.utterances.last()
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn offered_faqs(&self) -> &[String] {
        &self.offered_faqs
    }

    /// Remember an FAQ question as asked so it is never offered again.
    pub fn mark_faq_offered(&mut self, question: impl Into<String>) {
        let question = question.into();
        if !self.offered_faqs.contains(&question) {
            self.offered_faqs.push(question);
        }
    }

    /// Build the backend request for the current state.
    pub fn backend_request(&self) -> BackendRequest {
        BackendRequest {
            language: self.language,
            utterance_type: self
                .last_utterance()
                .map(|u| u.features.utterance_type)
                .unwrap_or_default(),
            level: self.level.clone(),
            keywords: self.keywords.clone(),
            source_text: self.source_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UtteranceType;

    fn features(keywords: &[&str], level: Option<&str>) -> Features {
        Features {
            language: Language::English,
            tokens: keywords.iter().map(|k| k.to_string()).collect(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            utterance_type: UtteranceType::What,
            level_guess: level.map(str::to_string),
        }
    }

    #[test]
    fn test_new_context_takes_features() {
        let ctx = DiscourseContext::new("thesis deadline", features(&["thesis", "deadline"], Some("Physics")));
        assert_eq!(ctx.language(), Language::English);
        assert_eq!(ctx.keywords().len(), 2);
        assert_eq!(ctx.level(), Some("Physics"));
        assert_eq!(ctx.source_text(), "thesis deadline");
        assert_eq!(ctx.utterances().len(), 1);
    }

    #[test]
    fn test_rephrase_unions_keywords_and_replaces_source() {
        let mut ctx = DiscourseContext::new("thesis deadline", features(&["thesis", "deadline"], None));
        ctx.add_rephrase("master thesis", features(&["master", "thesis"], Some("AI")));
        assert_eq!(ctx.keywords().len(), 3);
        assert_eq!(ctx.source_text(), "master thesis");
        assert_eq!(ctx.level(), Some("AI"));
        assert_eq!(ctx.last_utterance().unwrap().text, "master thesis");
    }

    #[test]
    fn test_rephrase_keeps_existing_level() {
        let mut ctx = DiscourseContext::new("q", features(&["q"], Some("Physics")));
        ctx.add_rephrase("r", features(&["r"], Some("AI")));
        assert_eq!(ctx.level(), Some("Physics"));
    }

    #[test]
    fn test_keyword_edits() {
        let mut ctx = DiscourseContext::new("a b", features(&["a", "b"], None));
        ctx.add_keyword("robotics");
        ctx.remove_keyword("a");
        assert!(ctx.keywords().contains("robotics"));
        assert!(!ctx.keywords().contains("a"));
        let drop: BTreeSet<String> = ["b".to_string(), "robotics".to_string()].into();
        ctx.remove_keywords(&drop);
        assert!(ctx.keywords().is_empty());
    }

    #[test]
    fn test_faq_offered_once() {
        let mut ctx = DiscourseContext::new("q", features(&[], None));
        ctx.mark_faq_offered("How do I enrol?");
        ctx.mark_faq_offered("How do I enrol?");
        assert_eq!(ctx.offered_faqs().len(), 1);
    }

    #[test]
    fn test_backend_request_reflects_state() {
        let mut ctx = DiscourseContext::new("exam resit", features(&["exam", "resit"], None));
        ctx.set_level("Physics");
        ctx.set_language(Language::Dutch);
        let req = ctx.backend_request();
        assert_eq!(req.language, Language::Dutch);
        assert_eq!(req.utterance_type, UtteranceType::What);
        assert_eq!(req.level.as_deref(), Some("Physics"));
        assert!(req.keywords.contains("resit"));
        assert_eq!(req.source_text, "exam resit");
    }
}
