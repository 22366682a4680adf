//! FAQ similarity search.
//!
//! Each FAQ entry is described by a keyword list. Entries and queries are
//! compared as TF-IDF vectors (binary term frequency) by cosine similarity.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use clarify_core::config::FaqConfig;
use tracing::{debug, info};

use crate::error::DialogError;
use crate::types::{FaqMatch, Language};

/// Finds an FAQ entry that answers the active keywords.
pub trait FaqMatcher: Send + Sync {
    fn best_match(
        &self,
        keywords: &BTreeSet<String>,
        language: Language,
        already_asked: &[String],
    ) -> Option<FaqMatch>;
}

#[derive(Debug, Clone)]
struct FaqEntry {
    keywords: BTreeSet<String>,
    question: String,
    answer: String,
}

/// TF-IDF index over one language's FAQ.
#[derive(Debug, Clone)]
pub struct FaqIndex {
    entries: Vec<FaqEntry>,
    idf: BTreeMap<String, f64>,
    threshold: f64,
}

impl FaqIndex {
    /// Build from a JSON object mapping `"kw1,kw2,.."` to `[question, answer]`.
    pub fn from_json(json: &str, threshold: f64) -> Result<Self, DialogError> {
        let raw: BTreeMap<String, (String, String)> = serde_json::from_str(json)?;
        let entries: Vec<FaqEntry> = raw
            .into_iter()
            .map(|(keys, (question, answer))| FaqEntry {
                keywords: keys
                    .split(',')
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
                question,
                answer,
            })
            .collect();

        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &entries {
            for keyword in &entry.keywords {
                *df.entry(keyword.clone()).or_insert(0) += 1;
            }
        }
        let n = entries.len() as f64;
        let idf = df
            .into_iter()
            .map(|(word, count)| (word, (n / count as f64).ln()))
            .collect();

        Ok(Self {
            entries,
            idf,
            threshold,
        })
    }

    pub fn load(path: &Path, threshold: f64) -> Result<Self, DialogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DialogError::Catalog(format!("{}: {e}", path.display())))?;
        let index = Self::from_json(&content, threshold)?;
        info!(entries = index.len(), path = %path.display(), "FAQ index loaded");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cosine(&self, query: &BTreeSet<String>, entry: &FaqEntry) -> f64 {
        let weight = |w: &String| self.idf.get(w).copied().unwrap_or(0.0);
        let entry_norm = entry.keywords.iter().map(|w| weight(w).powi(2)).sum::<f64>().sqrt();
        let query_norm = query.iter().map(|w| weight(w).powi(2)).sum::<f64>().sqrt();
        if entry_norm == 0.0 || query_norm == 0.0 {
            return 0.0;
        }
        let dot: f64 = query
            .iter()
            .filter(|w| entry.keywords.contains(*w))
            .map(|w| weight(w).powi(2))
            .sum();
        dot / (entry_norm * query_norm)
    }

    /// Most similar entry not yet asked, if it clears the threshold.
    pub fn best_match(
        &self,
        keywords: &BTreeSet<String>,
        already_asked: &[String],
    ) -> Option<FaqMatch> {
        let mut best: Option<(&FaqEntry, f64)> = None;
        for entry in &self.entries {
            if already_asked.contains(&entry.question) || entry.question.contains("not included") {
                continue;
            }
            let score = self.cosine(keywords, entry);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }
        let (entry, score) = best?;
        debug!(question = %entry.question, score, "Best FAQ candidate");
        (score > 0.0 && score >= self.threshold).then(|| FaqMatch {
            question: entry.question.clone(),
            answer: entry.answer.clone(),
            keywords: entry.keywords.iter().cloned().collect(),
        })
    }
}

/// One [`FaqIndex`] per language; a missing index never matches.
#[derive(Debug, Clone, Default)]
pub struct FaqLibrary {
    english: Option<FaqIndex>,
    dutch: Option<FaqIndex>,
}

impl FaqLibrary {
    pub fn new(english: Option<FaqIndex>, dutch: Option<FaqIndex>) -> Self {
        Self { english, dutch }
    }

    pub fn from_config(config: &FaqConfig) -> Result<Self, DialogError> {
        let load = |path: &Option<String>| {
            path.as_deref()
                .map(|p| FaqIndex::load(Path::new(p), config.faq_thres))
                .transpose()
        };
        Ok(Self::new(load(&config.english_path)?, load(&config.dutch_path)?))
    }
}

impl FaqMatcher for FaqLibrary {
    fn best_match(
        &self,
        keywords: &BTreeSet<String>,
        language: Language,
        already_asked: &[String],
    ) -> Option<FaqMatch> {
        let index = match language {
            Language::English => self.english.as_ref(),
            Language::Dutch => self.dutch.as_ref(),
        }?;
        index.best_match(keywords, already_asked)
    }
}
