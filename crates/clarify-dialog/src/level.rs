//! Level catalog and the layered fuzzy level matcher.
//!
//! Layers, tried in order until one produces matches:
//! 1. whole-utterance edit similarity against faculties, then studies
//! 2. abbreviation lookup for short keywords
//! 3. keyword overlap with faculty names, then study names
//! 4. typo-tolerant bigram scoring of keyword runs, faculties then studies
//!
//! The highest scoring match of the first productive layer wins.

use std::collections::HashMap;
use std::path::Path;

use clarify_core::config::LevelConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DialogError;

/// Known studies, faculties and study abbreviations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelCatalog {
    #[serde(default)]
    pub studies: Vec<String>,
    #[serde(default)]
    pub faculties: Vec<String>,
    /// Lower-case abbreviation to full study name.
    #[serde(default)]
    pub abbreviations: HashMap<String, String>,
}

impl LevelCatalog {
    /// Load a catalog from its JSON export.
    pub fn load(path: &Path) -> Result<Self, DialogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DialogError::Catalog(format!("{}: {e}", path.display())))?;
        let mut catalog: LevelCatalog = serde_json::from_str(&content)?;
        catalog.abbreviations = catalog
            .abbreviations
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        debug!(
            studies = catalog.studies.len(),
            faculties = catalog.faculties.len(),
            "Level catalog loaded"
        );
        Ok(catalog)
    }
}

/// Matches utterances against a [`LevelCatalog`].
#[derive(Debug, Clone)]
pub struct LevelMatcher {
    catalog: LevelCatalog,
    study_thresh: f64,
    bigram_thresh: f64,
    naive_thresh: f64,
    clean_studies: Vec<(String, String)>,
    clean_faculties: Vec<(String, String)>,
}

impl LevelMatcher {
    pub fn new(catalog: LevelCatalog, config: &LevelConfig) -> Self {
        let clean_studies = catalog
            .studies
            .iter()
            .map(|s| (long_words(strip_suffix(s)), s.clone()))
            .collect();
        let clean_faculties = catalog
            .faculties
            .iter()
            .map(|f| (long_words(f), f.clone()))
            .collect();
        Self {
            catalog,
            study_thresh: config.study_thresh,
            bigram_thresh: config.bigram_thresh(),
            naive_thresh: config.naive_thresh,
            clean_studies,
            clean_faculties,
        }
    }

    pub fn catalog(&self) -> &LevelCatalog {
        &self.catalog
    }

    /// Best level for an utterance, given its keywords in utterance order.
    pub fn guess(&self, text: &str, keywords: &[String]) -> Option<String> {
        let mut matches = self.whole_text(text, &self.catalog.faculties);
        if matches.is_empty() {
            matches = self.whole_text(text, &self.catalog.studies);
        }
        if matches.is_empty() {
            matches = self.abbreviation(keywords);
        }
        if matches.is_empty() {
            matches = self.overlap(keywords, &self.catalog.faculties);
        }
        if matches.is_empty() {
            matches = self.overlap(keywords, &self.catalog.studies);
        }
        if matches.is_empty() {
            matches = self.double_bigram(keywords, &self.clean_faculties);
        }
        if matches.is_empty() {
            matches = self.double_bigram(keywords, &self.clean_studies);
        }

        matches.sort_by(|a, b| b.1.total_cmp(&a.1));
        let level = matches.into_iter().next().map(|(name, _)| name.trim().to_string());
        debug!(level = level.as_deref().unwrap_or(""), "Level guessed");
        level
    }

    fn whole_text(&self, text: &str, names: &[String]) -> Vec<(String, f64)> {
        let text = text.to_lowercase();
        let text_len = text.chars().count();
        names
            .iter()
            .filter_map(|name| {
                let lower = name.to_lowercase();
                let longest = text_len.max(lower.chars().count());
                if longest == 0 {
                    return None;
                }
                let score = 1.0 - edit_distance(&text, &lower) as f64 / longest as f64;
                (score > self.naive_thresh).then(|| (name.clone(), score))
            })
            .collect()
    }

    fn abbreviation(&self, keywords: &[String]) -> Vec<(String, f64)> {
        keywords
            .iter()
            .filter(|k| k.chars().count() <= 7)
            .filter_map(|k| self.catalog.abbreviations.get(k.as_str()))
            .map(|name| (name.clone(), 1.0))
            .collect()
    }

    fn overlap(&self, keywords: &[String], names: &[String]) -> Vec<(String, f64)> {
        names
            .iter()
            .filter_map(|name| {
                let clean: Vec<String> = strip_suffix(name)
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric() && c != '\'')
                    .filter(|w| w.chars().count() > 1 && !w.contains('\'') && *w != "der")
                    .map(str::to_string)
                    .collect();
                if clean.is_empty() {
                    return None;
                }
                let hits = keywords.iter().filter(|k| clean.contains(k)).count();
                let score = hits as f64 / clean.len() as f64;
                (score > self.study_thresh).then(|| (name.clone(), score))
            })
            .collect()
    }

    /// Score runs of consecutive keywords against cleaned names, allowing
    /// one position of drift per character.
    fn double_bigram(&self, keywords: &[String], names: &[(String, String)]) -> Vec<(String, f64)> {
        let thresh = self.bigram_thresh;
        let mut matches = Vec::new();
        for i in 0..keywords.len() {
            let mut run = String::new();
            for keyword in &keywords[i..] {
                run.push_str(&keyword.to_lowercase());
                let run_len = run.chars().count() as f64;
                for (clean, name) in names {
                    if run_len * thresh >= clean.chars().count() as f64 {
                        continue;
                    }
                    let score = similarity(&run, clean, thresh, name);
                    if score > thresh {
                        matches.push((name.clone(), score));
                    }
                }
            }
        }
        matches
    }
}

/// Name without its parenthesised suffix, e.g. "Physics (BSc)" -> "Physics ".
fn strip_suffix(name: &str) -> &str {
    match name.rfind('(') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Lower-cased words longer than three characters, space joined.
fn long_words(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| w.chars().count() > 3 && !w.contains('\''))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Characters of `a` found in `b` at the same position, give or take one.
fn drift_score(a: &[char], b: &[char]) -> usize {
    let mut score = 0;
    for (i, ca) in a.iter().enumerate() {
        if (i.saturating_sub(1)..=i + 1).any(|j| b.get(j) == Some(ca)) {
            score += 1;
        }
    }
    score
}

fn similarity(run: &str, clean: &str, thresh: f64, name: &str) -> f64 {
    let run: Vec<char> = run.chars().collect();
    let words: Vec<&str> = clean.split(' ').filter(|w| !w.is_empty()).collect();

    let best_tail = (0..words.len())
        .map(|h| {
            let tail: Vec<char> = words[h..].concat().chars().collect();
            drift_score(&run, &tail)
        })
        .max()
        .unwrap_or(0);

    // At least one word of the name must be mostly present in the run.
    let mut best_word = 0;
    let mut best_ratio = 0.0;
    for word in &words {
        let chars: Vec<char> = word.chars().collect();
        let score = drift_score(&chars, &run);
        if score > best_word {
            best_word = score;
            best_ratio = score as f64 / chars.len() as f64;
        }
    }
    if best_ratio <= thresh {
        return 0.0;
    }
    let name_len = strip_suffix(name).chars().count();
    if name_len == 0 {
        return 0.0;
    }
    best_tail as f64 / name_len as f64
}

/// Levenshtein distance over characters.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
