//! Candidate narrowing: the "intelligent unit".
//!
//! Owns the ranked candidate list together with the facts confirmed or
//! rejected during the conversation, and picks the next clarifying action.

use std::collections::{BTreeSet, HashMap};

use clarify_core::config::DialogConfig;
use tracing::debug;

use crate::types::{ActionKind, Candidate, Decision};

/// Numeric knobs of the decision policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub score_thresh: f64,
    pub score_perc: f64,
    pub rep_confirm: usize,
    pub rep_extend: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&DialogConfig::default())
    }
}

impl From<&DialogConfig> for Thresholds {
    fn from(config: &DialogConfig) -> Self {
        Self {
            score_thresh: config.score_thresh,
            score_perc: config.score_perc,
            rep_confirm: config.rep_confirm,
            rep_extend: config.rep_extend,
        }
    }
}

/// Ranked candidate set plus the decision policy that narrows it.
///
/// Invariants held after every public mutation:
/// - `candidates` is sorted by score, descending.
/// - no candidate has a URL in `rejected_urls`.
/// - with a confirmed level, no candidate carries a different non-null level.
#[derive(Debug, Clone)]
pub struct IntelligentUnit {
    candidates: Vec<Candidate>,
    confirmed_keywords: BTreeSet<String>,
    confirmed_level: Option<String>,
    rejected_urls: BTreeSet<String>,
    history: Vec<Decision>,
    thresholds: Thresholds,
}

impl IntelligentUnit {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            candidates: Vec::new(),
            confirmed_keywords: BTreeSet::new(),
            confirmed_level: None,
            rejected_urls: BTreeSet::new(),
            history: Vec::new(),
            thresholds,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn confirmed_level(&self) -> Option<&str> {
        self.confirmed_level.as_deref()
    }

    pub fn confirmed_keywords(&self) -> &BTreeSet<String> {
        &self.confirmed_keywords
    }

    pub fn is_keyword_confirmed(&self, keyword: &str) -> bool {
        self.confirmed_keywords.contains(keyword)
    }

    pub fn is_rejected(&self, url: &str) -> bool {
        self.rejected_urls.contains(url)
    }

    pub fn history(&self) -> &[Decision] {
        &self.history
    }

    // -----------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------

    /// Merge a fresh batch into the set.
    ///
    /// Rejected URLs and level conflicts are filtered out, the batch is put
    /// in front of the existing candidates, exact duplicates are dropped
    /// keeping the first occurrence, and the result is stably re-sorted by
    /// score so ties keep their merge order.
    pub fn merge_candidates(&mut self, batch: Vec<Candidate>) {
        let mut merged: Vec<Candidate> = batch
            .into_iter()
            .filter(|c| !self.rejected_urls.contains(&c.url) && self.level_compatible(c))
            .collect();
        let incoming = merged.len();
        merged.append(&mut self.candidates);

        let mut unique: Vec<Candidate> = Vec::with_capacity(merged.len());
        for candidate in merged {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        unique.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(incoming, total = unique.len(), "Candidates merged");
        self.candidates = unique;
    }

    /// Remove every candidate with this URL and never admit it again.
    pub fn reject_url(&mut self, url: &str) {
        self.candidates.retain(|c| c.url != url);
        self.rejected_urls.insert(url.to_string());
    }

    /// Record a keyword the user agreed is part of their question.
    pub fn confirm_keyword(&mut self, keyword: &str) {
        self.confirmed_keywords.insert(keyword.to_string());
    }

    /// Drop every candidate about a keyword the user denied.
    pub fn reject_keyword(&mut self, keyword: &str) {
        self.candidates.retain(|c| !c.keywords.contains(keyword));
    }

    /// Commit a level; candidates bound to another level drop out.
    pub fn confirm_level(&mut self, level: &str) {
        self.candidates
            .retain(|c| c.level.as_deref().map_or(true, |l| l == level));
        self.confirmed_level = Some(level.to_string());
    }

    fn level_compatible(&self, candidate: &Candidate) -> bool {
        match (&self.confirmed_level, &candidate.level) {
            (Some(confirmed), Some(level)) => confirmed == level,
            _ => true,
        }
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Indices of candidates still in play.
    ///
    /// When the top score reaches `score_thresh`, anything below
    /// `max(score_thresh, score_perc * top)` drops out; otherwise every
    /// candidate stays. Because the list is sorted the result is always a
    /// prefix of it.
    pub fn contenders(&self) -> Vec<usize> {
        let Some(top) = self.candidates.first() else {
            return Vec::new();
        };
        if top.score < self.thresholds.score_thresh {
            return (0..self.candidates.len()).collect();
        }
        let cutoff = self
            .thresholds
            .score_thresh
            .max(self.thresholds.score_perc * top.score);
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.score >= cutoff)
            .map(|(i, _)| i)
            .collect()
    }

    /// The single remaining contender, if there is exactly one.
    pub fn winner(&self) -> Option<&Candidate> {
        match self.contenders().as_slice() {
            [only] => self.candidates.get(*only),
            _ => None,
        }
    }

    /// The top-scored candidate regardless of contention. Last resort only.
    pub fn top_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    // -----------------------------------------------------------------
    // Decision policy
    // -----------------------------------------------------------------

    /// Pick the next clarifying action and append it to the history.
    pub fn decide(&mut self, active_keywords: &BTreeSet<String>) -> Decision {
        let decision = self.policy(active_keywords);
        debug!(
            action = ?decision.action,
            keyword = decision.keyword.as_deref().unwrap_or(""),
            candidates = self.candidates.len(),
            "Decision made"
        );
        self.history.push(decision.clone());
        decision
    }

    fn policy(&self, active_keywords: &BTreeSet<String>) -> Decision {
        let contenders = self.contenders();

        if self.confirmed_level.is_none() && self.distinct_levels(contenders.len()) > 1 {
            return Decision::new(ActionKind::ConfirmLevel);
        }

        if !self.keyword_confirmations_exhausted() {
            if let Some(keyword) = self.choose_keyword(&contenders) {
                return Decision::confirm_keyword(keyword);
            }
        }

        if self.occurrences(&Decision::new(ActionKind::ExtendKeyword)) < self.thresholds.rep_extend
        {
            return Decision::new(ActionKind::ExtendKeyword);
        }

        if self.occurrences(&Decision::new(ActionKind::Rephrase)) == 0 {
            return Decision::new(ActionKind::Rephrase);
        }

        if self.confirmed_level.is_none() {
            return Decision::new(ActionKind::ConfirmLevel);
        }
        if let Some(keyword) = active_keywords
            .iter()
            .find(|k| !self.confirmed_keywords.contains(*k))
        {
            return Decision::confirm_keyword(keyword.clone());
        }
        Decision::new(ActionKind::OtherMeasures)
    }

    /// Number of distinct levels among the first `n` candidates.
    fn distinct_levels(&self, n: usize) -> usize {
        self.candidates[..n.min(self.candidates.len())]
            .iter()
            .map(|c| c.level.as_deref())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn occurrences(&self, decision: &Decision) -> usize {
        self.history.iter().filter(|d| *d == decision).count()
    }

    /// True once any single keyword confirmation reached `rep_confirm`.
    fn keyword_confirmations_exhausted(&self) -> bool {
        let mut counts: HashMap<&Decision, usize> = HashMap::new();
        for decision in &self.history {
            if decision.action == ActionKind::ConfirmKeyword {
                *counts.entry(decision).or_insert(0) += 1;
            }
        }
        counts.values().any(|n| *n >= self.thresholds.rep_confirm)
    }

    /// Keyword whose contender count is closest to half the contenders.
    ///
    /// Confirmed keywords and keywords shared by every contender are not
    /// eligible. Keywords are visited in contender order, then lexically;
    /// the first strict improvement wins.
    fn choose_keyword(&self, contenders: &[usize]) -> Option<String> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for &index in contenders {
            for keyword in &self.candidates[index].keywords {
                if self.confirmed_keywords.contains(keyword) {
                    continue;
                }
                match counts.iter_mut().find(|(k, _)| *k == keyword.as_str()) {
                    Some(entry) => entry.1 += 1,
                    None => counts.push((keyword.as_str(), 1)),
                }
            }
        }
        counts.retain(|(_, n)| *n != contenders.len());

        let half = (contenders.len() as f64 / 2.0).round_ties_even() as i64 - 1;
        let mut best: Option<(&str, i64)> = None;
        for (keyword, n) in counts {
            let distance = (n as i64 - half).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((keyword, distance));
            }
        }
        best.map(|(keyword, _)| keyword.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
