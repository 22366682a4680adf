//! Backend search service adapters.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clarify_core::config::BackendConfig;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::DialogError;
use crate::types::{BackendRecord, BackendRequest, Candidate};

/// Source of candidate answers.
///
/// An `Err` means the service is down; callers degrade it to an empty
/// result.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn query(&self, request: &BackendRequest) -> Result<Vec<BackendRecord>, DialogError>;
}

/// Build the backend named by the configuration.
pub fn from_config(config: &BackendConfig) -> Result<Arc<dyn SearchBackend>, DialogError> {
    match config.kind.as_str() {
        "http" => Ok(Arc::new(HttpBackend::new(
            &config.url,
            Duration::from_secs(config.timeout_secs),
            config.append_keywords_to_source,
        )?)),
        "static" => {
            let backend = match &config.corpus_path {
                Some(path) => StaticBackend::load(Path::new(path), config.max_results)?,
                None => StaticBackend::new(Vec::new(), config.max_results),
            };
            Ok(Arc::new(backend))
        }
        other => Err(DialogError::Config(format!("unknown backend kind: {other}"))),
    }
}

/// One candidate per declared level; a record without levels yields a
/// single unscoped candidate.
pub fn expand_levels(records: Vec<BackendRecord>) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(records.len());
    for record in records {
        let base = Candidate::new(record.url, record.score)
            .with_keywords(record.keywords)
            .with_answer(record.answer);
        if record.levels.is_empty() {
            candidates.push(base);
        } else {
            for level in record.levels {
                candidates.push(base.clone().with_level(level));
            }
        }
    }
    candidates
}

// =============================================================================
// HttpBackend
// =============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    #[serde(rename = "Language")]
    language: u8,
    #[serde(rename = "Type")]
    utterance_type: u8,
    #[serde(rename = "Level")]
    level: Option<&'a str>,
    #[serde(rename = "Keywords")]
    keywords: &'a BTreeSet<String>,
    #[serde(rename = "Source")]
    source: String,
}

/// Remote search service speaking JSON over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    append_keywords: bool,
}

impl HttpBackend {
    pub fn new(url: &str, timeout: Duration, append_keywords: bool) -> Result<Self, DialogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            append_keywords,
        })
    }

    fn wire_request<'a>(&self, request: &'a BackendRequest) -> WireRequest<'a> {
        let mut source = request.source_text.clone();
        // Services that only read free text still see the keywords.
        if self.append_keywords {
            for keyword in &request.keywords {
                source.push(' ');
                source.push_str(keyword);
            }
        }
        WireRequest {
            language: request.language.code(),
            utterance_type: request.utterance_type.code(),
            level: request.level.as_deref(),
            keywords: &request.keywords,
            source,
        }
    }
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn query(&self, request: &BackendRequest) -> Result<Vec<BackendRecord>, DialogError> {
        let body = self.wire_request(request);
        debug!(url = %self.url, keywords = request.keywords.len(), "Querying search service");
        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DialogError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let records: Vec<BackendRecord> = resp.json().await?;
        debug!(count = records.len(), "Search service answered");
        Ok(records)
    }
}

// =============================================================================
// StaticBackend
// =============================================================================

/// In-process corpus scored by keyword overlap.
#[derive(Debug, Clone, Default)]
pub struct StaticBackend {
    records: Vec<BackendRecord>,
    max_results: usize,
}

impl StaticBackend {
    pub fn new(records: Vec<BackendRecord>, max_results: usize) -> Self {
        Self {
            records,
            max_results,
        }
    }

    /// Load a JSON list of records in the wire shape.
    pub fn load(path: &Path, max_results: usize) -> Result<Self, DialogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DialogError::Catalog(format!("{}: {e}", path.display())))?;
        let records: Vec<BackendRecord> = serde_json::from_str(&content)?;
        info!(records = records.len(), path = %path.display(), "Static corpus loaded");
        Ok(Self::new(records, max_results))
    }

    /// Records sharing keywords with the request, best overlap first.
    pub fn search(&self, request: &BackendRequest) -> Vec<BackendRecord> {
        if request.keywords.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<BackendRecord> = self
            .records
            .iter()
            .filter_map(|record| {
                let overlap = record
                    .keywords
                    .iter()
                    .filter(|k| request.keywords.contains(k.to_lowercase().as_str()))
                    .count();
                if overlap == 0 {
                    return None;
                }
                let levels = match &request.level {
                    Some(_) if record.levels.is_empty() => Vec::new(),
                    Some(level) if record.levels.contains(level) => vec![level.clone()],
                    Some(_) => return None,
                    None => record.levels.clone(),
                };
                Some(BackendRecord {
                    score: overlap as f64 / request.keywords.len() as f64,
                    levels,
                    ..record.clone()
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.max_results);
        hits
    }
}

#[async_trait]
impl SearchBackend for StaticBackend {
    async fn query(&self, request: &BackendRequest) -> Result<Vec<BackendRecord>, DialogError> {
        Ok(self.search(request))
    }
}
