//! Pipeline configuration.
//!
//! One value of [`PipelineConfig`] is handed to the engine at construction
//! and cloned into every task. Defaults match the documented cadences:
//! topic updates every 5 final sentences, claim selection every 10, at most
//! 2 claims per batch, one verification pipeline start per 10 seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the live conversation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Final sentences between topic updates. Default: 5.
    pub topic_update_threshold: usize,
    /// Final sentences per claim-selection batch. Default: 10.
    pub claim_selection_batch_size: usize,
    /// Upper bound on claims enqueued per batch. Default: 2.
    pub max_claims_per_batch: usize,
    /// Minimum spacing between verification pipeline starts. Default: 10 s.
    pub fact_check_rate_limit: Duration,
    /// Topic reuse cutoff in [0, 1]; similarity exactly at the threshold
    /// counts as reuse. Default: 0.7.
    pub similarity_threshold: f32,
    /// Most recent transcript segments retained; older ones are dropped.
    /// Default: 100.
    pub transcript_buffer_len: usize,
    /// Grace period for in-flight tasks on shutdown. Default: 5 s.
    pub shutdown_grace: Duration,
    /// Web search settings shared by evidence retrieval and image enrichment.
    pub search: SearchConfig,
    /// Per-call LLM settings.
    pub llm: LlmConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic_update_threshold: 5,
            claim_selection_batch_size: 10,
            max_claims_per_batch: 2,
            fact_check_rate_limit: Duration::from_secs(10),
            similarity_threshold: 0.7,
            transcript_buffer_len: 100,
            shutdown_grace: Duration::from_secs(5),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// Web search adapter settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum results requested per query. Default: 5.
    pub max_results: usize,
    /// SafeSearch level forwarded to the provider. Default: strict.
    pub safesearch: SafeSearch,
    /// Region hint; `"worldwide"` means no regional bias. Default: worldwide.
    pub region: String,
    /// Hostname patterns whose results are discarded before verification.
    /// A pattern without a dot matches as a substring of the host; a pattern
    /// with a dot matches the host exactly or as a parent domain.
    pub url_blocklist: Vec<String>,
    /// Per-request timeout. Default: 20 s.
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            safesearch: SafeSearch::Strict,
            region: "worldwide".into(),
            url_blocklist: default_url_blocklist(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Default host patterns for the adult / gambling / piracy categories.
pub fn default_url_blocklist() -> Vec<String> {
    ["porn", "xxx", "adult", "sex", "casino", "betting", "gambling", "torrent"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// SafeSearch level, serialised lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    Moderate,
    Strict,
}

impl SafeSearch {
    /// Parse a user-supplied level, defaulting to strict for anything
    /// unrecognised.
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" => SafeSearch::Off,
            "moderate" => SafeSearch::Moderate,
            _ => SafeSearch::Strict,
        }
    }
}

/// LLM settings, one block per call type plus a shared transport timeout.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Per-request timeout. Default: 30 s.
    pub timeout: Duration,
    pub topic_extraction: LlmCallSettings,
    pub claim_selection: LlmCallSettings,
    pub query_optimization: LlmCallSettings,
    pub verification: LlmCallSettings,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            topic_extraction: LlmCallSettings::new(DEFAULT_MODEL, 0.2, 300),
            claim_selection: LlmCallSettings::new(DEFAULT_MODEL, 0.1, 400),
            query_optimization: LlmCallSettings::new(DEFAULT_MODEL, 0.1, 60),
            verification: LlmCallSettings::new(DEFAULT_MODEL, 0.0, 500),
        }
    }
}

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Model, temperature and output cap for one LLM call type.
#[derive(Debug, Clone)]
pub struct LlmCallSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmCallSettings {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens,
        }
    }
}

impl PipelineConfig {
    /// Clamp out-of-range knobs into usable territory instead of erroring.
    pub fn normalize(&mut self) {
        self.topic_update_threshold = self.topic_update_threshold.max(1);
        self.claim_selection_batch_size = self.claim_selection_batch_size.max(1);
        self.max_claims_per_batch = self.max_claims_per_batch.max(1);
        self.similarity_threshold = self.similarity_threshold.clamp(0.0, 1.0);
        self.transcript_buffer_len = self.transcript_buffer_len.max(1);
        self.search.max_results = self.search.max_results.clamp(1, 20);
        let region = self.search.region.trim();
        self.search.region = if region.is_empty() {
            "worldwide".into()
        } else {
            region.to_string()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadences() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.topic_update_threshold, 5);
        assert_eq!(cfg.claim_selection_batch_size, 10);
        assert_eq!(cfg.max_claims_per_batch, 2);
        assert_eq!(cfg.fact_check_rate_limit, Duration::from_secs(10));
        assert!((cfg.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.transcript_buffer_len, 100);
        assert_eq!(cfg.search.max_results, 5);
        assert_eq!(cfg.search.safesearch, SafeSearch::Strict);
        assert_eq!(cfg.search.region, "worldwide");
    }

    #[test]
    fn safesearch_parses_lossily() {
        assert_eq!(SafeSearch::from_str_lossy("off"), SafeSearch::Off);
        assert_eq!(SafeSearch::from_str_lossy("Moderate"), SafeSearch::Moderate);
        assert_eq!(SafeSearch::from_str_lossy("strict"), SafeSearch::Strict);
        assert_eq!(SafeSearch::from_str_lossy("garbage"), SafeSearch::Strict);
    }

    #[test]
    fn normalize_clamps_degenerate_values() {
        let mut cfg = PipelineConfig::default();
        cfg.topic_update_threshold = 0;
        cfg.similarity_threshold = 3.0;
        cfg.search.max_results = 0;
        cfg.search.region = "  ".into();
        cfg.normalize();
        assert_eq!(cfg.topic_update_threshold, 1);
        assert!((cfg.similarity_threshold - 1.0).abs() < f32::EPSILON);
        assert_eq!(cfg.search.max_results, 1);
        assert_eq!(cfg.search.region, "worldwide");
    }
}
