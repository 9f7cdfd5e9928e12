//! Verification worker — the single long-lived consumer of the fact queue.
//!
//! ## Per-claim pipeline
//!
//! ```text
//! Queued → Optimizing → Searching → Verifying → Reported
//!                  ↘         ↘          ↘
//!                    → Errored (terminal, logged, no FactResult)
//! ```
//!
//! The rate limit is measured from the *start* of the previous verification,
//! so long-running pipelines naturally extend the gap and no extra delay is
//! added. Errors never kill the worker; it logs, emits an `error`
//! notification and moves to the next dequeue. Results are appended in
//! strict dequeue order, which is enqueue order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::EngineShared;
use crate::error::{ColloquyError, Result};
use crate::ipc::events::{NotificationPayload, Verdict};
use crate::json;
use crate::prompts;
use crate::providers::{CompletionRequest, SearchQuery, SearchResult};
use crate::state::{ClaimReceiver, FactResult};

/// Longest optimized query, in words.
const MAX_QUERY_WORDS: usize = 8;

/// Counters for the verification worker.
#[derive(Debug, Default)]
pub struct WorkerDiagnostics {
    pub claims_dequeued: AtomicUsize,
    pub queries_optimized: AtomicUsize,
    pub query_fallbacks: AtomicUsize,
    pub searches: AtomicUsize,
    pub evidence_dropped: AtomicUsize,
    pub verifications: AtomicUsize,
    pub results_reported: AtomicUsize,
    pub claims_errored: AtomicUsize,
}

impl WorkerDiagnostics {
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            claims_dequeued: self.claims_dequeued.load(Ordering::Relaxed),
            queries_optimized: self.queries_optimized.load(Ordering::Relaxed),
            query_fallbacks: self.query_fallbacks.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            evidence_dropped: self.evidence_dropped.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
            results_reported: self.results_reported.load(Ordering::Relaxed),
            claims_errored: self.claims_errored.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSnapshot {
    pub claims_dequeued: usize,
    pub queries_optimized: usize,
    pub query_fallbacks: usize,
    pub searches: usize,
    pub evidence_dropped: usize,
    pub verifications: usize,
    pub results_reported: usize,
    pub claims_errored: usize,
}

/// Everything the worker task needs.
pub(crate) struct WorkerContext {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) claims: ClaimReceiver,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// Run the worker until shutdown is signalled or the queue closes.
pub(crate) async fn run(mut ctx: WorkerContext) {
    info!("fact worker started");
    let mut last_start: Option<Instant> = None;

    loop {
        // ── 1. Dequeue (blocking, cancellable between claims) ─────────────
        let claim = tokio::select! {
            changed = ctx.shutdown.changed() => {
                if changed.is_err() || *ctx.shutdown.borrow() {
                    break;
                }
                continue;
            }
            claim = ctx.claims.recv() => match claim {
                Some(claim) => claim,
                None => break,
            },
        };
        let diag = &ctx.shared.worker_diagnostics;
        diag.claims_dequeued.fetch_add(1, Ordering::Relaxed);

        // ── 2. Rate limit relative to the previous pipeline start ─────────
        if let Some(started) = last_start {
            let limit = ctx.shared.config.fact_check_rate_limit;
            let elapsed = started.elapsed();
            if elapsed < limit {
                let wait = limit - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate limit — delaying verification");
                tokio::select! {
                    changed = ctx.shutdown.changed() => {
                        if changed.is_err() || *ctx.shutdown.borrow() {
                            warn!(claim = %claim, "shutdown during rate-limit wait — claim dropped");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
        last_start = Some(Instant::now());

        // ── 3. Optimize → search → verify ─────────────────────────────────
        match verify_claim(&ctx.shared, &claim).await {
            Ok(result) => {
                diag.results_reported.fetch_add(1, Ordering::Relaxed);
                info!(
                    claim = %result.claim,
                    verdict = %result.verdict,
                    confidence = result.confidence,
                    sources = result.evidence_sources.len(),
                    "fact result"
                );
                ctx.shared.state.append_fact_result(result.clone());
                ctx.shared.bus.emit(NotificationPayload::FactResult {
                    claim: result.claim,
                    verdict: result.verdict,
                    confidence: result.confidence,
                    explanation: result.explanation,
                    key_facts: result.key_facts,
                    sources: result.evidence_sources,
                });
            }
            Err(err) => {
                diag.claims_errored.fetch_add(1, Ordering::Relaxed);
                warn!(claim = %claim, error = %err, "verification failed — no fact result");
                ctx.shared.emit_error(&err);
            }
        }
    }

    let snap = ctx.shared.worker_diagnostics.snapshot();
    info!(
        claims_dequeued = snap.claims_dequeued,
        results_reported = snap.results_reported,
        claims_errored = snap.claims_errored,
        "fact worker stopped"
    );
}

/// Expected shape of the verification response.
#[derive(Debug, Deserialize)]
struct VerificationResponse {
    verdict: String,
    confidence: f32,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    key_facts: Vec<String>,
}

/// Run the three-step pipeline for one claim.
async fn verify_claim(shared: &Arc<EngineShared>, claim: &str) -> Result<FactResult> {
    let diag = &shared.worker_diagnostics;

    // Query optimization is best-effort: a failed or empty rewrite falls
    // back to the truncated raw claim.
    let request = CompletionRequest::new(
        prompts::query_optimization(claim),
        &shared.config.llm.query_optimization,
    )
    .with_system(prompts::QUERY_SYSTEM);
    let query = match shared.llm.complete(request).await {
        Ok(raw) => {
            diag.queries_optimized.fetch_add(1, Ordering::Relaxed);
            sanitize_query(&raw)
        }
        Err(err) => {
            diag.query_fallbacks.fetch_add(1, Ordering::Relaxed);
            debug!(error = %err, "query optimization failed — using the raw claim");
            String::new()
        }
    };
    let query = if query.is_empty() {
        truncate_words(claim, MAX_QUERY_WORDS)
    } else {
        query
    };
    if query.is_empty() {
        return Err(ColloquyError::Parse(
            "optimized query and raw claim are both empty".into(),
        ));
    }
    debug!(claim = %claim, query = %query, "evidence query");

    let search_query = SearchQuery::new(query, &shared.config.search);
    let hits = shared.search.text_search(&search_query).await?;
    diag.searches.fetch_add(1, Ordering::Relaxed);

    let before = hits.len();
    let evidence: Vec<SearchResult> = filter_evidence(hits, &shared.config.search.url_blocklist)
        .into_iter()
        .take(shared.config.search.max_results)
        .collect();
    diag.evidence_dropped
        .fetch_add(before.saturating_sub(evidence.len()), Ordering::Relaxed);
    if evidence.is_empty() {
        debug!(claim = %claim, "no usable evidence — verifier decides");
    }

    let request = CompletionRequest::new(
        prompts::verification(claim, &evidence),
        &shared.config.llm.verification,
    )
    .with_system(prompts::VERIFY_SYSTEM);
    let raw = shared.llm.complete(request).await?;
    diag.verifications.fetch_add(1, Ordering::Relaxed);

    let response: VerificationResponse = json::decode_llm_json(&raw, "verification")?;
    let verdict = Verdict::parse_policy(&response.verdict)?;
    if !(0.0..=1.0).contains(&response.confidence) {
        return Err(ColloquyError::Policy(format!(
            "confidence {} outside [0, 1]",
            response.confidence
        )));
    }

    Ok(FactResult {
        claim: claim.to_string(),
        verdict,
        confidence: response.confidence,
        explanation: response.explanation,
        key_facts: response.key_facts,
        evidence_sources: evidence.into_iter().map(|hit| hit.url).collect(),
        timestamp: Utc::now(),
    })
}

/// Clean an optimized query: strip fences and quotes, cap the word count.
fn sanitize_query(raw: &str) -> String {
    let stripped = json::strip_code_fences(raw);
    truncate_words(stripped.trim().trim_matches('"').trim(), MAX_QUERY_WORDS)
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop hits whose host matches the blocklist. Unparseable URLs are dropped
/// too — they cannot be cited as evidence sources.
fn filter_evidence(hits: Vec<SearchResult>, blocklist: &[String]) -> Vec<SearchResult> {
    hits.into_iter()
        .filter(|hit| !host_blocked(&hit.url, blocklist))
        .collect()
}

fn host_blocked(url: &str, blocklist: &[String]) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return true;
    };
    let Some(host) = parsed.host_str() else {
        return true;
    };
    let host = host.to_ascii_lowercase();
    blocklist.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern.is_empty() {
            false
        } else if pattern.contains('.') {
            host == pattern || host.ends_with(&format!(".{pattern}"))
        } else {
            host.contains(&pattern)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::providers::stub::{ScriptedLlm, ScriptedSearch};

    fn hit(url: &str) -> SearchResult {
        SearchResult {
            title: "t".into(),
            snippet: "s".into(),
            url: url.into(),
        }
    }

    #[test]
    fn sanitize_query_strips_quotes_and_caps_words() {
        assert_eq!(sanitize_query("\"moon landing 1969 date\""), "moon landing 1969 date");
        assert_eq!(
            sanitize_query("one two three four five six seven eight nine ten"),
            "one two three four five six seven eight"
        );
        assert_eq!(sanitize_query("```\nboiling point water\n```"), "boiling point water");
    }

    #[test]
    fn keyword_patterns_match_anywhere_in_the_host() {
        let blocklist = vec!["casino".to_string()];
        assert!(host_blocked("https://grand-casino.example.com/page", &blocklist));
        assert!(!host_blocked("https://encyclopedia.example.com/casino-history", &blocklist));
    }

    #[test]
    fn domain_patterns_match_exact_and_subdomains_only() {
        let blocklist = vec!["bad.example".to_string()];
        assert!(host_blocked("https://bad.example/a", &blocklist));
        assert!(host_blocked("https://www.bad.example/a", &blocklist));
        assert!(!host_blocked("https://notbad.example/a", &blocklist));
        assert!(!host_blocked("https://bad.example.org/a", &blocklist));
    }

    #[test]
    fn unparseable_urls_are_dropped() {
        assert!(host_blocked("not a url", &[]));
        let kept = filter_evidence(vec![hit("https://ok.example/a"), hit("::::")], &[]);
        assert_eq!(kept.len(), 1);
    }

    fn shared_with(llm: ScriptedLlm, search: ScriptedSearch) -> Arc<EngineShared> {
        EngineShared::for_tests(PipelineConfig::default(), Arc::new(llm), Arc::new(search))
    }

    #[tokio::test]
    async fn happy_path_produces_a_supported_result_with_sources() {
        let llm = ScriptedLlm::new();
        llm.push_query_response("moon landing 1969");
        llm.push_verification_response(
            r#"{"verdict": "SUPPORTED", "confidence": 0.95,
                "explanation": "Apollo 11 landed in July 1969.",
                "key_facts": ["Apollo 11", "July 20 1969"]}"#,
        );
        let search = ScriptedSearch::new();
        search.set_results(vec![hit("https://history.example/apollo")]);
        let shared = shared_with(llm, search);

        let result = verify_claim(&shared, "The Moon landing occurred in 1969")
            .await
            .unwrap();
        assert_eq!(result.verdict, Verdict::Supported);
        assert_eq!(result.evidence_sources, vec!["https://history.example/apollo"]);
        assert_eq!(result.key_facts.len(), 2);
    }

    #[tokio::test]
    async fn out_of_set_verdict_is_a_policy_error() {
        let llm = ScriptedLlm::new();
        llm.push_query_response("q");
        llm.push_verification_response(r#"{"verdict": "MAYBE", "confidence": 0.5}"#);
        let shared = shared_with(llm, ScriptedSearch::new());

        let err = verify_claim(&shared, "some claim").await.unwrap_err();
        assert_eq!(err.kind(), "policy");
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_a_policy_error() {
        let llm = ScriptedLlm::new();
        llm.push_query_response("q");
        llm.push_verification_response(r#"{"verdict": "SUPPORTED", "confidence": 1.4}"#);
        let shared = shared_with(llm, ScriptedSearch::new());

        let err = verify_claim(&shared, "some claim").await.unwrap_err();
        assert_eq!(err.kind(), "policy");
    }

    #[tokio::test]
    async fn blocked_evidence_is_not_cited() {
        let llm = ScriptedLlm::new();
        llm.push_query_response("q");
        llm.push_verification_response(r#"{"verdict": "UNCERTAIN", "confidence": 0.4}"#);
        let search = ScriptedSearch::new();
        search.set_results(vec![
            hit("https://casino-tips.example/claim"),
            hit("https://reference.example/claim"),
        ]);
        let mut config = PipelineConfig::default();
        config.search.url_blocklist = vec!["casino".into()];
        let shared = EngineShared::for_tests(config, Arc::new(llm), Arc::new(search));

        let result = verify_claim(&shared, "some claim").await.unwrap();
        assert_eq!(result.evidence_sources, vec!["https://reference.example/claim"]);
        assert_eq!(
            shared.worker_diagnostics.snapshot().evidence_dropped,
            1
        );
    }
}
