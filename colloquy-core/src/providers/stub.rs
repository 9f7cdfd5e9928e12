//! Scripted stub providers — run the full pipeline with no network.
//!
//! `ScriptedLlm` routes each request on its system prompt (every call type
//! carries a distinct one, see [`crate::prompts`]) and answers from a queue
//! of canned responses, falling back to a deterministic echo-style answer
//! when the queue is empty. Used by the app's offline mode and by the
//! integration tests to drive exact scenarios.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::prompts;
use crate::providers::{
    CompletionRequest, ImageResult, LanguageModel, SearchProvider, SearchQuery, SearchResult,
};

/// Which of the four call types a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Topic,
    Selection,
    Query,
    Verification,
}

fn classify(request: &CompletionRequest) -> CallKind {
    match request.system.as_deref() {
        Some(prompts::TOPIC_SYSTEM) => CallKind::Topic,
        Some(prompts::SELECTION_SYSTEM) => CallKind::Selection,
        Some(prompts::QUERY_SYSTEM) => CallKind::Query,
        _ => CallKind::Verification,
    }
}

/// Deterministic scripted language model.
#[derive(Default)]
pub struct ScriptedLlm {
    topic_responses: Mutex<VecDeque<String>>,
    selection_responses: Mutex<VecDeque<String>>,
    query_responses: Mutex<VecDeque<String>>,
    verification_responses: Mutex<VecDeque<String>>,
    topic_calls: AtomicUsize,
    selection_calls: AtomicUsize,
    query_calls: AtomicUsize,
    verification_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_topic_response(&self, raw: impl Into<String>) {
        self.topic_responses.lock().push_back(raw.into());
    }

    pub fn push_selection_response(&self, raw: impl Into<String>) {
        self.selection_responses.lock().push_back(raw.into());
    }

    pub fn push_query_response(&self, raw: impl Into<String>) {
        self.query_responses.lock().push_back(raw.into());
    }

    pub fn push_verification_response(&self, raw: impl Into<String>) {
        self.verification_responses.lock().push_back(raw.into());
    }

    pub fn topic_calls(&self) -> usize {
        self.topic_calls.load(Ordering::Relaxed)
    }

    pub fn selection_calls(&self) -> usize {
        self.selection_calls.load(Ordering::Relaxed)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::Relaxed)
    }

    pub fn verification_calls(&self) -> usize {
        self.verification_calls.load(Ordering::Relaxed)
    }

    /// Echo-style fallback when no canned response is queued.
    fn default_response(kind: CallKind, prompt: &str) -> String {
        match kind {
            CallKind::Topic => {
                let excerpt = prompt.rsplit("Excerpt:\n").next().unwrap_or(prompt);
                let topic = title_case_words(excerpt, 3);
                let topic = if topic.is_empty() { "General Discussion".into() } else { topic };
                format!("{{\"topic\": \"{topic}\", \"keywords\": []}}")
            }
            CallKind::Selection => "{\"selected_claims\": []}".into(),
            CallKind::Query => {
                let claim = prompt.rsplit("Claim: ").next().unwrap_or(prompt);
                claim.split_whitespace().take(8).collect::<Vec<_>>().join(" ")
            }
            CallKind::Verification => {
                "{\"verdict\": \"UNCERTAIN\", \"confidence\": 0.5, \
\"explanation\": \"Scripted provider: no external evidence consulted.\", \
\"key_facts\": []}"
                    .into()
            }
        }
    }
}

fn title_case_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .take(max_words)
        .map(|word| {
            let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            let mut chars = cleaned.chars();
            match chars.next() {
                Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
                None => cleaned,
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let kind = classify(&request);
        let (queue, counter) = match kind {
            CallKind::Topic => (&self.topic_responses, &self.topic_calls),
            CallKind::Selection => (&self.selection_responses, &self.selection_calls),
            CallKind::Query => (&self.query_responses, &self.query_calls),
            CallKind::Verification => (&self.verification_responses, &self.verification_calls),
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let response = queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Self::default_response(kind, &request.prompt));
        debug!(?kind, response_chars = response.len(), "scripted LLM response");
        Ok(response)
    }
}

/// Deterministic scripted search provider.
#[derive(Default)]
pub struct ScriptedSearch {
    results: Mutex<Vec<SearchResult>>,
    images: Mutex<Vec<ImageResult>>,
    image_delay: Mutex<Option<Duration>>,
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_results(&self, results: Vec<SearchResult>) {
        *self.results.lock() = results;
    }

    pub fn set_images(&self, images: Vec<ImageResult>) {
        *self.images.lock() = images;
    }

    /// Delay applied to image searches only — used to prove image
    /// enrichment never blocks topic updates.
    pub fn set_image_delay(&self, delay: Duration) {
        *self.image_delay.lock() = Some(delay);
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::Relaxed)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn text_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.text_calls.fetch_add(1, Ordering::Relaxed);
        let configured = self.results.lock().clone();
        let results = if configured.is_empty() {
            vec![SearchResult {
                title: format!("About: {}", query.query),
                snippet: format!("Scripted result for \"{}\".", query.query),
                url: "https://example.org/scripted".into(),
            }]
        } else {
            configured
        };
        Ok(results.into_iter().take(query.max_results).collect())
    }

    async fn image_search(&self, query: &SearchQuery) -> Result<Vec<ImageResult>> {
        self.image_calls.fetch_add(1, Ordering::Relaxed);
        let delay = *self.image_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let configured = self.images.lock().clone();
        let images = if configured.is_empty() {
            vec![ImageResult {
                image_url: format!(
                    "https://img.example.org/{}.png",
                    query.query.to_ascii_lowercase().replace(' ', "-")
                ),
                title: Some(query.query.clone()),
                source_url: None,
            }]
        } else {
            configured
        };
        Ok(images.into_iter().take(query.max_results).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    fn request(system: &str, prompt: &str) -> CompletionRequest {
        let llm = LlmConfig::default();
        CompletionRequest::new(prompt, &llm.topic_extraction).with_system(system)
    }

    #[tokio::test]
    async fn routes_on_system_prompt_and_pops_in_order() {
        let llm = ScriptedLlm::new();
        llm.push_topic_response("{\"topic\": \"Solar Energy\", \"keywords\": []}");
        llm.push_verification_response("{\"verdict\": \"SUPPORTED\", \"confidence\": 0.9}");

        let topic = llm
            .complete(request(prompts::TOPIC_SYSTEM, "Excerpt:\nsolar panels"))
            .await
            .unwrap();
        assert!(topic.contains("Solar Energy"));
        assert_eq!(llm.topic_calls(), 1);

        let verdict = llm
            .complete(request(prompts::VERIFY_SYSTEM, "Claim to verify:\nx"))
            .await
            .unwrap();
        assert!(verdict.contains("SUPPORTED"));
        assert_eq!(llm.verification_calls(), 1);
    }

    #[tokio::test]
    async fn topic_fallback_echoes_the_excerpt() {
        let llm = ScriptedLlm::new();
        let raw = llm
            .complete(request(
                prompts::TOPIC_SYSTEM,
                "Identify…\n\nExcerpt:\nthe tides are driven by the moon",
            ))
            .await
            .unwrap();
        assert!(raw.contains("\"topic\": \"The Tides Are\""), "got: {raw}");
    }

    #[tokio::test]
    async fn selection_fallback_selects_nothing() {
        let llm = ScriptedLlm::new();
        let raw = llm
            .complete(request(prompts::SELECTION_SYSTEM, "Transcript:\nhello"))
            .await
            .unwrap();
        assert_eq!(raw, "{\"selected_claims\": []}");
    }

    #[tokio::test]
    async fn scripted_search_respects_max_results() {
        let search = ScriptedSearch::new();
        search.set_results(vec![
            SearchResult { title: "a".into(), snippet: String::new(), url: "https://a".into() },
            SearchResult { title: "b".into(), snippet: String::new(), url: "https://b".into() },
            SearchResult { title: "c".into(), snippet: String::new(), url: "https://c".into() },
        ]);
        let query = SearchQuery {
            query: "q".into(),
            max_results: 2,
            safesearch: crate::config::SafeSearch::Strict,
            region: "worldwide".into(),
        };
        let hits = search.text_search(&query).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(search.text_calls(), 1);
    }
}
