//! Topic engine: extraction, reuse detection, image enrichment.
//!
//! ## Per-trigger flow
//!
//! ```text
//! window of recent finals
//!     │  LLM topic extraction → {topic, keywords[]}
//!     │  (malformed / empty → log, no state mutation)
//!     ▼
//! reuse? best sim(topic, existing) ≥ threshold
//!     ├─ yes → switch_to_topic (no edge)
//!     └─ no  → add_topic_node (edge from previous current)
//!                 └─ fire-and-forget image enrichment
//! ```
//!
//! Ties in similarity go to the lowest topic id (earliest creation).
//! Image lookup never blocks topic creation and never fails the update.

pub mod similarity;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::engine::EngineShared;
use crate::error::escalate_invariant;
use crate::ipc::events::NotificationPayload;
use crate::json;
use crate::prompts;
use crate::providers::{CompletionRequest, SearchQuery};

/// Expected shape of the topic-extraction response.
#[derive(Debug, Deserialize)]
struct TopicExtraction {
    topic: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// One topic-update task: owns one LLM call, optionally spawns one image task.
pub(crate) async fn run_topic_update(shared: Arc<EngineShared>, window: Vec<String>) {
    let window_text = window.join(" ");
    let request = CompletionRequest::new(
        prompts::topic_extraction(&window_text),
        &shared.config.llm.topic_extraction,
    )
    .with_system(prompts::TOPIC_SYSTEM);

    let raw = match shared.llm.complete(request).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "topic extraction call failed");
            shared.emit_error(&err);
            return;
        }
    };

    let extraction: TopicExtraction = match json::decode_llm_json(&raw, "topic extraction") {
        Ok(extraction) => extraction,
        Err(err) => {
            warn!(error = %err, "topic extraction returned unusable JSON");
            shared.emit_error(&err);
            return;
        }
    };

    let topic = extraction.topic.trim().to_string();
    if topic.is_empty() {
        warn!("topic extraction returned an empty topic — skipping update");
        return;
    }
    let keywords: Vec<String> = extraction
        .keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .take(5)
        .collect();

    // Reuse detection. Nodes iterate in id order, and only a strictly better
    // score displaces the candidate, so ties resolve to the earliest topic.
    let nodes = shared.state.topic_nodes();
    let mut best: Option<(u64, f32)> = None;
    for node in &nodes {
        let score = shared.similarity.score(&topic, &node.topic_text);
        if score >= shared.config.similarity_threshold
            && best.map_or(true, |(_, best_score)| score > best_score)
        {
            best = Some((node.id, score));
        }
    }

    if let Some((id, score)) = best {
        match shared.state.switch_to_topic(id) {
            Ok(node) => {
                shared.diagnostics.topic_reuses.fetch_add(1, Ordering::Relaxed);
                info!(
                    topic_id = id,
                    score = format_args!("{score:.3}"),
                    topic = %node.topic_text,
                    "returning to existing topic"
                );
                shared.bus.emit(NotificationPayload::TopicUpdate {
                    topic_id: id,
                    topic: node.topic_text,
                    keywords: node.keywords,
                    is_new: false,
                    image_url: node.image_url,
                    total_topics: nodes.len(),
                });
            }
            Err(err) => {
                escalate_invariant(&err);
                shared.emit_error(&err);
            }
        }
        return;
    }

    let (id, total_topics) = shared
        .state
        .add_topic_node(topic.clone(), keywords.clone(), Utc::now());
    shared.diagnostics.topics_created.fetch_add(1, Ordering::Relaxed);
    info!(topic_id = id, topic = %topic, total_topics, "new topic created");
    shared.bus.emit(NotificationPayload::TopicUpdate {
        topic_id: id,
        topic: topic.clone(),
        keywords: keywords.clone(),
        is_new: true,
        image_url: None,
        total_topics,
    });

    let image_shared = Arc::clone(&shared);
    let handle = tokio::spawn(async move {
        enrich_topic_image(image_shared, id, topic, keywords).await;
    });
    shared.track(handle);
}

/// Resolve one image for a freshly created topic. Failures degrade to a
/// recorded `None`; they never surface to the topic update.
async fn enrich_topic_image(shared: Arc<EngineShared>, topic_id: u64, topic: String, keywords: Vec<String>) {
    let mut query = topic;
    for keyword in keywords.iter().take(3) {
        query.push(' ');
        query.push_str(keyword);
    }

    let search_query = SearchQuery::new(query, &shared.config.search);
    let url = match shared.search.image_search(&search_query).await {
        Ok(hits) => hits.into_iter().map(|hit| hit.image_url).find(|u| !u.is_empty()),
        Err(err) => {
            debug!(topic_id, error = %err, "image search failed — recording no image");
            None
        }
    };

    debug!(topic_id, found = url.is_some(), "topic image resolved");
    if let Err(err) = shared.state.record_topic_image(topic_id, url) {
        escalate_invariant(&err);
    }
}
