//! The state core — single owner of all shared mutable conversation data.
//!
//! Every task holds an `Arc<ConversationState>` and goes through the named
//! operations below; there is no other path to the data. All mutations are
//! serialised behind one `parking_lot::Mutex`, so concurrent callers observe
//! a total order and readers always see a consistent
//! `(current, path, graph)` triple. Reads return cloned snapshots.
//!
//! The fact queue is the one handoff that is not snapshot-shaped: the state
//! owns the sender half and a depth counter; the receiver half is taken by
//! the verification worker at engine start.

pub mod topics;

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::PipelineConfig;
use crate::error::{ColloquyError, Result};
use crate::ipc::events::Verdict;
use topics::{TopicGraph, TopicGraphExport, TopicNode};

/// One finalized transcript entry. Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// One verified claim, with the evidence that survived filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactResult {
    pub claim: String,
    pub verdict: Verdict,
    pub confidence: f32,
    pub explanation: String,
    pub key_facts: Vec<String>,
    pub evidence_sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStats {
    /// Segments appended since construction (including ones since dropped
    /// from the bounded buffer).
    pub segments_total: u64,
    /// Segments currently retained in the buffer.
    pub transcript_len: usize,
    pub batch_len: usize,
    pub queue_depth: usize,
    pub topics_total: usize,
    pub transitions_total: usize,
    pub facts_total: usize,
}

/// The §6 export artifact: DAG + path + images + metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    #[serde(flatten)]
    pub topics: TopicGraphExport,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub generated_at: DateTime<Utc>,
    pub topics_total: usize,
    pub transitions_total: usize,
    pub facts_total: usize,
}

/// Consumer half of the fact queue. Held only by the verification worker.
pub struct ClaimReceiver {
    rx: mpsc::UnboundedReceiver<String>,
    depth: Arc<AtomicUsize>,
}

impl ClaimReceiver {
    /// Wait for the next claim. Returns `None` when the state core's sender
    /// is gone (engine torn down).
    pub async fn recv(&mut self) -> Option<String> {
        let claim = self.rx.recv().await;
        if claim.is_some() {
            // Saturating decrement — the counter may have been reset to zero
            // by a channel reset while this receiver was mid-flight.
            let _ = self
                .depth
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                    d.checked_sub(1)
                });
        }
        claim
    }
}

struct StateInner {
    transcript: VecDeque<TranscriptSegment>,
    segments_total: u64,
    batch: Vec<String>,
    topic_window: Vec<String>,
    topics: TopicGraph,
    facts: Vec<FactResult>,
    last_segment_ts: Option<DateTime<Utc>>,
    last_topic_ts: Option<DateTime<Utc>>,
    last_fact_ts: Option<DateTime<Utc>>,
}

/// The single authoritative conversation model.
pub struct ConversationState {
    inner: Mutex<StateInner>,
    transcript_cap: usize,
    batch_cap: usize,
    claim_tx: Mutex<mpsc::UnboundedSender<String>>,
    queue_depth: Arc<AtomicUsize>,
}

impl ConversationState {
    pub fn new(config: &PipelineConfig) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            inner: Mutex::new(StateInner {
                transcript: VecDeque::with_capacity(config.transcript_buffer_len),
                segments_total: 0,
                batch: Vec::with_capacity(config.claim_selection_batch_size),
                topic_window: Vec::with_capacity(config.topic_update_threshold),
                topics: TopicGraph::default(),
                facts: Vec::new(),
                last_segment_ts: None,
                last_topic_ts: None,
                last_fact_ts: None,
            }),
            transcript_cap: config.transcript_buffer_len.max(1),
            batch_cap: config.claim_selection_batch_size.max(1),
            claim_tx: Mutex::new(tx),
            queue_depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    // ── Transcript ───────────────────────────────────────────────────────

    /// Append a finalized segment, dropping the oldest beyond the cap.
    pub fn append_segment(&self, mut segment: TranscriptSegment) {
        let mut inner = self.inner.lock();
        segment.timestamp = clamp_monotonic(segment.timestamp, &mut inner.last_segment_ts);
        if inner.transcript.len() == self.transcript_cap {
            inner.transcript.pop_front();
        }
        inner.transcript.push_back(segment);
        inner.segments_total += 1;
    }

    /// Snapshot of the retained transcript, oldest first.
    pub fn transcript(&self) -> Vec<TranscriptSegment> {
        self.inner.lock().transcript.iter().cloned().collect()
    }

    // ── Sentence batch & topic window ────────────────────────────────────

    /// Append to the claim-selection batch. Returns `(new_len, at_capacity)`;
    /// the caller must drain when `at_capacity` is true, which keeps the
    /// batch length bounded by the batch size.
    pub fn append_sentence_to_batch(&self, text: &str) -> (usize, bool) {
        let mut inner = self.inner.lock();
        inner.batch.push(text.to_string());
        let len = inner.batch.len();
        (len, len >= self.batch_cap)
    }

    /// Atomically take the batch, leaving it empty.
    pub fn drain_batch(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().batch)
    }

    /// Append to the topic window. Returns the new window length.
    pub fn push_topic_sentence(&self, text: &str) -> usize {
        let mut inner = self.inner.lock();
        inner.topic_window.push(text.to_string());
        inner.topic_window.len()
    }

    /// Atomically take the topic window, leaving it empty.
    pub fn drain_topic_window(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().topic_window)
    }

    // ── Fact queue ───────────────────────────────────────────────────────

    /// Enqueue a claim for verification. Returns the queue depth after the
    /// enqueue (surfaced as `queue_size` in notifications).
    pub fn enqueue_claim(&self, claim: &str) -> Result<usize> {
        self.claim_tx
            .lock()
            .send(claim.to_string())
            .map_err(|_| ColloquyError::ChannelClosed("fact queue"))?;
        Ok(self.queue_depth.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Replace the fact queue with a fresh, empty one and hand out the
    /// receiver half. Called once per engine start; claims enqueued before
    /// the reset are discarded.
    pub fn reset_claim_channel(&self) -> ClaimReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.claim_tx.lock() = tx;
        self.queue_depth.store(0, Ordering::Relaxed);
        ClaimReceiver {
            rx,
            depth: Arc::clone(&self.queue_depth),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    // ── Topics ───────────────────────────────────────────────────────────

    /// Create a new topic node. Returns `(id, total_topics)`.
    pub fn add_topic_node(
        &self,
        topic_text: impl Into<String>,
        keywords: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> (u64, usize) {
        let mut inner = self.inner.lock();
        let timestamp = clamp_monotonic(timestamp, &mut inner.last_topic_ts);
        let id = inner.topics.add_node(topic_text.into(), keywords, timestamp);
        (id, inner.topics.node_count())
    }

    /// Return to an existing topic. Yields the updated node snapshot.
    pub fn switch_to_topic(&self, id: u64) -> Result<TopicNode> {
        let mut inner = self.inner.lock();
        inner.topics.switch_to(id)?;
        Ok(inner
            .topics
            .node(id)
            .cloned()
            .expect("switch_to verified existence"))
    }

    /// Record an image-resolution attempt. Idempotent per `(topic_id, url)`.
    pub fn record_topic_image(&self, topic_id: u64, url: Option<String>) -> Result<()> {
        self.inner.lock().topics.record_image(topic_id, url)
    }

    /// Snapshot of all topic nodes in creation order.
    pub fn topic_nodes(&self) -> Vec<TopicNode> {
        self.inner.lock().topics.nodes().cloned().collect()
    }

    pub fn current_topic_id(&self) -> Option<u64> {
        self.inner.lock().topics.current()
    }

    // ── Fact results ─────────────────────────────────────────────────────

    pub fn append_fact_result(&self, mut result: FactResult) {
        let mut inner = self.inner.lock();
        result.timestamp = clamp_monotonic(result.timestamp, &mut inner.last_fact_ts);
        inner.facts.push(result);
    }

    pub fn fact_results(&self) -> Vec<FactResult> {
        self.inner.lock().facts.clone()
    }

    // ── Observability & export ───────────────────────────────────────────

    pub fn get_stats(&self) -> StateStats {
        let inner = self.inner.lock();
        StateStats {
            segments_total: inner.segments_total,
            transcript_len: inner.transcript.len(),
            batch_len: inner.batch.len(),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            topics_total: inner.topics.node_count(),
            transitions_total: inner.topics.transition_count(),
            facts_total: inner.facts.len(),
        }
    }

    pub fn snapshot_for_export(&self) -> ExportSnapshot {
        let inner = self.inner.lock();
        ExportSnapshot {
            topics: inner.topics.export(),
            metadata: ExportMetadata {
                generated_at: Utc::now(),
                topics_total: inner.topics.node_count(),
                transitions_total: inner.topics.transition_count(),
                facts_total: inner.facts.len(),
            },
        }
    }
}

/// Clamp a timestamp so each entity family is monotonically non-decreasing
/// even if the wall clock steps backwards.
fn clamp_monotonic(ts: DateTime<Utc>, last: &mut Option<DateTime<Utc>>) -> DateTime<Utc> {
    let clamped = match *last {
        Some(prev) if ts < prev => prev,
        _ => ts,
    };
    *last = Some(clamped);
    clamped
}
