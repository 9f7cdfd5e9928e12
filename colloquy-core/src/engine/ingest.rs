//! Transcript ingest loop.
//!
//! ## Per-event flow (finals only; partials are forwarded and dropped)
//!
//! ```text
//! 1. Append a TranscriptSegment to the bounded buffer
//! 2. Append the sentence to the claim-selection batch
//! 3. Append the sentence to the topic window
//! 4. window ≥ topic_update_threshold  → drain window, spawn topic task
//! 5. batch  ≥ claim_selection_batch   → drain batch, spawn selection task
//! ```
//!
//! The loop performs only cheap state mutations and task dispatch — it never
//! awaits an external service, so a slow provider cannot stall the stream.
//! Spawned task failures are logged by the tasks themselves; the triggering
//! mutations are never rolled back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::engine::EngineShared;
use crate::facts;
use crate::ipc::events::{NotificationPayload, TranscriptUpdate};
use crate::state::TranscriptSegment;
use crate::topics;

/// Counters across ingest and the trigger tasks it dispatches.
#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub events_in: AtomicUsize,
    pub partials: AtomicUsize,
    pub finals: AtomicUsize,
    pub topic_triggers: AtomicUsize,
    pub selection_triggers: AtomicUsize,
    pub topics_created: AtomicUsize,
    pub topic_reuses: AtomicUsize,
    pub claims_enqueued: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            events_in: self.events_in.load(Ordering::Relaxed),
            partials: self.partials.load(Ordering::Relaxed),
            finals: self.finals.load(Ordering::Relaxed),
            topic_triggers: self.topic_triggers.load(Ordering::Relaxed),
            selection_triggers: self.selection_triggers.load(Ordering::Relaxed),
            topics_created: self.topics_created.load(Ordering::Relaxed),
            topic_reuses: self.topic_reuses.load(Ordering::Relaxed),
            claims_enqueued: self.claims_enqueued.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub events_in: usize,
    pub partials: usize,
    pub finals: usize,
    pub topic_triggers: usize,
    pub selection_triggers: usize,
    pub topics_created: usize,
    pub topic_reuses: usize,
    pub claims_enqueued: usize,
}

/// Everything the ingest task needs.
pub(crate) struct IngestContext {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) events: mpsc::UnboundedReceiver<TranscriptUpdate>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// Run the ingest loop until shutdown is signalled or the event stream ends.
pub(crate) async fn run(mut ctx: IngestContext) {
    info!("ingest loop started");

    loop {
        tokio::select! {
            changed = ctx.shutdown.changed() => {
                if changed.is_err() || *ctx.shutdown.borrow() {
                    break;
                }
            }
            event = ctx.events.recv() => match event {
                Some(update) => handle_update(&ctx.shared, update),
                None => break,
            }
        }
    }

    let snap = ctx.shared.diagnostics.snapshot();
    info!(
        events_in = snap.events_in,
        finals = snap.finals,
        topic_triggers = snap.topic_triggers,
        selection_triggers = snap.selection_triggers,
        "ingest loop stopped"
    );
}

/// Process one upstream event. Cheap and synchronous.
fn handle_update(shared: &Arc<EngineShared>, update: TranscriptUpdate) {
    let diagnostics = &shared.diagnostics;
    diagnostics.events_in.fetch_add(1, Ordering::Relaxed);

    shared.bus.emit(NotificationPayload::Transcript {
        text: update.text.clone(),
        is_final: update.is_final,
        confidence: update.confidence,
    });

    if !update.is_final {
        diagnostics.partials.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let text = update.text.trim();
    if text.is_empty() {
        debug!("empty final sentence ignored");
        return;
    }
    diagnostics.finals.fetch_add(1, Ordering::Relaxed);

    shared.state.append_segment(TranscriptSegment {
        text: text.to_string(),
        is_final: true,
        confidence: update.confidence.clamp(0.0, 1.0),
        timestamp: update.received_at,
    });

    let (_, batch_at_capacity) = shared.state.append_sentence_to_batch(text);
    let window_len = shared.state.push_topic_sentence(text);

    if window_len >= shared.config.topic_update_threshold {
        let window = shared.state.drain_topic_window();
        diagnostics.topic_triggers.fetch_add(1, Ordering::Relaxed);
        debug!(window_len = window.len(), "dispatching topic update");
        let task_shared = Arc::clone(shared);
        shared.track(tokio::spawn(async move {
            topics::run_topic_update(task_shared, window).await;
        }));
    }

    if batch_at_capacity {
        let batch = shared.state.drain_batch();
        diagnostics.selection_triggers.fetch_add(1, Ordering::Relaxed);
        debug!(batch_len = batch.len(), "dispatching claim selection");
        let task_shared = Arc::clone(shared);
        shared.track(tokio::spawn(async move {
            facts::run_claim_selection(task_shared, batch).await;
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::providers::stub::{ScriptedLlm, ScriptedSearch};

    fn shared_with(config: PipelineConfig) -> Arc<EngineShared> {
        EngineShared::for_tests(
            config,
            Arc::new(ScriptedLlm::new()),
            Arc::new(ScriptedSearch::new()),
        )
    }

    #[tokio::test]
    async fn partials_are_forwarded_but_advance_nothing() {
        let shared = shared_with(PipelineConfig::default());
        let mut rx = shared.bus.subscribe();

        handle_update(&shared, TranscriptUpdate::partial("hel", 0.4));
        handle_update(&shared, TranscriptUpdate::partial("hello", 0.6));

        let snap = shared.diagnostics.snapshot();
        assert_eq!(snap.events_in, 2);
        assert_eq!(snap.partials, 2);
        assert_eq!(snap.finals, 0);
        assert_eq!(snap.topic_triggers, 0);
        assert_eq!(shared.state.get_stats().segments_total, 0);
        assert_eq!(shared.state.get_stats().batch_len, 0);

        // But both were forwarded to observers.
        for _ in 0..2 {
            let notification = rx.recv().await.unwrap();
            assert!(matches!(
                notification.payload,
                NotificationPayload::Transcript { is_final: false, .. }
            ));
        }
    }

    #[tokio::test]
    async fn empty_final_sentences_are_ignored() {
        let shared = shared_with(PipelineConfig::default());
        handle_update(&shared, TranscriptUpdate::final_sentence("   "));
        assert_eq!(shared.diagnostics.snapshot().finals, 0);
        assert_eq!(shared.state.get_stats().segments_total, 0);
    }

    #[tokio::test]
    async fn finals_advance_batch_and_window() {
        let mut config = PipelineConfig::default();
        config.topic_update_threshold = 100;
        config.claim_selection_batch_size = 100;
        let shared = shared_with(config);

        handle_update(&shared, TranscriptUpdate::final_sentence("one"));
        handle_update(&shared, TranscriptUpdate::final_sentence("two"));

        let stats = shared.state.get_stats();
        assert_eq!(stats.segments_total, 2);
        assert_eq!(stats.batch_len, 2);
        assert_eq!(shared.diagnostics.snapshot().finals, 2);
    }

    #[tokio::test]
    async fn thresholds_trigger_exactly_once_per_crossing() {
        let mut config = PipelineConfig::default();
        config.topic_update_threshold = 3;
        config.claim_selection_batch_size = 5;
        let shared = shared_with(config);

        for i in 0..15 {
            handle_update(&shared, TranscriptUpdate::final_sentence(format!("s{i}")));
        }

        let snap = shared.diagnostics.snapshot();
        assert_eq!(snap.topic_triggers, 5);
        assert_eq!(snap.selection_triggers, 3);
        // Both accumulators are empty right after their final drains.
        let stats = shared.state.get_stats();
        assert_eq!(stats.batch_len, 0);
    }
}
