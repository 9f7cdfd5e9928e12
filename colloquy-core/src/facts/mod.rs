//! Fact engine: batched claim selection + the rate-limited verification
//! worker (see [`worker`]).

pub mod worker;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::EngineShared;
use crate::ipc::events::NotificationPayload;
use crate::json;
use crate::prompts;
use crate::providers::CompletionRequest;

/// Expected shape of the claim-selection response.
#[derive(Debug, Deserialize)]
struct ClaimSelection {
    #[serde(default)]
    selected_claims: Vec<SelectedClaim>,
}

#[derive(Debug, Deserialize)]
struct SelectedClaim {
    claim: String,
    #[serde(default)]
    reason: String,
}

/// One claim-selection task: owns one LLM call and zero-or-more enqueues.
///
/// An empty selection is a valid outcome, not an error. Any failure is
/// logged and surfaced as an `error` notification; the drained batch is not
/// restored (freshness over completeness).
pub(crate) async fn run_claim_selection(shared: Arc<EngineShared>, batch: Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let batch_len = batch.len();
    let paragraph = batch.join(" ");
    let max_claims = shared.config.max_claims_per_batch;

    let request = CompletionRequest::new(
        prompts::claim_selection(&paragraph, max_claims),
        &shared.config.llm.claim_selection,
    )
    .with_system(prompts::SELECTION_SYSTEM);

    let raw = match shared.llm.complete(request).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, batch_len, "claim selection call failed");
            shared.emit_error(&err);
            return;
        }
    };

    let selection: ClaimSelection = match json::decode_llm_json(&raw, "claim selection") {
        Ok(selection) => selection,
        Err(err) => {
            warn!(error = %err, "claim selection returned unusable JSON");
            shared.emit_error(&err);
            return;
        }
    };

    let mut enqueued = 0usize;
    for selected in selection.selected_claims.into_iter().take(max_claims) {
        let claim = selected.claim.trim();
        if claim.is_empty() {
            continue;
        }
        match shared.state.enqueue_claim(claim) {
            Ok(queue_size) => {
                enqueued += 1;
                shared.diagnostics.claims_enqueued.fetch_add(1, Ordering::Relaxed);
                debug!(claim, reason = %selected.reason, queue_size, "claim enqueued");
                shared.bus.emit(NotificationPayload::ClaimSelected {
                    claim: claim.to_string(),
                    queue_size,
                });
            }
            Err(err) => {
                warn!(error = %err, "fact queue is gone — dropping remaining claims");
                return;
            }
        }
    }
    debug!(batch_len, enqueued, "claim selection finished");
}
