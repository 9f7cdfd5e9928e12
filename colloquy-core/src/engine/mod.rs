//! `ColloquyEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! ColloquyEngine::new()
//!     └─► start()        → ingest loop + fact worker spawned, returns
//!         │                a TranscriptSender for the upstream source
//!         └─► stop()     → shutdown signalled, tasks joined with a grace
//!                          timeout, stragglers aborted
//! ```
//!
//! `start()`/`stop()` are state-checked: calling them in the wrong state
//! returns an error rather than panicking. The engine is restartable; a new
//! `start()` creates fresh channels (claims pending from a previous run are
//! discarded — there is no cross-run durability).
//!
//! ## Threading
//!
//! All fields use interior mutability, so the engine is `Send + Sync`; wrap
//! it in `Arc` to share between the host and forwarding tasks. `start()`
//! must be called from within a tokio runtime.

pub mod ingest;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{ColloquyError, Result};
use crate::facts::worker::{self, WorkerContext, WorkerDiagnostics, WorkerSnapshot};
use crate::ipc::events::{Notification, NotificationPayload, TranscriptUpdate};
use crate::ipc::NotificationBus;
use crate::providers::{LanguageModel, SearchProvider};
use crate::state::{ConversationState, ExportSnapshot, StateStats};
use crate::topics::similarity::Similarity;

use ingest::{DiagnosticsSnapshot, IngestContext, PipelineDiagnostics};

/// State, providers and observability shared by every task.
pub(crate) struct EngineShared {
    pub(crate) config: PipelineConfig,
    pub(crate) state: Arc<ConversationState>,
    pub(crate) bus: NotificationBus,
    pub(crate) llm: Arc<dyn LanguageModel>,
    pub(crate) search: Arc<dyn SearchProvider>,
    pub(crate) similarity: Arc<dyn Similarity>,
    pub(crate) diagnostics: PipelineDiagnostics,
    pub(crate) worker_diagnostics: WorkerDiagnostics,
    /// In-flight trigger tasks (topic updates, selections, image lookups),
    /// joined with a grace timeout on shutdown.
    trigger_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineShared {
    pub(crate) fn emit_error(&self, err: &ColloquyError) {
        self.bus.emit(NotificationPayload::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
    }

    /// Register a trigger task for shutdown joining, pruning finished ones.
    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.trigger_tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn take_trigger_tasks(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.trigger_tasks.lock())
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        mut config: PipelineConfig,
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
    ) -> Arc<Self> {
        use crate::topics::similarity::LexicalSimilarity;
        config.normalize();
        let state = Arc::new(ConversationState::new(&config));
        Arc::new(Self {
            config,
            state,
            bus: NotificationBus::new(),
            llm,
            search,
            similarity: Arc::new(LexicalSimilarity::new()),
            diagnostics: PipelineDiagnostics::default(),
            worker_diagnostics: WorkerDiagnostics::default(),
            trigger_tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Handle for pushing upstream transcript events into a running engine.
#[derive(Clone, Debug)]
pub struct TranscriptSender {
    tx: mpsc::UnboundedSender<TranscriptUpdate>,
}

impl TranscriptSender {
    /// # Errors
    /// `ChannelClosed` once the engine has been stopped.
    pub fn send(&self, update: TranscriptUpdate) -> Result<()> {
        self.tx
            .send(update)
            .map_err(|_| ColloquyError::ChannelClosed("transcript events"))
    }
}

/// The top-level engine handle.
pub struct ColloquyEngine {
    shared: Arc<EngineShared>,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<TranscriptUpdate>>>,
    core_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ColloquyEngine {
    /// Create a new engine. Does not start any task — call `start()`.
    pub fn new(
        mut config: PipelineConfig,
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        similarity: Arc<dyn Similarity>,
    ) -> Self {
        config.normalize();
        let state = Arc::new(ConversationState::new(&config));
        let shared = Arc::new(EngineShared {
            config,
            state,
            bus: NotificationBus::new(),
            llm,
            search,
            similarity,
            diagnostics: PipelineDiagnostics::default(),
            worker_diagnostics: WorkerDiagnostics::default(),
            trigger_tasks: Mutex::new(Vec::new()),
        });
        Self {
            shared,
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            event_tx: Mutex::new(None),
            core_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the ingest loop and the fact worker; returns the sender the
    /// upstream transcript source pushes events into.
    ///
    /// # Errors
    /// - `ColloquyError::AlreadyRunning` if already started.
    pub fn start(&self) -> Result<TranscriptSender> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ColloquyError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let claims = self.shared.state.reset_claim_channel();

        let ingest_handle = tokio::spawn(ingest::run(IngestContext {
            shared: Arc::clone(&self.shared),
            events: event_rx,
            shutdown: shutdown_rx.clone(),
        }));
        let worker_handle = tokio::spawn(worker::run(WorkerContext {
            shared: Arc::clone(&self.shared),
            claims,
            shutdown: shutdown_rx,
        }));

        *self.core_tasks.lock() = vec![ingest_handle, worker_handle];
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *self.event_tx.lock() = Some(event_tx.clone());

        info!("engine started — ingesting");
        Ok(TranscriptSender { tx: event_tx })
    }

    /// Signal shutdown and join all tasks.
    ///
    /// The ingest loop and the fact worker exit at their next suspension
    /// point; in-flight trigger tasks get `shutdown_grace` to finish and are
    /// aborted past the deadline.
    ///
    /// # Errors
    /// - `ColloquyError::NotRunning` if not currently running.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ColloquyError::NotRunning);
        }
        info!("engine stop requested");

        *self.event_tx.lock() = None;
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(true);
        }

        let deadline = Instant::now() + self.shared.config.shutdown_grace;
        let core = std::mem::take(&mut *self.core_tasks.lock());
        let triggers = self.shared.take_trigger_tasks();
        let mut aborted = 0usize;
        for mut handle in core.into_iter().chain(triggers) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(aborted, "tasks aborted past the shutdown grace period");
        }
        info!("engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to live pipeline notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.shared.bus.subscribe()
    }

    /// Point-in-time state counters.
    pub fn stats(&self) -> StateStats {
        self.shared.state.get_stats()
    }

    /// Ingest/trigger counters.
    pub fn pipeline_diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// Fact-worker counters.
    pub fn worker_diagnostics(&self) -> WorkerSnapshot {
        self.shared.worker_diagnostics.snapshot()
    }

    /// Snapshot of the topic model for export. Valid at any time, including
    /// after `stop()`.
    pub fn snapshot_for_export(&self) -> ExportSnapshot {
        self.shared.state.snapshot_for_export()
    }

    /// Snapshot of the retained transcript.
    pub fn transcript(&self) -> Vec<crate::state::TranscriptSegment> {
        self.shared.state.transcript()
    }

    /// Snapshot of all published fact results.
    pub fn fact_results(&self) -> Vec<crate::state::FactResult> {
        self.shared.state.fact_results()
    }
}
