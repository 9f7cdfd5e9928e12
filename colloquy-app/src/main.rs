//! Colloquy session host.
//!
//! Reads final sentences from stdin (one per line), runs the engine against
//! real or scripted providers, prints every notification as a JSON line on
//! stdout, and writes the topic-graph snapshot to disk on shutdown.
//!
//! ```text
//! echo "The Moon landing occurred in 1969" | colloquy --offline
//! ```
//!
//! Environment: `COLLOQUY_LLM_API_KEY` (required unless `--offline`),
//! `COLLOQUY_LLM_BASE_URL` / `COLLOQUY_SEARCH_BASE_URL` (override settings),
//! `RUST_LOG` (tracing filter; logs go to stderr, notifications to stdout).

mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colloquy_core::providers::stub::{ScriptedLlm, ScriptedSearch};
use colloquy_core::{
    CachedSimilarity, ColloquyEngine, LanguageModel, LexicalSimilarity, OpenAiCompatLlm,
    SearchProvider, SearxngSearch, TranscriptUpdate,
};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let offline = std::env::args().any(|arg| arg == "--offline");

    let settings_path = settings::default_settings_path();
    let app_settings = settings::load_settings(&settings_path);
    if !settings_path.exists() {
        if let Err(err) = settings::save_settings(&settings_path, &app_settings) {
            warn!(error = %err, "could not write default settings file");
        }
    }
    info!(path = %settings_path.display(), "settings loaded");

    let config = app_settings.pipeline_config();

    let (llm, search): (Arc<dyn LanguageModel>, Arc<dyn SearchProvider>) = if offline {
        info!("offline mode — scripted providers, no network");
        (Arc::new(ScriptedLlm::new()), Arc::new(ScriptedSearch::new()))
    } else {
        let api_key = std::env::var("COLLOQUY_LLM_API_KEY").context(
            "COLLOQUY_LLM_API_KEY is not set (pass --offline for the scripted demo)",
        )?;
        let llm_base_url = std::env::var("COLLOQUY_LLM_BASE_URL")
            .unwrap_or_else(|_| app_settings.llm_base_url.clone());
        let search_base_url = std::env::var("COLLOQUY_SEARCH_BASE_URL")
            .unwrap_or_else(|_| app_settings.search_base_url.clone());
        info!(llm = %llm_base_url, search = %search_base_url, "providers configured");
        (
            Arc::new(OpenAiCompatLlm::new(llm_base_url, api_key, config.llm.timeout)?),
            Arc::new(SearxngSearch::new(search_base_url, config.search.timeout)?),
        )
    };

    let similarity = Arc::new(CachedSimilarity::new(LexicalSimilarity::new()));
    let engine = Arc::new(ColloquyEngine::new(config, llm, search, similarity));
    let sender = engine.start()?;

    // Forward notifications to stdout as JSON lines.
    let mut notifications = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!(error = %err, "failed to serialize notification"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification printer lagged behind the pipeline");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // stdin lines become final sentences; EOF or ctrl-c ends the session.
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt — shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if sender.send(TranscriptUpdate::final_sentence(line)).is_err() {
                        warn!("engine stopped accepting events");
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed — shutting down");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "stdin read failed — shutting down");
                    break;
                }
            }
        }
    }

    // Let queued events reach the ingest loop before signalling shutdown.
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop().await?;
    printer.abort();

    let export = engine.snapshot_for_export();
    let export_path = &app_settings.export_path;
    std::fs::write(export_path, serde_json::to_vec_pretty(&export)?)
        .with_context(|| format!("writing session snapshot to {export_path}"))?;
    info!(
        path = %export_path,
        topics = export.metadata.topics_total,
        transitions = export.metadata.transitions_total,
        facts = export.metadata.facts_total,
        "session snapshot written"
    );

    let stats = engine.stats();
    info!(
        segments = stats.segments_total,
        topics = stats.topics_total,
        facts = stats.facts_total,
        "session finished"
    );
    Ok(())
}
