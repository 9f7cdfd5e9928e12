//! Persistent application settings (JSON file in app data directory).
//!
//! Secrets never live here — API keys come from the environment. The file
//! only carries cadence knobs and provider endpoints so a session behaves
//! the same across restarts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use colloquy_core::{PipelineConfig, SafeSearch};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub llm_base_url: String,
    pub llm_model: String,
    pub search_base_url: String,
    pub topic_update_threshold: usize,
    pub claim_selection_batch_size: usize,
    pub max_claims_per_batch: usize,
    pub fact_check_rate_limit_seconds: u64,
    pub similarity_threshold: f32,
    pub search_max_results: usize,
    pub search_safesearch: String,
    pub search_region: String,
    pub export_path: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            llm_base_url: "https://api.openai.com/v1".into(),
            llm_model: "gpt-4o-mini".into(),
            search_base_url: "http://127.0.0.1:8888".into(),
            topic_update_threshold: 5,
            claim_selection_batch_size: 10,
            max_claims_per_batch: 2,
            fact_check_rate_limit_seconds: 10,
            similarity_threshold: 0.7,
            search_max_results: 5,
            search_safesearch: "strict".into(),
            search_region: "worldwide".into(),
            export_path: "colloquy-session.json".into(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.llm_base_url = self.llm_base_url.trim().trim_end_matches('/').to_string();
        self.search_base_url = self.search_base_url.trim().trim_end_matches('/').to_string();
        if self.llm_model.trim().is_empty() {
            self.llm_model = AppSettings::default().llm_model;
        }
        if self.export_path.trim().is_empty() {
            self.export_path = AppSettings::default().export_path;
        }
        self.fact_check_rate_limit_seconds = self.fact_check_rate_limit_seconds.min(3600);
    }

    /// Build the engine configuration; `PipelineConfig::normalize` handles
    /// range clamping.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.topic_update_threshold = self.topic_update_threshold;
        config.claim_selection_batch_size = self.claim_selection_batch_size;
        config.max_claims_per_batch = self.max_claims_per_batch;
        config.fact_check_rate_limit = Duration::from_secs(self.fact_check_rate_limit_seconds);
        config.similarity_threshold = self.similarity_threshold;
        config.search.max_results = self.search_max_results;
        config.search.safesearch = SafeSearch::from_str_lossy(&self.search_safesearch);
        config.search.region = self.search_region.clone();
        for call in [
            &mut config.llm.topic_extraction,
            &mut config.llm.claim_selection,
            &mut config.llm.query_optimization,
            &mut config.llm.verification,
        ] {
            call.model = self.llm_model.clone();
        }
        config.normalize();
        config
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Colloquy")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("colloquy")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
