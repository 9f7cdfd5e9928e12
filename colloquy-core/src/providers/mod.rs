//! External provider contracts.
//!
//! The engines only ever see these traits. Concrete adapters (`openai`,
//! `searxng`) are possibly-slow network calls; scripted stubs (`stub`) run
//! the full pipeline offline. Implementations must map failures into the
//! error taxonomy: transport problems and timeouts are
//! [`ColloquyError::Transport`], rejected credentials are
//! [`ColloquyError::Auth`], malformed payloads are [`ColloquyError::Parse`].

pub mod openai;
pub mod searxng;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmCallSettings, SafeSearch, SearchConfig};
use crate::error::Result;

/// One completion request: prompt plus the per-call-type settings.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, settings: &LlmCallSettings) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Contract for text-generation backends.
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Run one completion and return the raw response text. Callers strip
    /// code fences and decode JSON themselves (see [`crate::json`]).
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// One text search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// One image search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Query parameters shared by both search endpoints.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: usize,
    pub safesearch: SafeSearch,
    pub region: String,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, config: &SearchConfig) -> Self {
        Self {
            query: query.into(),
            max_results: config.max_results,
            safesearch: config.safesearch,
            region: config.region.clone(),
        }
    }
}

/// Contract for web search backends (text + image endpoints).
#[async_trait]
pub trait SearchProvider: Send + Sync + 'static {
    async fn text_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>>;
    async fn image_search(&self, query: &SearchQuery) -> Result<Vec<ImageResult>>;
}
