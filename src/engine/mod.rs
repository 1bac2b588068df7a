// Boundary to the local inference engine

pub mod adapter;
pub mod ollama;

use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::models::Message;

pub use adapter::{EngineAdapter, EngineStatus};
pub use ollama::OllamaEngine;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("engine returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode engine response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("stream error: {0}")]
    Stream(String),
}

/// Model loading progress as reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Fraction in `[0, 1]`
    pub progress: f64,
    pub text: String,
}

impl ProgressReport {
    pub fn new(progress: f64, text: impl Into<String>) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            text: text.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressReport) + Send + Sync>;

/// Incremental text fragments of one generation, in arrival order
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, EngineError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub enable_thinking: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.9,
            enable_thinking: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub name: String,
    /// Size in bytes, used as the memory footprint when ordering models
    pub size: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Whether the engine can be used at all on this machine
    async fn is_available(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<ModelEntry>, EngineError>;

    /// Make `model` the active model, reporting progress while it loads
    async fn reload(&self, model: &str, progress: ProgressCallback) -> Result<(), EngineError>;

    async fn chat_stream(&self, request: ChatRequest) -> Result<FragmentStream, EngineError>;

    /// Full text of the most recent generation
    async fn get_message(&self) -> String;

    /// Stop the in-flight generation, if any
    async fn interrupt(&self);
}
