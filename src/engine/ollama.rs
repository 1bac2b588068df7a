// Ollama HTTP engine

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
    ChatRequest, EngineError, FragmentStream, InferenceEngine, ModelEntry, ProgressCallback,
    ProgressReport,
};
use crate::models::Message;

pub struct OllamaEngine {
    base_url: String,
    client: Client,
    interrupt: watch::Sender<bool>,
    last_message: Arc<Mutex<String>>,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    think: bool,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: ChunkMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thinking: String,
}

#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    digest: Option<String>,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    size: u64,
}

/// Turns the separate thinking/content deltas of chat chunks into one
/// fragment sequence with the thinking part wrapped in `<think>` tags.
#[derive(Debug, Default)]
pub struct ThinkFramer {
    in_think: bool,
}

impl ThinkFramer {
    pub fn frame(&mut self, chunk: &ChatChunk) -> Vec<String> {
        let mut fragments = Vec::new();

        if !chunk.message.thinking.is_empty() {
            if !self.in_think {
                fragments.push("<think>".to_string());
                self.in_think = true;
            }
            fragments.push(chunk.message.thinking.clone());
        }

        if !chunk.message.content.is_empty() {
            if self.in_think {
                fragments.push("</think>\n".to_string());
                self.in_think = false;
            }
            fragments.push(chunk.message.content.clone());
        }

        if chunk.done && self.in_think {
            fragments.push("</think>".to_string());
            self.in_think = false;
        }

        fragments
    }
}

impl OllamaEngine {
    pub fn new(base_url: impl Into<String>, request_timeout: u64) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()?;
        let (interrupt, _) = watch::channel(false);

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            interrupt,
            last_message: Arc::new(Mutex::new(String::new())),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, EngineError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        ensure_success(response).await
    }

    fn set_last_message(&self, text: &str) {
        if let Ok(mut last) = self.last_message.lock() {
            last.clear();
            last.push_str(text);
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EngineError::Status {
        status: status.as_u16(),
        body,
    })
}

fn parse_line<T: DeserializeOwned>(line: &[u8]) -> Option<Result<T, EngineError>> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str::<T>(trimmed).map_err(EngineError::from))
}

/// Decode a newline-delimited JSON response body, buffering incomplete lines
fn ndjson_stream<T>(response: reqwest::Response) -> impl Stream<Item = Result<T, EngineError>> + Send
where
    T: DeserializeOwned + Send + 'static,
{
    stream::unfold(
        (response.bytes_stream(), Vec::new(), false),
        |(mut byte_stream, mut buffer, finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let rest = buffer.split_off(pos + 1);
                    let line = std::mem::replace(&mut buffer, rest);
                    if let Some(item) = parse_line::<T>(&line) {
                        return Some((item, (byte_stream, buffer, finished)));
                    }
                    continue;
                }

                if finished {
                    // Last line without a trailing newline
                    let line = std::mem::take(&mut buffer);
                    return parse_line::<T>(&line).map(|item| (item, (byte_stream, buffer, true)));
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        let err = EngineError::Stream(e.to_string());
                        return Some((Err(err), (byte_stream, Vec::new(), true)));
                    }
                    None => {
                        return parse_line::<T>(&std::mem::take(&mut buffer))
                            .map(|item| (item, (byte_stream, Vec::new(), true)));
                    }
                }
            }
        },
    )
}

/// Largest fraction reported before the model is actually loaded
const PULL_CEILING: f64 = 0.99;

/// Download progress summed over every layer of a pull
#[derive(Debug, Default)]
struct PullTracker {
    layers: HashMap<String, (u64, u64)>,
    fraction: f64,
}

impl PullTracker {
    /// Record a status line and return the overall fraction, which never decreases
    #[allow(clippy::cast_precision_loss)]
    fn update(&mut self, status: &PullStatus) -> f64 {
        if let Some(total) = status.total {
            let layer = status.digest.as_ref().unwrap_or(&status.status);
            let completed = status.completed.unwrap_or(0).min(total);
            self.layers.insert(layer.clone(), (completed, total));
        }

        let (completed, total) = self
            .layers
            .values()
            .fold((0_u64, 0_u64), |(c, t), (completed, total)| (c + completed, t + total));
        if total > 0 {
            let current = (completed as f64 / total as f64).min(PULL_CEILING);
            self.fraction = self.fraction.max(current);
        }
        self.fraction
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    async fn is_available(&self) -> bool {
        self.client
            .get(self.url("/api/tags"))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    async fn list_models(&self) -> Result<Vec<ModelEntry>, EngineError> {
        let response = self.client.get(self.url("/api/tags")).send().await?;
        let tags: TagsResponse = ensure_success(response).await?.json().await?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelEntry {
                name: m.name,
                size: m.size,
            })
            .collect())
    }

    async fn reload(&self, model: &str, progress: ProgressCallback) -> Result<(), EngineError> {
        info!(model, "Pulling model");
        progress(ProgressReport::new(0.0, format!("Fetching {model}")));

        let body = serde_json::json!({ "model": model, "stream": true });
        let response = self.post_json("/api/pull", &body).await?;

        let mut statuses = Box::pin(ndjson_stream::<PullStatus>(response));
        let mut tracker = PullTracker::default();
        let mut fraction = 0.0;
        while let Some(status) = statuses.next().await {
            let status = status?;
            if let Some(error) = status.error {
                return Err(EngineError::ModelLoad(error));
            }
            fraction = tracker.update(&status);
            debug!(status = %status.status, fraction, "Pull progress");
            progress(ProgressReport::new(fraction, status.status));
        }

        progress(ProgressReport::new(fraction, format!("Loading {model} into memory")));
        let body = serde_json::json!({ "model": model, "stream": false });
        self.post_json("/api/generate", &body).await?;

        info!(model, "Model loaded");
        progress(ProgressReport::new(1.0, "Finish loading"));
        Ok(())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<FragmentStream, EngineError> {
        self.interrupt.send_replace(false);
        self.set_last_message("");

        let body = ChatBody {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            think: request.options.enable_thinking,
            options: SamplingOptions {
                temperature: request.options.temperature,
                top_p: request.options.top_p,
            },
        };
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat request");
        let response = self.post_json("/api/chat", &body).await?;

        let mut interrupted = self.interrupt.subscribe();
        let last_message = Arc::clone(&self.last_message);

        let fragments = ndjson_stream::<ChatChunk>(response)
            .scan(ThinkFramer::default(), |framer, chunk| {
                let items: Vec<Result<String, EngineError>> = match chunk {
                    Ok(ChatChunk {
                        error: Some(error), ..
                    }) => vec![Err(EngineError::Stream(error))],
                    Ok(chunk) => framer.frame(&chunk).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(stream::iter(items)))
            })
            .flatten()
            .inspect(move |fragment| {
                if let (Ok(text), Ok(mut last)) = (fragment, last_message.lock()) {
                    last.push_str(text);
                }
            })
            .take_until(async move {
                if interrupted.wait_for(|stop| *stop).await.is_err() {
                    warn!("Engine dropped while streaming");
                }
            });

        Ok(Box::pin(fragments))
    }

    async fn get_message(&self) -> String {
        self.last_message
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default()
    }

    async fn interrupt(&self) {
        info!("Interrupting generation");
        self.interrupt.send_replace(true);
    }
}
