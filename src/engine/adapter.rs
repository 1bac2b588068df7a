// Lifecycle wrapper around the inference engine

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use super::{ChatRequest, EngineError, FragmentStream, InferenceEngine, ProgressCallback, ProgressReport};

/// Snapshot of the engine state shown by the UI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStatus {
    /// `None` until the availability check has finished
    pub available: Option<bool>,
    pub current_model: Option<String>,
    pub is_loading: bool,
    pub progress: Option<ProgressReport>,
    pub error: Option<String>,
}

pub struct EngineAdapter {
    engine: Arc<dyn InferenceEngine>,
    status: Arc<watch::Sender<EngineStatus>>,
    load_lock: Mutex<()>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        let (status, _) = watch::channel(EngineStatus::default());
        Self {
            engine,
            status: Arc::new(status),
            load_lock: Mutex::new(()),
        }
    }

    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    pub fn current_model(&self) -> Option<String> {
        self.status.borrow().current_model.clone()
    }

    pub async fn check_availability(&self) -> bool {
        let available = self.engine.is_available().await;
        if !available {
            warn!("Inference engine is not available");
        }
        self.status.send_modify(|s| s.available = Some(available));
        available
    }

    /// Model identifiers ordered from the smallest to the largest
    pub async fn available_models(&self) -> Vec<String> {
        match self.engine.list_models().await {
            Ok(mut models) => {
                models.sort_by_key(|m| m.size);
                models.into_iter().map(|m| m.name).collect()
            }
            Err(e) => {
                error!("Failed to list models: {e}");
                Vec::new()
            }
        }
    }

    /// Load `model`, returning whether it is ready to use.
    ///
    /// Loads are serialized: a second call waits for the first to finish and
    /// returns immediately if that one already loaded the same model.
    pub async fn load_model(&self, model: &str) -> bool {
        let _guard = self.load_lock.lock().await;

        if self.current_model().as_deref() == Some(model) {
            return true;
        }

        info!(model, "Loading model");
        self.status.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
            s.progress = None;
        });

        let status = Arc::clone(&self.status);
        let progress: ProgressCallback = Arc::new(move |report: ProgressReport| {
            status.send_modify(|s| s.progress = Some(report));
        });

        match self.engine.reload(model, progress).await {
            Ok(()) => {
                self.status.send_modify(|s| {
                    s.is_loading = false;
                    s.current_model = Some(model.to_string());
                });
                true
            }
            Err(e) => {
                error!(model, "Failed to load model: {e}");
                self.status.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(e.to_string());
                });
                false
            }
        }
    }

    pub async fn generate(&self, request: ChatRequest) -> Result<FragmentStream, EngineError> {
        self.engine
            .chat_stream(request)
            .await
            .inspect_err(|e| error!("Failed to start generation: {e}"))
    }

    pub async fn final_message(&self) -> String {
        self.engine.get_message().await
    }

    pub async fn interrupt(&self) {
        self.engine.interrupt().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GenerationOptions, MockInferenceEngine, ModelEntry};
    use crate::models::Message;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            messages: vec![Message::user("hi")],
            options: GenerationOptions::default(),
        }
    }

    /// Engine whose reload takes a while and records overlapping calls
    #[derive(Default)]
    struct SlowEngine {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        reloads: AtomicUsize,
    }

    #[async_trait]
    impl InferenceEngine for SlowEngine {
        async fn is_available(&self) -> bool {
            true
        }

        async fn list_models(&self) -> Result<Vec<ModelEntry>, EngineError> {
            Ok(Vec::new())
        }

        async fn reload(&self, _model: &str, progress: ProgressCallback) -> Result<(), EngineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.reloads.fetch_add(1, Ordering::SeqCst);
            progress(ProgressReport::new(0.5, "halfway"));
            tokio::time::sleep(Duration::from_millis(20)).await;
            progress(ProgressReport::new(1.0, "done"));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn chat_stream(&self, _request: ChatRequest) -> Result<FragmentStream, EngineError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn get_message(&self) -> String {
            String::new()
        }

        async fn interrupt(&self) {}
    }

    #[tokio::test]
    async fn test_loads_are_serialized() {
        let engine = Arc::new(SlowEngine::default());
        let adapter = EngineAdapter::new(Arc::clone(&engine) as Arc<dyn InferenceEngine>);

        let (a, b, c) = tokio::join!(
            adapter.load_model("a"),
            adapter.load_model("b"),
            adapter.load_model("b"),
        );

        assert!(a && b && c);
        assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 1);
        // The third call finds "b" already loaded
        assert_eq!(engine.reloads.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.current_model().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_load_reports_progress_and_clears_loading() {
        let adapter = EngineAdapter::new(Arc::new(SlowEngine::default()));
        assert!(adapter.load_model("qwen3:0.6b").await);

        let status = adapter.status().borrow().clone();
        assert!(!status.is_loading);
        assert!(status.error.is_none());
        assert_eq!(status.current_model.as_deref(), Some("qwen3:0.6b"));
        assert!(status.progress.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_failed_load_returns_false() {
        let mut engine = MockInferenceEngine::new();
        engine
            .expect_reload()
            .times(1)
            .returning(|_, _| Err(EngineError::ModelLoad("no space left".to_string())));

        let adapter = EngineAdapter::new(Arc::new(engine));
        assert!(!adapter.load_model("big-model").await);

        let status = adapter.status().borrow().clone();
        assert!(!status.is_loading);
        assert!(status.current_model.is_none());
        assert_eq!(
            status.error.as_deref(),
            Some("failed to load model: no space left")
        );
    }

    #[tokio::test]
    async fn test_loading_current_model_skips_engine() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_reload().times(1).returning(|_, _| Ok(()));

        let adapter = EngineAdapter::new(Arc::new(engine));
        assert!(adapter.load_model("m").await);
        assert!(adapter.load_model("m").await);
    }

    #[tokio::test]
    async fn test_available_models_sorted_by_size() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_list_models().returning(|| {
            Ok(vec![
                ModelEntry { name: "large".to_string(), size: 9_000 },
                ModelEntry { name: "small".to_string(), size: 1_000 },
                ModelEntry { name: "medium".to_string(), size: 4_000 },
            ])
        });

        let adapter = EngineAdapter::new(Arc::new(engine));
        assert_eq!(adapter.available_models().await, vec!["small", "medium", "large"]);
    }

    #[tokio::test]
    async fn test_available_models_empty_on_error() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_list_models().returning(|| {
            Err(EngineError::Status {
                status: 500,
                body: String::new(),
            })
        });

        let adapter = EngineAdapter::new(Arc::new(engine));
        assert!(adapter.available_models().await.is_empty());
    }

    #[tokio::test]
    async fn test_check_availability_updates_status() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_is_available().returning(|| false);

        let adapter = EngineAdapter::new(Arc::new(engine));
        assert!(adapter.status().borrow().available.is_none());
        assert!(!adapter.check_availability().await);
        assert_eq!(adapter.status().borrow().available, Some(false));
    }

    #[tokio::test]
    async fn test_generate_passes_fragments_through() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_chat_stream().returning(|_| {
            let fragments = vec![Ok("<pass>".to_string()), Ok("abc".to_string())];
            Ok(Box::pin(futures::stream::iter(fragments)) as FragmentStream)
        });
        engine
            .expect_get_message()
            .returning(|| "<pass>abc".to_string());

        let adapter = EngineAdapter::new(Arc::new(engine));
        let fragments: Vec<String> = adapter
            .generate(request())
            .await
            .unwrap()
            .filter_map(|f| futures::future::ready(f.ok()))
            .collect()
            .await;
        assert_eq!(fragments, vec!["<pass>", "abc"]);
        assert_eq!(adapter.final_message().await, "<pass>abc");
    }

    #[tokio::test]
    async fn test_generate_error_is_returned() {
        let mut engine = MockInferenceEngine::new();
        engine
            .expect_chat_stream()
            .returning(|_| Err(EngineError::Stream("boom".to_string())));

        let adapter = EngineAdapter::new(Arc::new(engine));
        assert!(adapter.generate(request()).await.is_err());
    }

    #[test]
    fn test_interrupt_is_forwarded() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_interrupt().times(1).returning(|| ());

        let adapter = EngineAdapter::new(Arc::new(engine));
        tokio_test::block_on(adapter.interrupt());
    }
}
