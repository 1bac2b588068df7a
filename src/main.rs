mod app;
mod config;
mod engine;
mod events;
mod i18n;
mod markup;
mod models;
mod ui;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::Backend, prelude::*};
use std::fs::OpenOptions;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use app::{App, AppMode};
use engine::{ChatRequest, EngineAdapter, EngineStatus, OllamaEngine};
use events::AppEvent;
use i18n::Locale;
use models::AppConfig;

/// Log to a file, the terminal belongs to the UI
fn init_logging(config: &AppConfig) -> Result<()> {
    let path = config::get_log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = std::env::var("PASSISTANT_LOG").unwrap_or_else(|_| config.log_level.clone());
    install_subscriber(file, &filter)
}

fn install_subscriber<W>(writer: W, filter: &str) -> Result<()>
where
    W: io::Write + Send + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(Mutex::new(writer))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = config::load_config()?;
    init_logging(&config)?;

    let engine = OllamaEngine::new(&config.ollama_url, config.request_timeout)?;
    let adapter = Arc::new(EngineAdapter::new(Arc::new(engine)));
    let locale = Locale::detect(config.locale.as_deref());
    info!(url = %config.ollama_url, %locale, "Starting");

    let mut app = App::new(&config, locale);
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();

    tokio::spawn(discover_engine(Arc::clone(&adapter), tx.clone()));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let status = adapter.status();
    let mut session = Session {
        app: &mut app,
        config: &mut config,
        adapter: &adapter,
        tx: &tx,
    };
    let res = run_app(&mut terminal, &mut session, &status, &mut rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("{err:?}");
        eprintln!("Error: {err:?}");
    }

    Ok(())
}

/// Everything the key handlers need to reach
struct Session<'a> {
    app: &'a mut App,
    config: &'a mut AppConfig,
    adapter: &'a Arc<EngineAdapter>,
    tx: &'a mpsc::UnboundedSender<AppEvent>,
}

impl Session<'_> {
    fn save_preferences(&mut self) {
        *self.config = self.app.apply_preferences(self.config);
        if let Err(e) = config::save_config(self.config) {
            warn!("Failed to save preferences: {e:#}");
        }
    }

    fn stop_generation(&self) {
        let adapter = Arc::clone(self.adapter);
        tokio::spawn(async move { adapter.interrupt().await });
    }

    fn send_message(&mut self) {
        let Some(messages) = self.app.begin_turn() else {
            return;
        };
        let request = ChatRequest {
            model: self.app.selected_model.clone(),
            messages,
            options: self.app.generation_options(),
        };
        tokio::spawn(run_generation(
            Arc::clone(self.adapter),
            request,
            self.tx.clone(),
        ));
    }
}

async fn discover_engine(adapter: Arc<EngineAdapter>, tx: mpsc::UnboundedSender<AppEvent>) {
    if !adapter.check_availability().await {
        return;
    }
    let models = adapter.available_models().await;
    info!(count = models.len(), "Found models");
    let _ = tx.send(AppEvent::ModelsListed(models));
}

/// Load the requested model if needed, then stream one reply as events
async fn run_generation(
    adapter: Arc<EngineAdapter>,
    request: ChatRequest,
    tx: mpsc::UnboundedSender<AppEvent>,
) {
    if !adapter.load_model(&request.model).await {
        let reason = adapter
            .status()
            .borrow()
            .error
            .clone()
            .unwrap_or_else(|| format!("could not load {}", request.model));
        let _ = tx.send(AppEvent::ModelLoadFailed(reason));
        return;
    }

    let mut stream = match adapter.generate(request).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send(AppEvent::GenerationFailed(e.to_string()));
            return;
        }
    };
    let _ = tx.send(AppEvent::GenerationStarted);

    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                let _ = tx.send(AppEvent::Fragment(text));
            }
            Err(e) => {
                error!("Generation failed: {e}");
                let _ = tx.send(AppEvent::GenerationFailed(e.to_string()));
                return;
            }
        }
    }

    let message = adapter.final_message().await;
    let _ = tx.send(AppEvent::GenerationFinished(message));
}

const fn handle_help_keys(app: &mut App, key: KeyCode, modifiers: KeyModifiers) -> bool {
    if !app.show_help {
        return false;
    }

    match key {
        KeyCode::Char('h') if modifiers.contains(KeyModifiers::CONTROL) => {
            app.toggle_help();
        }
        KeyCode::Esc => {
            app.show_help = false;
        }
        _ => {}
    }
    true
}

fn handle_settings_keys(session: &mut Session, key: KeyCode) {
    match key {
        KeyCode::Up => session.app.settings_up(),
        KeyCode::Down => session.app.settings_down(),
        KeyCode::Enter => {
            if session.app.select_model() {
                session.save_preferences();
            }
            session.app.close_settings();
        }
        KeyCode::Esc => session.app.close_settings(),
        _ => {}
    }
}

/// Shortcuts available from every screen, returns whether the key was consumed
fn handle_global_keys(session: &mut Session, key: KeyCode, modifiers: KeyModifiers) -> bool {
    if !modifiers.contains(KeyModifiers::CONTROL) {
        return false;
    }

    match key {
        KeyCode::Char('q') => session.app.quit(),
        KeyCode::Char('h') => session.app.toggle_help(),
        KeyCode::Char('s') => match session.app.mode {
            AppMode::Chat => session.app.open_settings(),
            AppMode::Settings => session.app.close_settings(),
        },
        KeyCode::Char('r') => {
            session.app.toggle_reasoning();
            session.save_preferences();
        }
        KeyCode::Char('t') => {
            session.app.toggle_theme();
            session.save_preferences();
        }
        KeyCode::Char('l') => {
            session.app.cycle_locale();
            session.save_preferences();
        }
        _ => return false,
    }
    true
}

fn handle_keyboard_input(session: &mut Session, key: KeyCode, modifiers: KeyModifiers) {
    match key {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
            if session.app.exit_pending {
                session.app.quit();
            } else {
                session.app.exit_pending = true;
            }
            return;
        }
        KeyCode::Esc if session.app.exit_pending => {
            session.app.exit_pending = false;
            return;
        }
        // Any other key cancels pending exit
        _ if session.app.exit_pending => session.app.exit_pending = false,
        _ => {}
    }

    if handle_help_keys(session.app, key, modifiers) || handle_global_keys(session, key, modifiers)
    {
        return;
    }

    // Nothing but quitting works without the engine
    if session.app.engine.available != Some(true) {
        return;
    }

    if session.app.mode == AppMode::Settings {
        handle_settings_keys(session, key);
        return;
    }

    match key {
        KeyCode::Tab => session.app.toggle_thinking(),

        KeyCode::Up => session.app.scroll_up(1),
        KeyCode::Down => session.app.scroll_down(1),
        KeyCode::PageUp => session.app.scroll_up(10),
        KeyCode::PageDown => session.app.scroll_down(10),
        KeyCode::Home => session.app.scroll_to_top(),
        KeyCode::End => session.app.scroll_to_bottom(),

        KeyCode::Esc | KeyCode::Enter if session.app.is_typing => session.stop_generation(),
        KeyCode::Enter => session.send_message(),
        KeyCode::Backspace => {
            session.app.input_buffer.pop();
        }
        KeyCode::Char(c) => session.app.input_buffer.push(c),

        _ => {}
    }
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    session: &mut Session,
    status: &watch::Receiver<EngineStatus>,
    event_rx: &mut mpsc::UnboundedReceiver<AppEvent>,
) -> Result<()> {
    loop {
        session.app.engine = status.borrow().clone();
        session.app.advance_tick();
        terminal.draw(|f| ui::render(f, session.app))?;

        while let Ok(app_event) = event_rx.try_recv() {
            session.app.handle_event(app_event);
        }

        // ~60fps for smooth scrolling and spinners
        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_keyboard_input(session, key.code, key.modifiers);
                }
            }
        }

        if session.app.should_quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine::{
        EngineError, FragmentStream, GenerationOptions, InferenceEngine, ModelEntry,
        ProgressCallback, ProgressReport,
    };
    use models::Message;

    /// Engine that replays a fixed list of fragments
    struct ScriptedEngine {
        fragments: Vec<Result<String, String>>,
        load_error: Option<String>,
    }

    #[async_trait]
    impl InferenceEngine for ScriptedEngine {
        async fn is_available(&self) -> bool {
            true
        }

        async fn list_models(&self) -> Result<Vec<ModelEntry>, EngineError> {
            Ok(vec![
                ModelEntry {
                    name: "big".to_string(),
                    size: 9,
                },
                ModelEntry {
                    name: "small".to_string(),
                    size: 1,
                },
            ])
        }

        async fn reload(&self, _model: &str, progress: ProgressCallback) -> Result<(), EngineError> {
            progress(ProgressReport::new(1.0, "Finish loading"));
            match &self.load_error {
                Some(e) => Err(EngineError::ModelLoad(e.clone())),
                None => Ok(()),
            }
        }

        async fn chat_stream(&self, _request: ChatRequest) -> Result<FragmentStream, EngineError> {
            let items: Vec<Result<String, EngineError>> = self
                .fragments
                .iter()
                .map(|f| f.clone().map_err(EngineError::Stream))
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn get_message(&self) -> String {
            self.fragments
                .iter()
                .filter_map(|f| f.as_ref().ok())
                .map(String::as_str)
                .collect()
        }

        async fn interrupt(&self) {}
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "small".to_string(),
            messages: vec![Message::user("ocean passwords")],
            options: GenerationOptions::default(),
        }
    }

    async fn collect_events(engine: ScriptedEngine) -> Vec<AppEvent> {
        let adapter = Arc::new(EngineAdapter::new(Arc::new(engine)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        run_generation(adapter, request(), tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_second_subscriber_is_rejected() {
        let file = tempfile::tempfile().unwrap();
        let _ = install_subscriber(file.try_clone().unwrap(), "info");
        let err = install_subscriber(file, "debug").unwrap_err();
        assert!(err.to_string().contains("log subscriber"));
    }

    #[tokio::test]
    async fn test_generation_events() {
        let events = collect_events(ScriptedEngine {
            fragments: vec![Ok("<pass>Sea".to_string()), Ok("Salt</pass>".to_string())],
            load_error: None,
        })
        .await;

        assert_eq!(
            events,
            vec![
                AppEvent::GenerationStarted,
                AppEvent::Fragment("<pass>Sea".to_string()),
                AppEvent::Fragment("Salt</pass>".to_string()),
                AppEvent::GenerationFinished("<pass>SeaSalt</pass>".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_generation_still_finishes() {
        let events = collect_events(ScriptedEngine {
            fragments: Vec::new(),
            load_error: None,
        })
        .await;

        assert_eq!(
            events,
            vec![
                AppEvent::GenerationStarted,
                AppEvent::GenerationFinished(String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_error_ends_turn() {
        let events = collect_events(ScriptedEngine {
            fragments: vec![Ok("<think>".to_string()), Err("boom".to_string())],
            load_error: None,
        })
        .await;

        assert_eq!(events.len(), 3);
        assert_eq!(
            events.last(),
            Some(&AppEvent::GenerationFailed("stream error: boom".to_string()))
        );
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let events = collect_events(ScriptedEngine {
            fragments: vec![Ok("never sent".to_string())],
            load_error: Some("no such model".to_string()),
        })
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AppEvent::ModelLoadFailed(e) if e.contains("no such model")));
    }

    #[tokio::test]
    async fn test_discovery_lists_models_by_size() {
        let engine = ScriptedEngine {
            fragments: Vec::new(),
            load_error: None,
        };
        let adapter = Arc::new(EngineAdapter::new(Arc::new(engine)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        discover_engine(Arc::clone(&adapter), tx).await;

        assert_eq!(adapter.status().borrow().available, Some(true));
        assert_eq!(
            rx.try_recv().ok(),
            Some(AppEvent::ModelsListed(vec![
                "small".to_string(),
                "big".to_string()
            ]))
        );
    }

    #[tokio::test]
    async fn test_full_turn_updates_app() {
        let adapter = Arc::new(EngineAdapter::new(Arc::new(ScriptedEngine {
            fragments: vec![Ok("<think>hm</think>\n".to_string()), Ok("<pass>A1!</pass>".to_string())],
            load_error: None,
        })));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut app = App::new(&AppConfig::default(), Locale::En);
        app.selected_model = "small".to_string();
        app.input_buffer = "short ones".to_string();
        let messages = app.begin_turn().unwrap();
        run_generation(
            adapter,
            ChatRequest {
                model: app.selected_model.clone(),
                messages,
                options: app.generation_options(),
            },
            tx,
        )
        .await;

        while let Ok(event) = rx.try_recv() {
            app.handle_event(event);
        }

        assert!(!app.turn_active);
        assert_eq!(app.conversation.len(), 3);
        assert_eq!(
            app.transcript.last().unwrap().content,
            "<think>hm</think>\n<pass>A1!</pass>"
        );
    }
}
