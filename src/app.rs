use crate::engine::{EngineStatus, GenerationOptions};
use crate::events::AppEvent;
use crate::i18n::{self, Locale};
use crate::markup::fix_unclosed_tags;
use crate::models::{AppConfig, Message, MessageRole, LOADING_PLACEHOLDER, SYSTEM_PROMPT};
use crate::ui::theme::{Palette, ThemeName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Chat,
    Settings,
}

#[derive(Debug)]
pub struct App {
    pub mode: AppMode,
    pub should_quit: bool,
    /// Messages sent to the engine, starting with the system prompt
    pub conversation: Vec<Message>,
    /// Messages shown on screen
    pub transcript: Vec<Message>,
    /// Raw text of the assistant reply being streamed
    pub stream_buffer: String,
    pub input_buffer: String,
    pub scroll_offset: usize,
    pub show_help: bool,
    pub exit_pending: bool,
    /// A turn is in progress, from submission until it finishes or fails
    pub turn_active: bool,
    /// Fragments are being generated
    pub is_typing: bool,
    pub selected_model: String,
    pub available_models: Vec<String>,
    pub settings_cursor: usize,
    pub enable_thinking: bool,
    pub show_thinking: bool,
    pub theme: ThemeName,
    pub locale: Locale,
    pub engine: EngineStatus,
    pub tick: usize,
    temperature: f32,
    top_p: f32,
}

impl App {
    pub fn new(config: &AppConfig, locale: Locale) -> Self {
        Self {
            mode: AppMode::Chat,
            should_quit: false,
            conversation: vec![Message::system(SYSTEM_PROMPT)],
            transcript: Vec::new(),
            stream_buffer: String::new(),
            input_buffer: String::new(),
            scroll_offset: 0,
            show_help: false,
            exit_pending: false,
            turn_active: false,
            is_typing: false,
            selected_model: config.default_model.clone(),
            available_models: Vec::new(),
            settings_cursor: 0,
            enable_thinking: config.enable_thinking,
            show_thinking: false,
            theme: config.theme,
            locale,
            engine: EngineStatus::default(),
            tick: 0,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }

    pub fn tr<'a>(&self, key: &'a str) -> &'a str {
        i18n::t(self.locale, key)
    }

    pub const fn palette(&self) -> Palette {
        self.theme.palette()
    }

    pub const fn quit(&mut self) {
        self.should_quit = true;
    }

    pub const fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub const fn toggle_thinking(&mut self) {
        self.show_thinking = !self.show_thinking;
    }

    pub const fn toggle_reasoning(&mut self) {
        self.enable_thinking = !self.enable_thinking;
    }

    pub const fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
    }

    pub const fn cycle_locale(&mut self) {
        self.locale = self.locale.next();
    }

    pub const fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    pub const fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub const fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    pub const fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }

    pub const fn scroll_to_bottom(&mut self) {
        // Clamped to the real maximum while rendering
        self.scroll_offset = usize::MAX;
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            enable_thinking: self.enable_thinking,
        }
    }

    fn input_blocked(&self) -> bool {
        self.input_buffer.trim().is_empty()
            || self.selected_model.is_empty()
            || self.engine.is_loading
    }

    /// The prompt input cannot be submitted; while typing it still works as a stop button
    pub fn input_disabled(&self) -> bool {
        self.input_blocked() && !self.is_typing
    }

    /// Start a turn from the prompt input, returning the conversation to submit
    pub fn begin_turn(&mut self) -> Option<Vec<Message>> {
        if self.turn_active || self.input_blocked() {
            return None;
        }

        let message = Message::user(std::mem::take(&mut self.input_buffer));
        self.conversation.push(message.clone());
        self.transcript.push(message);
        self.transcript.push(Message::assistant(LOADING_PLACEHOLDER));

        self.turn_active = true;
        self.stream_buffer.clear();
        self.scroll_to_bottom();

        Some(self.conversation.clone())
    }

    fn pending_reply(&mut self) -> Option<&mut Message> {
        self.transcript
            .last_mut()
            .filter(|m| m.role == MessageRole::Assistant)
    }

    fn end_turn(&mut self) {
        self.turn_active = false;
        self.is_typing = false;
        self.scroll_to_bottom();
    }

    fn fail_turn(&mut self, error: &str) {
        if !self.turn_active {
            return;
        }
        let content = format!("{}: {error}", self.tr("error.prefix"));
        if let Some(reply) = self.pending_reply() {
            reply.content = content;
        }
        self.end_turn();
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ModelsListed(models) => {
                self.available_models = models;
                self.settings_cursor = self.selected_model_index().unwrap_or(0);
            }
            AppEvent::ModelLoadFailed(error) | AppEvent::GenerationFailed(error) => {
                self.fail_turn(&error);
            }
            AppEvent::GenerationStarted => {
                if self.turn_active {
                    self.is_typing = true;
                    self.stream_buffer.clear();
                }
            }
            AppEvent::Fragment(fragment) => {
                // Late fragments of a finished or cancelled turn
                if !self.turn_active {
                    return;
                }
                self.stream_buffer.push_str(&fragment);
                let content = fix_unclosed_tags(&self.stream_buffer);
                if let Some(reply) = self.pending_reply() {
                    reply.content = content;
                }
                self.scroll_to_bottom();
            }
            AppEvent::GenerationFinished(final_message) => {
                if !self.turn_active {
                    return;
                }
                if !final_message.is_empty() {
                    self.stream_buffer = final_message;
                }
                let reply = std::mem::take(&mut self.stream_buffer);
                if reply.is_empty() {
                    self.transcript.pop();
                } else {
                    let content = fix_unclosed_tags(&reply);
                    if let Some(pending) = self.pending_reply() {
                        pending.content = content;
                    }
                    self.conversation.push(Message::assistant(reply));
                }
                self.end_turn();
            }
        }
    }

    fn selected_model_index(&self) -> Option<usize> {
        self.available_models
            .iter()
            .position(|m| *m == self.selected_model)
    }

    pub fn open_settings(&mut self) {
        self.settings_cursor = self.selected_model_index().unwrap_or(0);
        self.mode = AppMode::Settings;
    }

    pub const fn close_settings(&mut self) {
        self.mode = AppMode::Chat;
    }

    pub const fn settings_up(&mut self) {
        self.settings_cursor = self.settings_cursor.saturating_sub(1);
    }

    pub fn settings_down(&mut self) {
        if self.settings_cursor + 1 < self.available_models.len() {
            self.settings_cursor += 1;
        }
    }

    /// Choose the model under the cursor; it is loaded before the next generation
    pub fn select_model(&mut self) -> bool {
        match self.available_models.get(self.settings_cursor) {
            Some(model) => {
                self.selected_model.clone_from(model);
                true
            }
            None => false,
        }
    }

    /// Preferences to save back to the config file
    pub fn apply_preferences(&self, config: &AppConfig) -> AppConfig {
        AppConfig {
            default_model: self.selected_model.clone(),
            enable_thinking: self.enable_thinking,
            theme: self.theme,
            locale: Some(self.locale.code().to_string()),
            ..config.clone()
        }
    }
}
