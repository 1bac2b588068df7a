use serde::{Deserialize, Serialize};

use crate::ui::theme::ThemeName;

pub const DEFAULT_MODEL: &str = "qwen3:0.6b";

pub const SYSTEM_PROMPT: &str = "You are Passistant, an AI-powered password assistant, specialized in creating passwords that are both secure and memorable.
Your task is to generate 5 unique passwords that strike a balance between cryptographic strength and ease of memorability for average users.
Reply in the same language as the user.

Requirements for each password:
- They must be at least 12 characters long.
- Include uppercase letters, lowercase letters, numbers and special characters.
- Be easily readable and memorable, without relying on personal information.
- Each password must be enclosed inside the <pass> tag without formatting for easy identification and automatic use. Example: <pass>password</pass>";

/// Placeholder content of an assistant message that has not received any text yet
pub const LOADING_PLACEHOLDER: &str = "<loading />";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    pub const fn new(role: MessageRole, content: String) -> Self {
        Self { role, content }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub ollama_url: String,
    pub default_model: String,
    #[serde(default = "default_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub enable_thinking: bool,
    #[serde(default)]
    pub theme: ThemeName,
    /// Overrides the locale detected from the environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

const fn default_timeout() -> u64 {
    600
}

const fn default_temperature() -> f32 {
    0.5
}

const fn default_top_p() -> f32 {
    0.9
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            request_timeout: default_timeout(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            enable_thinking: false,
            theme: ThemeName::default(),
            locale: None,
            log_level: default_log_level(),
        }
    }
}
