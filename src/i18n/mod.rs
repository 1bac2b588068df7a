// Translated UI strings

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

type Catalog = HashMap<String, String>;

static EN: Lazy<Catalog> = Lazy::new(|| parse_catalog(include_str!("locales/en.json")));
static ES: Lazy<Catalog> = Lazy::new(|| parse_catalog(include_str!("locales/es.json")));

fn parse_catalog(source: &str) -> Catalog {
    serde_json::from_str(source).unwrap_or_else(|e| {
        tracing::error!("Invalid translation catalog: {e}");
        Catalog::new()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    pub const ALL: [Self; 2] = [Self::En, Self::Es];

    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }

    pub const fn native_name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Es => "Español",
        }
    }

    /// Parse a language tag such as `es`, `es-MX` or `es_ES.UTF-8`
    pub fn from_tag(tag: &str) -> Option<Self> {
        let language = tag
            .split(['-', '_', '.', '@'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            _ => None,
        }
    }

    /// First supported locale among the override and the usual environment variables
    pub fn detect(configured: Option<&str>) -> Self {
        let from_env = ["LC_ALL", "LC_MESSAGES", "LANG"]
            .into_iter()
            .filter_map(|var| std::env::var(var).ok());
        Self::detect_from(configured.map(ToString::to_string).into_iter().chain(from_env))
    }

    fn detect_from(candidates: impl IntoIterator<Item = String>) -> Self {
        candidates
            .into_iter()
            .filter(|tag| !tag.is_empty() && tag != "C" && tag != "POSIX")
            .find_map(|tag| Self::from_tag(&tag))
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::En => Self::Es,
            Self::Es => Self::En,
        }
    }

    fn catalog(self) -> &'static Catalog {
        match self {
            Self::En => &EN,
            Self::Es => &ES,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_name())
    }
}

/// Look up `key` in the catalog of `locale`, falling back to English and then to the key itself
pub fn t<'a>(locale: Locale, key: &'a str) -> &'a str {
    locale
        .catalog()
        .get(key)
        .or_else(|| EN.get(key))
        .map_or(key, String::as_str)
}
