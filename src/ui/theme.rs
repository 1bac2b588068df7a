use ratatui::style::Color;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeName {
    #[default]
    Dark,
    Light,
}

impl ThemeName {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub const fn i18n_key(self) -> &'static str {
        match self {
            Self::Dark => "theme.dark",
            Self::Light => "theme.light",
        }
    }

    pub const fn palette(self) -> Palette {
        match self {
            Self::Dark => Palette {
                text: Color::White,
                muted: Color::DarkGray,
                border: Color::Cyan,
                user: Color::Cyan,
                assistant: Color::Green,
                password: Color::LightBlue,
                heading: Color::Yellow,
                code: Color::Magenta,
                accent: Color::Magenta,
                error: Color::Red,
            },
            Self::Light => Palette {
                text: Color::Black,
                muted: Color::Gray,
                border: Color::Blue,
                user: Color::Blue,
                assistant: Color::Green,
                password: Color::Blue,
                heading: Color::Magenta,
                code: Color::Red,
                accent: Color::Magenta,
                error: Color::Red,
            },
        }
    }
}

/// Colours used across the widgets for one theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub text: Color,
    pub muted: Color,
    pub border: Color,
    pub user: Color,
    pub assistant: Color,
    pub password: Color,
    pub heading: Color,
    pub code: Color,
    pub accent: Color,
    pub error: Color,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_theme() {
        assert_eq!(ThemeName::Dark.toggled(), ThemeName::Light);
        assert_eq!(ThemeName::Light.toggled(), ThemeName::Dark);
    }

    #[test]
    fn test_palettes_differ() {
        assert_ne!(ThemeName::Dark.palette(), ThemeName::Light.palette());
        assert_ne!(ThemeName::Dark.palette().text, ThemeName::Light.palette().text);
    }

    #[test]
    fn test_theme_serialization() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            theme: ThemeName,
        }
        let toml = toml::to_string(&Wrapper { theme: ThemeName::Light }).unwrap();
        assert_eq!(toml.trim(), "theme = \"light\"");
    }
}
