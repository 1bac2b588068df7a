pub mod markdown;
pub mod theme;
pub mod widgets;

use crate::app::{App, AppMode};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

pub fn render(frame: &mut Frame, app: &mut App) {
    match app.engine.available {
        None => {
            widgets::render_engine_check(frame, app, frame.area());
            return;
        }
        Some(false) => {
            widgets::render_engine_alert(frame, app, frame.area());
            return;
        }
        Some(true) => {}
    }

    // Width available for text is total width - 2 (for borders)
    let available_width = frame.area().width.saturating_sub(2).max(1) as usize;

    let input_lines = app.input_buffer.chars().count().div_ceil(available_width);

    // Clamp lines: Min 1, Max 50% of screen height (approx)
    let max_lines = (frame.area().height as usize / 2).saturating_sub(2).max(1);
    let actual_lines = input_lines.clamp(1, max_lines);

    #[allow(clippy::cast_possible_truncation)]
    let input_height = (actual_lines + 2) as u16;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),               // Chat history
            Constraint::Length(1),            // Model load progress
            Constraint::Length(1),            // Status line
            Constraint::Length(input_height), // Input field
            Constraint::Length(1),            // Bottom keymap bar
        ])
        .split(frame.area());

    widgets::render_chat_history(frame, app, chunks[0]);
    widgets::render_load_progress(frame, app, chunks[1]);
    widgets::render_status_bar(frame, app, chunks[2]);
    widgets::render_input_field(frame, app, chunks[3]);
    widgets::render_bottom_bar(frame, app, chunks[4]);

    if app.mode == AppMode::Settings {
        widgets::render_settings(frame, app, frame.area());
    }

    if app.show_help {
        widgets::render_help_window(frame, app, frame.area());
    }
}
