use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, LineGauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::markdown::{render_message, RenderOptions};
use crate::app::App;
use crate::i18n::Locale;
use crate::models::MessageRole;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn spinner(tick: usize) -> &'static str {
    SPINNER[(tick / 4) % SPINNER.len()]
}

/// Centre a popup of at most `width` x `height` inside `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

pub fn render_engine_check(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let text = Line::from(vec![
        Span::styled(spinner(app.tick), Style::default().fg(palette.accent)),
        Span::raw(" "),
        Span::styled(app.tr("engine.checking"), Style::default().fg(palette.muted)),
    ]);

    let popup = centered(area, area.width, 1);
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), popup);
}

pub fn render_engine_alert(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let text = vec![
        Line::from(Span::styled(
            app.tr("engine.unavailable.title"),
            Style::default()
                .fg(palette.error)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            app.tr("engine.unavailable.description"),
            Style::default().fg(palette.text),
        )),
        Line::from(""),
        Line::from(Span::styled(
            app.tr("help.quit"),
            Style::default().fg(palette.muted),
        )),
    ];

    let alert = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.error)),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(alert, centered(area, 64, 9));
}

pub fn render_help_window(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let heading = |key: &str| {
        Line::from(Span::styled(
            app.tr(key).to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ))
    };
    let entry = |key: &str| Line::from(format!("  {}", app.tr(key)));

    let help_text = vec![
        Line::from(Span::styled(
            app.tr("help.title"),
            Style::default()
                .fg(palette.border)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        heading("help.general"),
        entry("help.toggleHelp"),
        entry("help.settings"),
        entry("help.reasoning"),
        entry("help.theme"),
        entry("help.language"),
        entry("help.quit"),
        Line::from(""),
        heading("help.chat"),
        entry("help.send"),
        entry("help.stop"),
        entry("help.thinking"),
        Line::from(""),
        heading("help.navigation"),
        entry("help.scroll"),
        entry("help.jump"),
        Line::from(""),
        Line::from(Span::styled(
            app.tr("help.close"),
            Style::default().fg(palette.muted),
        )),
    ];

    let help_paragraph = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .border_style(Style::default().fg(palette.border)),
        )
        .wrap(Wrap { trim: false });

    let popup_area = centered(area, 62, 23);
    frame.render_widget(Clear, popup_area);
    frame.render_widget(help_paragraph, popup_area);
}

pub fn render_settings(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let popup_area = centered(area, 56, 18);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.tr("settings.title")))
        .title_bottom(Line::from(format!(" {} ", app.tr("settings.hint"))).centered())
        .border_style(Style::default().fg(palette.border));
    let inner = block.inner(popup_area);

    frame.render_widget(Clear, popup_area);
    frame.render_widget(block, popup_area);

    let on_off = if app.enable_thinking { "✓" } else { "✗" };
    let languages = Locale::ALL
        .iter()
        .map(|locale| {
            if *locale == app.locale {
                format!("[{locale}]")
            } else {
                locale.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let summary = vec![
        Line::from(format!("{}: {on_off}  (Ctrl+R)", app.tr("feature.reasoning"))),
        Line::from(format!(
            "{}: {}  (Ctrl+T)",
            app.tr("settings.theme"),
            app.tr(app.theme.i18n_key())
        )),
        Line::from(format!("{}: {languages}  (Ctrl+L)", app.tr("settings.language"))),
        Line::from(""),
        Line::from(Span::styled(
            format!("{}:", app.tr("settings.model")),
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];
    #[allow(clippy::cast_possible_truncation)]
    let summary_height = (summary.len() as u16).min(inner.height);
    let summary_area = Rect {
        height: summary_height,
        ..inner
    };
    let list_area = Rect {
        y: inner.y + summary_height,
        height: inner.height - summary_height,
        ..inner
    };
    frame.render_widget(
        Paragraph::new(summary).style(Style::default().fg(palette.text)),
        summary_area,
    );

    if app.available_models.is_empty() {
        frame.render_widget(
            Paragraph::new(format!("  {}", app.tr("settings.noModels")))
                .style(Style::default().fg(palette.muted)),
            list_area,
        );
        return;
    }

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let marker = if *model == app.selected_model { "● " } else { "  " };
            ListItem::new(format!("{marker}{model}"))
        })
        .collect();

    let list = List::new(items)
        .style(Style::default().fg(palette.text))
        .highlight_style(
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD | Modifier::REVERSED),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(app.settings_cursor));
    frame.render_stateful_widget(list, list_area, &mut state);
}

pub fn render_bottom_bar(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let (text, style) = if app.exit_pending {
        (
            app.tr("bar.exit"),
            Style::default()
                .fg(palette.error)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        (app.tr("bar.keys"), Style::default().fg(palette.muted))
    };

    let bar = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(style);

    frame.render_widget(bar, area);
}

/// Gauge shown while the engine fetches and loads model weights
pub fn render_load_progress(frame: &mut Frame, app: &App, area: Rect) {
    let Some(report) = app.engine.progress.as_ref() else {
        return;
    };
    if !app.engine.is_loading || report.is_complete() {
        return;
    }

    let palette = app.palette();
    let gauge = LineGauge::default()
        .filled_style(Style::default().fg(palette.accent))
        .unfilled_style(Style::default().fg(palette.muted))
        .label(report.text.clone())
        .ratio(report.progress);

    frame.render_widget(gauge, area);
}

pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let mut spans = Vec::new();

    if let Some(error) = &app.engine.error {
        spans.push(Span::styled(
            format!("{}: {error}  ", app.tr("error.prefix")),
            Style::default().fg(palette.error),
        ));
    }

    if app.engine.is_loading {
        spans.push(Span::styled(
            format!("{} {} ", spinner(app.tick), app.tr("status.loadingModel")),
            Style::default().fg(palette.accent),
        ));
    } else if app.turn_active {
        spans.push(Span::styled(
            format!("{} {} ", spinner(app.tick), app.tr("status.generating")),
            Style::default().fg(palette.accent),
        ));
    }

    if app.enable_thinking {
        spans.push(Span::styled(
            format!("[{}] ", app.tr("feature.reasoning")),
            Style::default().fg(palette.muted),
        ));
    }

    let model = if app.selected_model.is_empty() {
        app.tr("placeholder.model")
    } else {
        app.selected_model.as_str()
    };
    let loaded = app.engine.current_model.as_deref() == Some(model);
    spans.push(Span::styled(
        model.to_string(),
        Style::default()
            .fg(if loaded { palette.assistant } else { palette.muted })
            .add_modifier(Modifier::BOLD),
    ));

    let status = Paragraph::new(Line::from(spans)).alignment(Alignment::Right);
    frame.render_widget(status, area);
}

fn render_welcome(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let welcome_text = vec![
        Line::from(Span::styled(
            app.tr("app.welcome"),
            Style::default()
                .fg(palette.heading)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            app.tr("app.welcomeDescription"),
            Style::default().fg(palette.border),
        )),
    ];

    let welcome_paragraph = Paragraph::new(welcome_text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    // Bottom of the history area
    let welcome_height = 4.min(area.height);
    let welcome_area = Rect {
        y: area.y + area.height - welcome_height,
        height: welcome_height,
        ..area
    };

    frame.render_widget(welcome_paragraph, welcome_area);
}

pub fn render_chat_history(frame: &mut Frame, app: &mut App, area: Rect) {
    if app.transcript.is_empty() {
        render_welcome(frame, app, area);
        return;
    }

    let palette = app.palette();
    let last_index = app.transcript.len() - 1;
    let mut lines = Vec::new();

    for (index, message) in app.transcript.iter().enumerate() {
        let (role, color) = match message.role {
            MessageRole::User => (app.tr("role.user"), palette.user),
            MessageRole::Assistant => (app.tr("role.assistant"), palette.assistant),
            MessageRole::System => continue,
        };

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("## {role}"),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));

        let options = RenderOptions {
            palette,
            locale: app.locale,
            show_thinking: app.show_thinking,
            streaming: app.is_typing && index == last_index,
        };
        lines.extend(render_message(&message.content, &options));
    }

    // Account for wrapping to find the true visual height
    let available_width = (area.width as usize).max(1);
    let total_visual_lines: usize = lines
        .iter()
        .map(|line| line.width().div_ceil(available_width).max(1))
        .sum();

    let visible_height = area.height as usize;
    let max_scroll = total_visual_lines.saturating_sub(visible_height);
    let actual_scroll = app.scroll_offset.min(max_scroll);

    // Sync the clamped scroll back to the app state
    app.scroll_offset = actual_scroll;

    let chat_history = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(actual_scroll).unwrap_or(u16::MAX), 0));

    frame.render_widget(chat_history, area);
}

pub fn render_input_field(frame: &mut Frame, app: &App, area: Rect) {
    let palette = app.palette();
    let disabled = app.input_disabled();

    let (input_text, input_style) = if app.input_buffer.is_empty() {
        (
            app.tr("ui.prompt.placeholder"),
            Style::default().fg(palette.muted),
        )
    } else {
        (
            app.input_buffer.as_str(),
            Style::default()
                .fg(palette.border)
                .add_modifier(Modifier::BOLD),
        )
    };

    let hint = if app.is_typing {
        app.tr("button.stop")
    } else if disabled {
        app.tr("button.disabled")
    } else {
        app.tr("button.send")
    };

    let input = Paragraph::new(input_text)
        .style(input_style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title_bottom(Line::from(format!(" {hint} ")).right_aligned())
                .border_style(Style::default().fg(if disabled {
                    palette.muted
                } else {
                    palette.border
                })),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(input, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_cycles() {
        assert_eq!(spinner(0), SPINNER[0]);
        assert_eq!(spinner(4), SPINNER[1]);
        assert_eq!(spinner(4 * SPINNER.len()), SPINNER[0]);
    }

    #[test]
    fn test_centered_popup() {
        let area = Rect::new(0, 0, 100, 40);
        assert_eq!(centered(area, 60, 20), Rect::new(20, 10, 60, 20));
    }

    #[test]
    fn test_centered_popup_clamps_to_area() {
        let area = Rect::new(2, 3, 10, 5);
        assert_eq!(centered(area, 60, 20), area);
    }
}
