// Markdown and custom tag rendering for terminal display

use once_cell::sync::Lazy;
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};
use regex::Regex;

use super::theme::Palette;
use crate::i18n::{t, Locale};

static CUSTOM_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(/?)(think|pass|loading)\s*(/?)>").expect("custom tag pattern is valid")
});

static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^\s<>]*\s*/?>").expect("tag pattern is valid"));

/// Complete forms of the markers a stream may stop halfway through
const MARKERS: [&str; 7] = [
    "<think>",
    "</think>",
    "<pass>",
    "</pass>",
    "<loading />",
    "<loading/>",
    "</loading>",
];

/// Drop a trailing run that is the start of a marker still being streamed
fn trim_partial_marker(text: &str) -> &str {
    let Some(start) = text.rfind('<') else {
        return text;
    };
    let tail = &text[start..];
    if MARKERS.iter().any(|marker| marker.len() > tail.len() && marker.starts_with(tail)) {
        &text[..start]
    } else {
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Think,
    Pass,
    Loading,
}

impl Tag {
    fn from_name(name: &str) -> Self {
        match name {
            "think" => Self::Think,
            "pass" => Self::Pass,
            _ => Self::Loading,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Think { body: String, closed: bool },
    Pass(String),
    Loading,
}

#[derive(Debug, Clone)]
enum Inline {
    Text(String),
    Pass(String),
    Loading,
}

pub struct RenderOptions {
    pub palette: Palette,
    pub locale: Locale,
    pub show_thinking: bool,
    /// The message is still receiving fragments
    pub streaming: bool,
}

/// Split text into plain runs and custom tag blocks.
///
/// Stray closing tags are dropped and a block still open at the end of the
/// text takes the rest of it, so raw tag markers never reach the screen.
pub fn parse_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut open: Option<(Tag, usize)> = None;

    for caps in CUSTOM_TAG.captures_iter(text) {
        let Some(marker) = caps.get(0) else { continue };
        let closing = &caps[1] == "/";
        let self_closing = &caps[3] == "/";
        let tag = Tag::from_name(&caps[2]);

        match open {
            Some((open_tag, start)) => {
                if closing && tag == open_tag {
                    let mut body = &text[start..marker.start()];
                    // A repaired close lands right after whatever was streamed last
                    if marker.end() == text.len() {
                        body = trim_partial_marker(body);
                    }
                    segments.push(block(open_tag, body, true));
                    open = None;
                    cursor = marker.end();
                }
            }
            None => {
                push_text(&mut segments, &text[cursor..marker.start()]);
                cursor = marker.end();
                if closing {
                    continue;
                }
                match tag {
                    Tag::Loading => segments.push(Segment::Loading),
                    _ if self_closing => {}
                    _ => open = Some((tag, marker.end())),
                }
            }
        }
    }

    match open {
        Some((tag, start)) => segments.push(block(tag, trim_partial_marker(&text[start..]), false)),
        None => push_text(&mut segments, trim_partial_marker(&text[cursor..])),
    }

    segments
}

fn push_text(segments: &mut Vec<Segment>, run: &str) {
    if !run.is_empty() {
        segments.push(Segment::Text(run.to_string()));
    }
}

fn block(tag: Tag, body: &str, closed: bool) -> Segment {
    match tag {
        Tag::Think => Segment::Think {
            body: body.to_string(),
            closed,
        },
        Tag::Pass => Segment::Pass(body.to_string()),
        Tag::Loading => Segment::Loading,
    }
}

/// Render a chat message into styled terminal lines
pub fn render_message(content: &str, options: &RenderOptions) -> Vec<Line<'static>> {
    let segments = parse_segments(content);
    let last_index = segments.len().saturating_sub(1);

    let mut renderer = LineRenderer::new(options);
    for (index, segment) in segments.into_iter().enumerate() {
        match segment {
            Segment::Text(text) => {
                let mut pieces = text.split('\n').peekable();
                while let Some(piece) = pieces.next() {
                    if !piece.is_empty() {
                        renderer.current.push(Inline::Text(piece.to_string()));
                    }
                    if pieces.peek().is_some() {
                        renderer.flush();
                    }
                }
            }
            Segment::Pass(password) => {
                renderer
                    .current
                    .push(Inline::Pass(password.replace('\n', " ")));
            }
            Segment::Loading => renderer.current.push(Inline::Loading),
            Segment::Think { body, closed } => {
                let in_progress = !closed || (options.streaming && index == last_index);
                renderer.think_block(&body, in_progress);
            }
        }
    }
    renderer.finish()
}

struct LineRenderer<'a> {
    options: &'a RenderOptions,
    lines: Vec<Line<'static>>,
    current: Vec<Inline>,
    in_code_block: bool,
}

impl<'a> LineRenderer<'a> {
    const fn new(options: &'a RenderOptions) -> Self {
        Self {
            options,
            lines: Vec::new(),
            current: Vec::new(),
            in_code_block: false,
        }
    }

    fn flush(&mut self) {
        let inlines = std::mem::take(&mut self.current);
        let line = self.render_line(&inlines);
        self.lines.push(line);
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        if !self.current.is_empty() {
            self.flush();
        }
        self.lines
    }

    fn render_line(&mut self, inlines: &[Inline]) -> Line<'static> {
        let palette = self.options.palette;

        if let [Inline::Text(text)] = inlines {
            if is_code_fence(text) {
                return if self.in_code_block {
                    self.in_code_block = false;
                    Line::from(Span::styled(
                        "└──────────────────────────────────────────────",
                        Style::default().fg(palette.muted),
                    ))
                } else {
                    self.in_code_block = true;
                    let code_lang = extract_code_language(text);
                    let lang_display = code_lang.as_deref().unwrap_or("code");
                    Line::from(Span::styled(
                        format!("┌─ {lang_display} ───────────────────────────────────────────"),
                        Style::default().fg(palette.muted),
                    ))
                };
            }
            if self.in_code_block {
                return Line::from(Span::styled(
                    format!("  {text}"),
                    Style::default().fg(palette.code),
                ));
            }
            return render_markdown_line(text, &palette);
        }

        let mut spans = Vec::new();
        for (index, inline) in inlines.iter().enumerate() {
            match inline {
                Inline::Text(text) => {
                    let text = if index == 0 {
                        strip_list_marker(text).map_or(text.as_str(), |rest| {
                            spans.push(Span::styled("• ", Style::default().fg(palette.border)));
                            rest
                        })
                    } else {
                        text.as_str()
                    };
                    spans.extend(render_inline_spans(text, &palette));
                }
                Inline::Pass(password) => spans.push(Span::styled(
                    password.clone(),
                    Style::default()
                        .fg(palette.password)
                        .add_modifier(Modifier::BOLD),
                )),
                Inline::Loading => spans.push(Span::styled(
                    t(self.options.locale, "block.loading").to_string(),
                    Style::default()
                        .fg(palette.password)
                        .add_modifier(Modifier::BOLD),
                )),
            }
        }
        Line::from(spans)
    }

    fn think_block(&mut self, body: &str, in_progress: bool) {
        let body = ANY_TAG.replace_all(body, "");
        let body = body.trim();
        if body.is_empty() && !in_progress {
            return;
        }
        if !self.current.is_empty() {
            self.flush();
        }

        let palette = self.options.palette;
        let label = if in_progress {
            t(self.options.locale, "block.thinking")
        } else {
            t(self.options.locale, "block.thoughts")
        };
        let marker = if self.options.show_thinking { "▾" } else { "▸" };
        self.lines.push(Line::from(Span::styled(
            format!("  {marker} {label}"),
            Style::default()
                .fg(palette.muted)
                .add_modifier(Modifier::ITALIC),
        )));

        if self.options.show_thinking {
            for line in body.lines() {
                self.lines.push(Line::from(Span::styled(
                    format!("    {line}"),
                    Style::default().fg(palette.muted),
                )));
            }
        }
    }
}

fn strip_list_marker(text: &str) -> Option<&str> {
    text.strip_prefix("- ").or_else(|| text.strip_prefix("* "))
}

/// Check if a line is a markdown table row
pub fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.matches('|').count() >= 2
}

/// Check if a line is a table separator (|---|---|)
pub fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') || !trimmed.ends_with('|') {
        return false;
    }

    trimmed.chars().all(|c| c == '|' || c == '-' || c == ' ' || c == ':')
}

fn render_table_row(line: &str, palette: &Palette) -> Line<'static> {
    let content = line.trim().trim_start_matches('|').trim_end_matches('|');
    let cells: Vec<&str> = content.split('|').map(str::trim).collect();

    Line::from(Span::styled(
        format!("  {}", cells.join(" | ")),
        Style::default().fg(palette.border),
    ))
}

/// Render a single line of markdown with basic styling
fn render_markdown_line(line: &str, palette: &Palette) -> Line<'static> {
    if is_table_separator(line) {
        return Line::from("");
    }

    if is_table_row(line) {
        return render_table_row(line, palette);
    }

    if let Some(rest) = line.strip_prefix('#') {
        let level = 1 + rest.chars().take_while(|&c| c == '#').count();
        let header_text = rest.trim_start_matches('#').trim();
        let color = match level {
            1 => palette.heading,
            2 => palette.border,
            _ => palette.user,
        };
        return Line::from(Span::styled(
            header_text.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
    }

    if let Some(rest) = strip_list_marker(line) {
        let mut spans = vec![Span::styled("• ", Style::default().fg(palette.border))];
        spans.extend(render_inline_spans(rest.trim(), palette));
        return Line::from(spans);
    }

    let spans = render_inline_spans(line, palette);
    if spans.is_empty() {
        Line::from("")
    } else {
        Line::from(spans)
    }
}

/// Style `**bold**` and `` `code` `` runs within a line
fn render_inline_spans(line: &str, palette: &Palette) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut current_text = String::new();
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();

                let mut bold_text = String::new();
                let mut found_close = false;
                while let Some(ch) = chars.next() {
                    if ch == '*' && chars.peek() == Some(&'*') {
                        chars.next();
                        found_close = true;
                        break;
                    }
                    bold_text.push(ch);
                }

                if found_close {
                    if !current_text.is_empty() {
                        spans.push(Span::raw(std::mem::take(&mut current_text)));
                    }
                    spans.push(Span::styled(
                        bold_text,
                        Style::default()
                            .fg(palette.heading)
                            .add_modifier(Modifier::BOLD),
                    ));
                } else {
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            }
            '`' => {
                let mut code_text = String::new();
                let mut found_close = false;
                for ch in chars.by_ref() {
                    if ch == '`' {
                        found_close = true;
                        break;
                    }
                    code_text.push(ch);
                }

                if found_close {
                    if !current_text.is_empty() {
                        spans.push(Span::raw(std::mem::take(&mut current_text)));
                    }
                    spans.push(Span::styled(code_text, Style::default().fg(palette.code)));
                } else {
                    current_text.push('`');
                    current_text.push_str(&code_text);
                }
            }
            _ => current_text.push(ch),
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }
    spans
}

/// Detect if a line is a code block fence
pub fn is_code_fence(line: &str) -> bool {
    line.trim().starts_with("```")
}

/// Extract language from code fence
pub fn extract_code_language(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix("```")
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(ToString::to_string)
}
