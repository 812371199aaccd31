use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use time_humanize::{Accuracy, HumanTime, Tense};
use typemaster::corpus::{Mode, ModeCategory};
use typemaster::session::Outcome;
use typemaster::settings::CaretStyle;
use typemaster::supply;
use unicode_width::UnicodeWidthStr;

use crate::{App, Screen};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.screen {
            Screen::Typing => render_typing(self, area, buf),
            Screen::Results => render_results(self, area, buf),
            Screen::History => render_history(self, area, buf),
            Screen::Preview(category) => render_preview(category, area, buf),
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_bold() -> Style {
    bold().add_modifier(Modifier::DIM)
}

fn render_typing(app: &App, area: Rect, buf: &mut Buffer) {
    let session = app.controller.session();

    if app.controller.loading() {
        let loading = Paragraph::new(Span::styled(
            "fetching practice text...",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        loading.render(centered_line(area), buf);
        return;
    }

    if supply::is_placeholder(session.text()) {
        let failed = Paragraph::new(Span::styled(
            session.text().to_string(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        failed.render(centered_line(area), buf);
        return;
    }

    let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
    let lines = prompt_lines(app);
    let prompt_occupied_lines: u16 = session
        .text()
        .split('\n')
        .map(|l| ((l.width() as f64 / max_chars_per_line as f64).ceil()).max(1.0) as u16)
        .sum();

    let top_pad = (area
        .height
        .saturating_sub(prompt_occupied_lines + 6))
        / 2;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints(
            [
                Constraint::Length(1),
                Constraint::Length(top_pad),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(prompt_occupied_lines),
                Constraint::Min(0),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    let mode_bar = Mode::ALL
        .iter()
        .map(|m| {
            if *m == session.mode {
                format!("[{}]", m.file_name())
            } else {
                m.file_name()
            }
        })
        .join("  ");
    Paragraph::new(Span::styled(mode_bar, dim_bold()))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let mut status = format!("{}s", session.seconds_remaining());
    if app.settings.show_live_wpm && session.is_active() {
        let live = session.live();
        status = format!("{}   {} wpm   {}% acc", status, live.wpm, live.accuracy);
    }
    Paragraph::new(Span::styled(status, dim_bold()))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    Paragraph::new(lines)
        .alignment(if prompt_occupied_lines == 1 {
            // when the prompt is small enough to fit on one line
            // centering the text gives a nice zen feeling
            Alignment::Center
        } else {
            Alignment::Left
        })
        .wrap(Wrap { trim: false })
        .render(chunks[4], buf);

    if !session.has_started() {
        let help = Paragraph::new(Span::styled(
            "type to begin   ←/→ mode   ↑/↓ time   ctrl+enter restart   esc quit",
            Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
        ))
        .alignment(Alignment::Center);
        help.render(chunks[6], buf);
    }
}

/// Per-character styling: typed positions keep their verdict color, the
/// cursor carries the configured caret, the rest stays dim. Newlines show
/// as a return symbol and break the line; a mistyped space shows as "·".
fn prompt_lines(app: &App) -> Vec<Line<'static>> {
    let session = app.controller.session();
    let green_bold = bold().fg(Color::Green);
    let red_bold = bold().fg(Color::Red);
    let caret = match app.settings.caret_style {
        CaretStyle::Line | CaretStyle::Underline => dim_bold().add_modifier(Modifier::UNDERLINED),
        CaretStyle::Block => bold().add_modifier(Modifier::REVERSED),
    };

    let mut lines = Vec::new();
    let mut spans: Vec<Span> = Vec::new();

    for idx in 0..session.len() {
        let c = session.char_at(idx).unwrap_or(' ');
        let style = if idx == session.cursor() {
            caret
        } else {
            match session.outcome_at(idx) {
                Some(Outcome::Correct) => green_bold,
                Some(Outcome::Incorrect) => red_bold,
                None => dim_bold(),
            }
        };
        let rendered = match c {
            '\n' => "⏎".to_string(),
            ' ' if session.outcome_at(idx) == Some(Outcome::Incorrect) => "·".to_string(),
            c => c.to_string(),
        };
        spans.push(Span::styled(rendered, style));

        if c == '\n' {
            lines.push(Line::from(std::mem::take(&mut spans)));
        }
    }
    lines.push(Line::from(spans));
    lines
}

fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints(
            [
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    let Some(result) = &app.last_result else {
        return;
    };

    let stats = Paragraph::new(Span::styled(
        format!(
            "{} wpm   {}% acc   {} raw",
            result.wpm, result.accuracy, result.raw_wpm
        ),
        bold(),
    ))
    .alignment(Alignment::Center);
    stats.render(chunks[1], buf);

    let detail = Paragraph::new(Span::styled(
        format!(
            "{} · {}s · {} chars · {} errors",
            result.mode.file_name(),
            result.duration_secs,
            result.characters,
            result.errors
        ),
        dim_bold(),
    ))
    .alignment(Alignment::Center);
    detail.render(chunks[2], buf);

    if let Some(best) = app.best_wpm {
        let best_line = Paragraph::new(Span::styled(
            format!("personal best: {} wpm", best),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center);
        best_line.render(chunks[3], buf);
    }

    let prefs = Paragraph::new(Span::styled(
        format!(
            "sound: {} · caret: {:?} · theme: {}",
            if app.settings.sound_enabled { "on" } else { "off" },
            app.settings.caret_style,
            app.settings.theme
        ),
        Style::default().add_modifier(Modifier::DIM),
    ))
    .alignment(Alignment::Center);
    prefs.render(chunks[4], buf);

    let legend = Paragraph::new(Span::styled(
        "(r)etry  (n)ew  (h)istory  (esc) quit",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center);
    legend.render(chunks[5], buf);
}

fn render_history(app: &App, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Length(2), Constraint::Min(1), Constraint::Length(1)].as_ref())
        .split(area);

    Paragraph::new(Span::styled("recent tests", bold()))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let rows: Vec<Line> = if app.history.is_empty() {
        vec![Line::from(Span::styled(
            "no results recorded yet",
            Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC),
        ))]
    } else {
        app.history
            .iter()
            .map(|r| {
                let seconds_ago = chrono::Local::now()
                    .signed_duration_since(r.timestamp)
                    .num_seconds()
                    .max(0) as u64;
                let ago = HumanTime::from(std::time::Duration::from_secs(seconds_ago))
                    .to_text_en(Accuracy::Rough, Tense::Past);
                Line::from(Span::raw(format!(
                    "{:>3} wpm  {:>3}% acc  {:<9} {:>4}s   {}",
                    r.wpm,
                    r.accuracy,
                    r.mode.file_name(),
                    r.duration_secs,
                    ago
                )))
            })
            .collect()
    };
    Paragraph::new(rows)
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    Paragraph::new(Span::styled(
        "(b)ack  (e)xport csv  (esc) quit",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .render(chunks[2], buf);
}

fn render_preview(category: ModeCategory, area: Rect, buf: &mut Buffer) {
    let (title, blurb) = match category {
        ModeCategory::Romantic => (
            "flirty mode",
            "Romantic passages ahead. Type with feeling.",
        ),
        ModeCategory::Programming => (
            "developer mode",
            "Real code: brackets, semicolons, and indentation. Tab matches two leading spaces, enter types a newline.",
        ),
        ModeCategory::Plain => ("practice", "Plain sentences."),
    };

    let lines = vec![
        Line::from(Span::styled(title, bold().fg(Color::Magenta))),
        Line::from(""),
        Line::from(Span::raw(blurb)),
        Line::from(""),
        Line::from(Span::styled(
            "press any key to start",
            Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
        )),
    ];

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(centered_block(area, 5), buf);
}

fn centered_line(area: Rect) -> Rect {
    centered_block(area, 1)
}

fn centered_block(area: Rect, height: u16) -> Rect {
    let top = area.height.saturating_sub(height) / 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints(
            [
                Constraint::Length(top),
                Constraint::Length(height),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(area);
    chunks[1]
}
