//! Log viewer

use super::LogPanel;
use crate::app::AppState;
use crate::theme::{Colors, Styles, Theme, UiText};
use crate::types::{LogChannel, LogLevel};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

pub fn render_log_panel(
    f: &mut Frame,
    state: &AppState,
    channel: LogChannel,
    panel: &LogPanel,
    area: Rect,
    focused: bool,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Controls
            Constraint::Min(3),    // Entries
            Constraint::Length(1), // Level statistics
        ])
        .split(area);

    render_controls(f, state, panel, chunks[0]);
    render_entries(f, state, channel, panel, chunks[1], focused);
    render_level_stats(f, panel, chunks[2]);
}

fn render_controls(f: &mut Frame, state: &AppState, panel: &LogPanel, area: Rect) {
    let view = &state.logs;
    let live = if view.streaming {
        Span::styled(
            "● LIVE",
            Style::default()
                .fg(Colors::LIVE)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("○ paused", Styles::text_muted())
    };

    let filter_text = if view.editing_filter {
        format!("{}▏", view.filter.text)
    } else if view.filter.text.is_empty() {
        "-".to_string()
    } else {
        view.filter.text.clone()
    };
    let filter_style = if view.editing_filter {
        Style::default().fg(Colors::SECONDARY)
    } else {
        Styles::text()
    };

    let line = Line::from(vec![
        Span::raw(" "),
        live,
        Span::styled("   Level: ", Styles::text_muted()),
        Span::styled(view.filter.level_label(), Styles::text()),
        Span::styled("   Filter: ", Styles::text_muted()),
        Span::styled(filter_text, filter_style),
        Span::styled(
            format!("   {} of {} logs", panel.entries.len(), panel.total),
            Styles::text_secondary(),
        ),
    ]);
    let widget = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Styles::border(view.editing_filter)),
    );
    f.render_widget(widget, area);
}

fn render_entries(
    f: &mut Frame,
    state: &AppState,
    channel: LogChannel,
    panel: &LogPanel,
    area: Rect,
    focused: bool,
) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = if panel.entries.is_empty() {
        vec![Line::from(Span::styled(UiText::NO_LOGS, Styles::text_muted()))]
    } else {
        // Window ends `scroll_back` entries before the newest one
        let end = panel
            .entries
            .len()
            .saturating_sub(state.logs.scroll_back)
            .max(visible.min(panel.entries.len()));
        let start = end.saturating_sub(visible);
        panel.entries[start..end]
            .iter()
            .map(|entry| {
                Line::from(vec![
                    Span::styled(format!("{} ", entry.time_label()), Styles::text_muted()),
                    Span::styled(
                        format!("{:<5} ", entry.level.label()),
                        Theme::log_style(entry.level),
                    ),
                    Span::styled(format!("[{}] ", entry.source), Style::default().fg(Colors::PRIMARY)),
                    Span::styled(entry.message.clone(), Styles::text()),
                ])
            })
            .collect()
    };

    let title = if state.logs.is_following() {
        format!(" {} ", channel.title())
    } else {
        format!(" {} (scrolled, End to follow) ", channel.title())
    };
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Styles::border(focused)),
    );
    f.render_widget(widget, area);
}

fn render_level_stats(f: &mut Frame, panel: &LogPanel, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
        spans.push(Span::styled(
            format!("{} {}", level.label(), panel.counts.get(level)),
            Theme::log_style(level),
        ));
        spans.push(Span::raw("   "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
