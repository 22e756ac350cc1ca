//! Database panel: install / uninstall / clean with live output

use crate::app::{AppState, DATABASE_ACTIONS};
use crate::config::ActionSpec;
use crate::theme::{Styles, Theme, UiText};
use crate::types::ActionStatus;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

pub fn render_database_panel(
    f: &mut Frame,
    state: &AppState,
    actions: &[ActionSpec],
    area: Rect,
    focused: bool,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(DATABASE_ACTIONS.len() as u16 * 2 + 2),
            Constraint::Min(3),
        ])
        .split(area);

    let items: Vec<ListItem> = DATABASE_ACTIONS
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let spec = actions.iter().find(|a| a.id == *id);
            let label = spec.map(|s| s.display_label()).unwrap_or(*id);
            let description = spec.map(|s| s.description.as_str()).unwrap_or_default();
            let status = state.action_status(id);
            let selected = index == state.db_selection;

            let mut head = vec![
                Span::styled(format!(" {} ", Theme::action_icon(status)), Theme::action_style(status)),
                Span::styled(
                    label.to_string(),
                    if selected && focused { Styles::selected() } else { Styles::text() },
                ),
                Span::styled(format!("  {}", status), Theme::action_style(status)),
            ];
            if spec.is_some_and(|s| s.destructive) {
                head.push(Span::styled("  (confirm)", Styles::warning()));
            }
            ListItem::new(vec![
                Line::from(head),
                Line::from(Span::styled(format!("     {}", description), Styles::text_muted())),
            ])
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Database ")
            .border_style(Styles::border(focused)),
    );
    f.render_widget(list, chunks[0]);

    render_action_output(f, state, state.selected_db_action(), chunks[1]);
}

/// Output of `id`, newest lines kept in view
fn render_action_output(f: &mut Frame, state: &AppState, id: &str, area: Rect) {
    let status = state.action_status(id);
    let lines: Vec<Line> = match state.action_output.get(id) {
        Some(output) if !output.is_empty() => {
            let visible = area.height.saturating_sub(2) as usize;
            let skip = output.len().saturating_sub(visible);
            output
                .iter()
                .skip(skip)
                .map(|line| {
                    let style = if line.starts_with("! ") {
                        Styles::warning()
                    } else {
                        Styles::text_secondary()
                    };
                    Line::from(Span::styled(line.clone(), style))
                })
                .collect()
        }
        _ => vec![Line::from(Span::styled(UiText::NO_OUTPUT, Styles::text_muted()))],
    };

    let title = match status {
        ActionStatus::Running => format!(" Output: {} (running) ", id),
        _ => format!(" Output: {} ", id),
    };
    let widget = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Theme::action_style(status)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}
