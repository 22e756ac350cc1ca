//! Services panel: summary tiles, service table and fleet actions

use crate::app::AppState;
use crate::theme::{Colors, Styles, Theme};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

const FLEET_ACTIONS: [(&str, &str); 3] = [
    ("pm2-install", "I"),
    ("pm2-reload", "L"),
    ("pm2-stop-all", "A"),
];

pub fn render_services_panel(f: &mut Frame, state: &AppState, area: Rect, focused: bool) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Summary tiles
            Constraint::Min(4),    // Table
            Constraint::Length(3), // Fleet actions
        ])
        .split(area);

    render_summary_tiles(f, state, chunks[0]);
    render_service_table(f, state, chunks[1], focused);
    render_fleet_actions(f, state, chunks[2]);
}

fn render_summary_tiles(f: &mut Frame, state: &AppState, area: Rect) {
    let summary = &state.summary;
    let tiles = [
        ("Online", summary.online.to_string(), Colors::SUCCESS),
        ("Stopped", summary.stopped.to_string(), Colors::FG_SECONDARY),
        ("Errored", summary.errored.to_string(), Colors::ERROR),
        ("Restarts", summary.total_restarts.to_string(), Colors::WARNING),
    ];

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    for ((label, value, color), column) in tiles.into_iter().zip(columns.iter()) {
        let tile = Paragraph::new(vec![
            Line::from(Span::styled(
                value,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(label, Styles::text_muted())),
        ])
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );
        f.render_widget(tile, *column);
    }
}

fn render_service_table(f: &mut Frame, state: &AppState, area: Rect, focused: bool) {
    let header = Row::new(["", "Service", "Status", "PID", "CPU", "Memory", "Uptime", "Restarts"])
        .style(Styles::category());

    let rows: Vec<Row> = state
        .services
        .iter()
        .enumerate()
        .map(|(index, service)| {
            let status_style = Theme::service_style(service.status);
            let row = Row::new(vec![
                Cell::from(Theme::service_icon(service.status)).style(status_style),
                Cell::from(service.name.clone()),
                Cell::from(service.status.to_string()).style(status_style),
                Cell::from(service.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into())),
                Cell::from(service.cpu_label()),
                Cell::from(service.memory_label()),
                Cell::from(service.uptime_label()),
                Cell::from(service.restarts.to_string()),
            ]);
            if focused && index == state.service_selection {
                row.style(Styles::selected())
            } else {
                row.style(Styles::text())
            }
        })
        .collect();

    let mut title = " Services ".to_string();
    if let Some(error) = state.selected_service().and_then(|s| s.last_error.as_ref()) {
        title = format!(" Services · {} ", error);
    }

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Min(16),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Styles::border(focused)),
    );
    f.render_widget(table, area);
}

fn render_fleet_actions(f: &mut Frame, state: &AppState, area: Rect) {
    let mut spans = Vec::new();
    for (id, key) in FLEET_ACTIONS {
        let status = state.action_status(id);
        spans.push(Span::styled(format!(" [{}] ", key), Styles::key_hint()));
        spans.push(Span::styled(id.to_string(), Styles::text()));
        spans.push(Span::styled(
            format!(" {} {}   ", Theme::action_icon(status), status),
            Theme::action_style(status),
        ));
    }
    let widget = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Fleet ")
            .border_style(Styles::border(false)),
    );
    f.render_widget(widget, area);
}
