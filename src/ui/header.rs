//! Title bar, status line and overlays shared by every view

use crate::app::AppState;
use crate::components::help_overlay::HelpOverlay;
use crate::components::keybindings::KeybindingContext;
use crate::components::nav_bar::NavBar;
use crate::theme::{Colors, Styles};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Header renderer for the title bar
pub struct HeaderRenderer {
    title: Line<'static>,
}

impl Default for HeaderRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderRenderer {
    pub fn new() -> Self {
        Self {
            title: Line::from(vec![
                Span::styled(" ◆ ", Style::default().fg(Colors::SECONDARY)),
                Span::styled("opsdeck", Styles::title()),
                Span::styled("  operations console", Styles::text_muted()),
            ]),
        }
    }

    /// Title on the left, fleet summary on the right
    pub fn render_title_bar(&self, f: &mut Frame, state: &AppState, area: Rect) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Styles::border(false));
        let inner = block.inner(area);
        f.render_widget(block, area);

        let mut title = self.title.clone();
        if state.dry_run {
            title.spans.push(Span::styled(
                "  [DRY RUN]",
                Style::default()
                    .fg(Colors::WARNING)
                    .add_modifier(Modifier::BOLD),
            ));
        }
        f.render_widget(Paragraph::new(title), inner);

        let summary = &state.summary;
        let fleet = Line::from(vec![
            Span::styled(format!("● {} online", summary.online), Styles::success()),
            Span::raw("  "),
            Span::styled(format!("○ {} stopped", summary.stopped), Styles::text_secondary()),
            Span::raw("  "),
            Span::styled(format!("✖ {} errored", summary.errored), Styles::error()),
            Span::raw(" "),
        ]);
        f.render_widget(Paragraph::new(fleet).alignment(Alignment::Right), inner);
    }
}

/// Render the last status message
pub fn render_status_line(f: &mut Frame, state: &AppState, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" » ", Style::default().fg(Colors::PRIMARY)),
        Span::styled(state.status_message.clone(), Styles::text()),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

/// Render the navigation bar
pub fn render_nav_bar(
    f: &mut Frame,
    state: &AppState,
    keybinding_ctx: &KeybindingContext,
    area: Rect,
) {
    let nav_items = keybinding_ctx.get_nav_items(state.key_context());
    let nav_bar = NavBar::new(nav_items);
    nav_bar.render(f, area);
}

/// Render the help overlay
pub fn render_help_overlay(f: &mut Frame, state: &AppState, keybinding_ctx: &KeybindingContext) {
    let help_overlay = HelpOverlay::new(state.key_context(), keybinding_ctx);
    help_overlay.render(f, f.area());
}
