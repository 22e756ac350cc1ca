//! Help overlay component
//!
//! Displays the keybindings of the current context in a centered window.

use super::keybindings::{HelpSection, KeyContext, KeybindingContext};
use crate::theme::{Colors, Styles};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

/// Help overlay component
pub struct HelpOverlay {
    content: Vec<Line<'static>>,
}

impl HelpOverlay {
    pub fn new(context: KeyContext, keybinding_ctx: &KeybindingContext) -> Self {
        let sections = keybinding_ctx.get_help_content(context);
        Self {
            content: Self::build_content(&sections, context),
        }
    }

    fn build_content(sections: &[HelpSection], context: KeyContext) -> Vec<Line<'static>> {
        let mut lines: Vec<Line<'static>> = Vec::new();

        lines.push(Line::from(vec![Span::styled(
            "  opsdeck Help  ",
            Styles::title(),
        )]));
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Current: ", Style::default().fg(Colors::FG_MUTED)),
            Span::styled(context.title().to_string(), Style::default().fg(Colors::SECONDARY)),
        ]));
        lines.push(Line::from(""));

        for section in sections {
            lines.push(Line::from(vec![Span::styled(
                format!("  {}  ", section.title),
                Style::default()
                    .fg(Colors::SUCCESS)
                    .add_modifier(Modifier::BOLD),
            )]));
            for (key, description) in &section.items {
                lines.push(Line::from(vec![
                    Span::raw("    "),
                    Span::styled(format!("{:<10}", key), Styles::key_hint()),
                    Span::styled(description.clone(), Styles::text()),
                ]));
            }
            lines.push(Line::from(""));
        }

        lines.push(Line::from(vec![Span::styled(
            "Press ? or Esc to close",
            Styles::text_muted(),
        )]));
        lines
    }

    /// Number of content lines, for sizing
    pub fn height(&self) -> u16 {
        self.content.len() as u16
    }

    pub fn render(&self, f: &mut Frame, parent: Rect) {
        let width = (parent.width * 60 / 100).clamp(40.min(parent.width), 80.min(parent.width));
        let height = (self.height() + 2).min(parent.height);
        let area = Rect::new(
            parent.x + (parent.width - width) / 2,
            parent.y + (parent.height - height) / 2,
            width,
            height,
        );

        f.render_widget(Clear, area);
        let widget = Paragraph::new(self.content.clone())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Help ")
                    .border_style(Style::default().fg(Colors::PRIMARY))
                    .style(Style::default().bg(Colors::BG_PRIMARY)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(widget, area);
    }
}

/// Plain-text help, as printed by `opsdeck actions --help`-style output
pub fn build_quick_help(context: KeyContext) -> Vec<String> {
    let keybinding_ctx = KeybindingContext::new();
    let mut lines = Vec::new();
    for section in keybinding_ctx.get_help_content(context) {
        lines.push(format!("-- {} --", section.title));
        for (key, desc) in section.items {
            lines.push(format!("  {}: {}", key, desc));
        }
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_help_lists_log_keys() {
        let lines = build_quick_help(KeyContext::Logs);
        assert_eq!(lines[0], "-- Log Viewer --");
        assert!(lines.iter().any(|l| l.contains("Streaming on/off")));
    }

    #[test]
    fn test_overlay_has_header_and_footer() {
        let overlay = HelpOverlay::new(KeyContext::Sidebar, &KeybindingContext::new());
        assert!(overlay.height() > 6);
    }
}
