//! Bottom navigation bar showing the keys of the active context

use super::keybindings::NavBarItem;
use crate::theme::Styles;
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

pub struct NavBar {
    items: Vec<NavBarItem>,
}

impl NavBar {
    pub fn new(items: Vec<NavBarItem>) -> Self {
        Self { items }
    }

    fn line(&self) -> Line<'static> {
        let mut spans = Vec::with_capacity(self.items.len() * 3);
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled("  │  ", Styles::nav_hint()));
            }
            spans.push(Span::styled(item.key_display.clone(), Styles::key_hint()));
            spans.push(Span::styled(format!(" {}", item.action_label), Styles::text_secondary()));
        }
        Line::from(spans)
    }

    pub fn render(&self, f: &mut Frame, area: Rect) {
        if area.height == 0 {
            return;
        }
        f.render_widget(Paragraph::new(self.line()), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_between_items() {
        let bar = NavBar::new(vec![
            NavBarItem { key_display: "S".into(), action_label: "Start".into() },
            NavBarItem { key_display: "X".into(), action_label: "Stop".into() },
        ]);
        let text: String = bar.line().spans.iter().map(|s| s.content.to_string()).collect();
        assert_eq!(text, "S Start  │  X Stop");
    }
}
