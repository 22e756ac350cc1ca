//! Sidebar menu

use crate::app::{AppState, Focus, MenuItem, Section, View};
use crate::theme::{Colors, Styles};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

pub fn render_sidebar(f: &mut Frame, state: &AppState, area: Rect) {
    let focused = state.focus == Focus::Sidebar;
    let mut items: Vec<ListItem> = Vec::new();
    let mut current: Option<Section> = None;

    for (index, item) in MenuItem::ALL.iter().enumerate() {
        let section = item.section();
        if current != Some(section) {
            if current.is_some() {
                items.push(ListItem::new(""));
            }
            items.push(ListItem::new(Line::from(Span::styled(
                section.title().to_uppercase(),
                Styles::category(),
            ))));
            current = Some(section);
        }

        // The entry showing in the content panel keeps a marker when the
        // cursor moves elsewhere
        let active = is_active(state, *item);
        let marker = if active { "▸ " } else { "  " };
        let style = if index == state.menu_selection && focused {
            Styles::selected()
        } else if active {
            Style::default().fg(Colors::PRIMARY)
        } else {
            Styles::unselected()
        };
        items.push(ListItem::new(format!("{}{}", marker, item.label())).style(style));
    }

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Menu ")
            .border_style(Styles::border(focused)),
    );
    f.render_widget(list, area);
}

fn is_active(state: &AppState, item: MenuItem) -> bool {
    match state.view {
        View::Database => {
            item.section() == Section::Database && item.id() == state.selected_db_action()
        }
        _ => item == state.active_menu,
    }
}
