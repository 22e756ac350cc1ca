//! Confirmation dialog for destructive actions

use crate::app::PendingConfirm;
use crate::theme::{Colors, Styles, UiConstants, UiText};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

/// A rectangle of `width` x `height` centered in `area`, clipped to it
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

pub fn render_confirm_dialog(f: &mut Frame, pending: &PendingConfirm, dry_run: bool) {
    let area = f.area();
    let width = (area.width * UiConstants::DIALOG_WIDTH_PCT / 100).min(UiConstants::DIALOG_MAX_WIDTH);
    let dialog = centered_rect(width, 11, area);

    let mut lines = vec![
        Line::from(Span::styled(
            format!("⚠ {}", pending.label),
            Style::default()
                .fg(Colors::WARNING)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(pending.description.clone(), Styles::text())),
        Line::from(""),
        Line::from(vec![
            Span::styled("Command: ", Styles::text_muted()),
            Span::styled(pending.command.clone(), Styles::text_secondary()),
        ]),
    ];
    if dry_run {
        lines.push(Line::from(Span::styled(
            "Dry run: nothing will be executed",
            Styles::warning(),
        )));
    } else {
        lines.push(Line::from(""));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled(UiText::BTN_CONFIRM, Styles::button_danger()),
        Span::raw("   "),
        Span::styled(UiText::BTN_CANCEL, Styles::button_inactive()),
    ]));

    f.render_widget(Clear, dialog);
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Confirm ")
                .border_style(Style::default().fg(Colors::ERROR))
                .style(Style::default().bg(Colors::BG_DANGER)),
        );
    f.render_widget(widget, dialog);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_rect_clips_to_area() {
        let area = Rect::new(0, 0, 40, 10);
        assert_eq!(centered_rect(20, 4, area), Rect::new(10, 3, 20, 4));
        assert_eq!(centered_rect(100, 100, area), area);
    }
}
