//! Centralized theme and styling for the TUI
//!
//! Every color and style the dashboard uses is defined here, so panels never
//! hardcode colors.
//!
//! # Usage
//! ```rust
//! use opsdeck::theme::{Colors, Styles, Theme};
//! use opsdeck::types::LogLevel;
//! use ratatui::style::Style;
//!
//! let border = Style::default().fg(Colors::PRIMARY);
//! let title = Styles::title();
//! let error = Theme::log_style(LogLevel::Error);
//! ```

use crate::types::{ActionStatus, LogLevel, ServiceStatus};
use ratatui::style::{Color, Modifier, Style};

// =============================================================================
// COLOR PALETTE
// =============================================================================

/// Core color palette for the application
pub struct Colors;

impl Colors {
    // -------------------------------------------------------------------------
    // Base Colors
    // -------------------------------------------------------------------------

    /// Primary dark background - dialogs and overlays
    pub const BG_PRIMARY: Color = Color::Rgb(20, 20, 30);

    /// Warning/danger dialog background
    pub const BG_DANGER: Color = Color::Rgb(30, 20, 20);

    pub const FG_PRIMARY: Color = Color::White;
    pub const FG_SECONDARY: Color = Color::Gray;
    pub const FG_MUTED: Color = Color::DarkGray;

    // -------------------------------------------------------------------------
    // Accent Colors
    // -------------------------------------------------------------------------

    /// Borders, titles, highlights
    pub const PRIMARY: Color = Color::Cyan;

    /// Selected items, emphasis
    pub const SECONDARY: Color = Color::Yellow;

    // -------------------------------------------------------------------------
    // Semantic Colors
    // -------------------------------------------------------------------------

    pub const SUCCESS: Color = Color::Green;
    pub const WARNING: Color = Color::Yellow;
    pub const ERROR: Color = Color::Red;
    pub const INFO: Color = Color::Blue;

    // -------------------------------------------------------------------------
    // UI Element Colors
    // -------------------------------------------------------------------------

    pub const BORDER_ACTIVE: Color = Color::Cyan;
    pub const BORDER_INACTIVE: Color = Color::DarkGray;

    /// Selected item highlight
    pub const SELECTED_BG: Color = Color::Yellow;

    /// Selected item text (for contrast on yellow bg)
    pub const SELECTED_FG: Color = Color::Black;

    pub const UNSELECTED: Color = Color::Gray;

    /// Sidebar group header
    pub const CATEGORY: Color = Color::Yellow;

    /// Navigation hint color
    pub const NAV_HINT: Color = Color::DarkGray;

    /// Blinking dot shown while logs stream
    pub const LIVE: Color = Color::LightGreen;
}

// =============================================================================
// PRE-BUILT STYLES
// =============================================================================

/// Pre-built styles for common UI patterns
pub struct Styles;

impl Styles {
    pub fn text() -> Style {
        Style::default().fg(Colors::FG_PRIMARY)
    }

    pub fn text_muted() -> Style {
        Style::default().fg(Colors::FG_MUTED)
    }

    pub fn text_secondary() -> Style {
        Style::default().fg(Colors::FG_SECONDARY)
    }

    /// Main title style (cyan, bold)
    pub fn title() -> Style {
        Style::default()
            .fg(Colors::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    /// Sidebar group header (yellow)
    pub fn category() -> Style {
        Style::default()
            .fg(Colors::CATEGORY)
            .add_modifier(Modifier::BOLD)
    }

    /// Border for the focused panel
    pub fn border(focused: bool) -> Style {
        if focused {
            Style::default().fg(Colors::BORDER_ACTIVE)
        } else {
            Style::default().fg(Colors::BORDER_INACTIVE)
        }
    }

    pub fn selected() -> Style {
        Style::default()
            .fg(Colors::SELECTED_FG)
            .bg(Colors::SELECTED_BG)
            .add_modifier(Modifier::BOLD)
    }

    pub fn unselected() -> Style {
        Style::default().fg(Colors::UNSELECTED)
    }

    pub fn success() -> Style {
        Style::default().fg(Colors::SUCCESS)
    }

    pub fn warning() -> Style {
        Style::default().fg(Colors::WARNING)
    }

    pub fn error() -> Style {
        Style::default().fg(Colors::ERROR)
    }

    /// Key label in the nav bar and help overlay
    pub fn key_hint() -> Style {
        Style::default()
            .fg(Colors::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn nav_hint() -> Style {
        Style::default().fg(Colors::NAV_HINT)
    }

    /// Confirm button of a destructive dialog
    pub fn button_danger() -> Style {
        Style::default()
            .fg(Colors::FG_PRIMARY)
            .bg(Colors::ERROR)
            .add_modifier(Modifier::BOLD)
    }

    pub fn button_inactive() -> Style {
        Style::default().fg(Colors::FG_PRIMARY)
    }
}

// =============================================================================
// THEME CONTEXT
// =============================================================================

/// Semantic style lookups
pub struct Theme;

impl Theme {
    pub fn log_style(level: LogLevel) -> Style {
        match level {
            LogLevel::Debug => Style::default().fg(Colors::FG_MUTED),
            LogLevel::Info => Style::default().fg(Colors::INFO),
            LogLevel::Warn => Style::default().fg(Colors::WARNING),
            LogLevel::Error => Style::default().fg(Colors::ERROR),
        }
    }

    pub fn service_style(status: ServiceStatus) -> Style {
        match status {
            ServiceStatus::Online => Style::default().fg(Colors::SUCCESS),
            ServiceStatus::Stopped => Style::default().fg(Colors::FG_SECONDARY),
            ServiceStatus::Error => Style::default()
                .fg(Colors::ERROR)
                .add_modifier(Modifier::BOLD),
        }
    }

    /// Dot shown next to a service status
    pub fn service_icon(status: ServiceStatus) -> &'static str {
        match status {
            ServiceStatus::Online => "●",
            ServiceStatus::Stopped => "○",
            ServiceStatus::Error => "✖",
        }
    }

    pub fn action_style(status: ActionStatus) -> Style {
        match status {
            ActionStatus::Idle => Style::default().fg(Colors::FG_MUTED),
            ActionStatus::Running => Style::default()
                .fg(Colors::SECONDARY)
                .add_modifier(Modifier::BOLD),
            ActionStatus::Success => Style::default().fg(Colors::SUCCESS),
            ActionStatus::Error => Style::default().fg(Colors::ERROR),
        }
    }

    pub fn action_icon(status: ActionStatus) -> &'static str {
        match status {
            ActionStatus::Idle => "·",
            ActionStatus::Running => "…",
            ActionStatus::Success => "✔",
            ActionStatus::Error => "✖",
        }
    }
}

// =============================================================================
// UI CONSTANTS
// =============================================================================

/// Layout constants
pub struct UiConstants;

impl UiConstants {
    /// Sidebar width in columns
    pub const SIDEBAR_WIDTH: u16 = 28;

    /// Confirmation dialog width percentage
    pub const DIALOG_WIDTH_PCT: u16 = 60;

    pub const DIALOG_MAX_WIDTH: u16 = 70;

    /// Lines kept per action in the database panel
    pub const ACTION_OUTPUT_LINES: usize = 200;

    /// Scroll page size (lines)
    pub const PAGE_SCROLL_SIZE: usize = 10;
}

/// Common UI text strings
pub struct UiText;

impl UiText {
    pub const BTN_CONFIRM: &'static str = "[ y: Yes, continue ]";
    pub const BTN_CANCEL: &'static str = "[ n: Cancel ]";
    pub const NO_LOGS: &'static str = "No logs to display";
    pub const NO_OUTPUT: &'static str = "No output yet";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_levels_are_red() {
        assert_eq!(Theme::log_style(LogLevel::Error).fg, Some(Colors::ERROR));
        assert_eq!(Theme::service_style(ServiceStatus::Error).fg, Some(Colors::ERROR));
        assert_eq!(Theme::action_style(ActionStatus::Error).fg, Some(Colors::ERROR));
    }

    #[test]
    fn test_border_follows_focus() {
        assert_eq!(Styles::border(true).fg, Some(Colors::BORDER_ACTIVE));
        assert_eq!(Styles::border(false).fg, Some(Colors::BORDER_INACTIVE));
    }
}
