//! User interface rendering module
//!
//! This module is organized into submodules, one per screen region:
//! - `header` - Title bar, status line, nav bar and help overlay
//! - `sidebar` - Menu of database, services and log entries
//! - `database` - Database actions and their live output
//! - `services` - Summary tiles and the service table
//! - `logs` - Log viewer
//! - `dialogs` - Confirmation dialog

mod database;
mod dialogs;
mod header;
mod logs;
mod services;
mod sidebar;

use crate::app::{AppState, Focus, View};
use crate::components::keybindings::KeybindingContext;
use crate::config::ActionSpec;
use crate::logs::{LevelCounts, LogEntry};
use crate::theme::UiConstants;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    Frame,
};

pub use dialogs::centered_rect;
pub use header::HeaderRenderer;

/// Log entries captured for one frame of the log viewer
#[derive(Debug, Clone, Default)]
pub struct LogPanel {
    /// Entries passing the active filter, oldest first
    pub entries: Vec<LogEntry>,
    /// Entries retained in the channel before filtering
    pub total: usize,
    pub counts: LevelCounts,
}

/// UI renderer for the application
///
/// This is the main entry point for UI rendering. It delegates to specialized
/// submodules for different parts of the UI.
pub struct UiRenderer {
    header: HeaderRenderer,
    /// Labels and commands of the configured actions
    actions: Vec<ActionSpec>,
}

impl UiRenderer {
    pub fn new(actions: &[ActionSpec]) -> Self {
        Self {
            header: HeaderRenderer::new(),
            actions: actions.to_vec(),
        }
    }

    /// Render the complete UI
    pub fn render(
        &self,
        f: &mut Frame,
        state: &AppState,
        log_panel: &LogPanel,
        keybinding_ctx: &KeybindingContext,
    ) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title bar
                Constraint::Min(1),    // Sidebar + content
                Constraint::Length(1), // Status line
                Constraint::Length(1), // Navigation bar
            ])
            .split(f.area());

        self.header.render_title_bar(f, state, main_chunks[0]);
        self.render_body(f, state, log_panel, main_chunks[1]);
        header::render_status_line(f, state, main_chunks[2]);
        header::render_nav_bar(f, state, keybinding_ctx, main_chunks[3]);

        if let Some(ref pending) = state.confirm {
            dialogs::render_confirm_dialog(f, pending, state.dry_run);
        }

        // Help goes on top of everything
        if state.help_visible {
            header::render_help_overlay(f, state, keybinding_ctx);
        }
    }

    fn render_body(&self, f: &mut Frame, state: &AppState, log_panel: &LogPanel, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(UiConstants::SIDEBAR_WIDTH),
                Constraint::Min(20),
            ])
            .split(area);

        sidebar::render_sidebar(f, state, chunks[0]);

        let focused = state.focus == Focus::Content;
        match state.view {
            View::Database => {
                database::render_database_panel(f, state, &self.actions, chunks[1], focused)
            }
            View::Services => services::render_services_panel(f, state, chunks[1], focused),
            View::Logs(channel) => {
                logs::render_log_panel(f, state, channel, log_panel, chunks[1], focused)
            }
        }
    }
}
