//! Application state definitions
//!
//! Everything the renderer needs that is not owned by an engine: navigation,
//! focus, per-action status and output, log viewer settings, and the pending
//! confirmation.

use crate::components::keybindings::KeyContext;
use crate::config::ActionSpec;
use crate::dispatcher::ExecEvent;
use crate::logs::LogFilter;
use crate::supervisor::{ServiceSnapshot, StatusSummary};
use crate::theme::UiConstants;
use crate::types::{ActionStatus, LogChannel, OutputStream};
use std::collections::{HashMap, VecDeque};

/// Sidebar groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Database,
    Services,
    Logs,
}

impl Section {
    pub fn title(self) -> &'static str {
        match self {
            Self::Database => "Database",
            Self::Services => "Services",
            Self::Logs => "Logs",
        }
    }
}

/// Sidebar entries, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    DbInstall,
    DbUninstall,
    DbClean,
    Pm2Install,
    Pm2Status,
    LogsServices,
    LogsDatabase,
    LogsErrors,
}

impl MenuItem {
    pub const ALL: [MenuItem; 8] = [
        Self::DbInstall,
        Self::DbUninstall,
        Self::DbClean,
        Self::Pm2Install,
        Self::Pm2Status,
        Self::LogsServices,
        Self::LogsDatabase,
        Self::LogsErrors,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::DbInstall => "db-install",
            Self::DbUninstall => "db-uninstall",
            Self::DbClean => "db-clean",
            Self::Pm2Install => "pm2-install",
            Self::Pm2Status => "pm2-status",
            Self::LogsServices => "logs-services",
            Self::LogsDatabase => "logs-database",
            Self::LogsErrors => "logs-errors",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::DbInstall => "Install",
            Self::DbUninstall => "Uninstall",
            Self::DbClean => "Clean",
            Self::Pm2Install => "Install",
            Self::Pm2Status => "Status",
            Self::LogsServices => "Services",
            Self::LogsDatabase => "Database",
            Self::LogsErrors => "Errors",
        }
    }

    pub fn section(self) -> Section {
        match self {
            Self::DbInstall | Self::DbUninstall | Self::DbClean => Section::Database,
            Self::Pm2Install | Self::Pm2Status => Section::Services,
            Self::LogsServices | Self::LogsDatabase | Self::LogsErrors => Section::Logs,
        }
    }

    /// Panel shown when this entry is active
    pub fn view(self) -> View {
        match self {
            Self::DbInstall | Self::DbUninstall | Self::DbClean => View::Database,
            Self::Pm2Install | Self::Pm2Status => View::Services,
            Self::LogsServices => View::Logs(LogChannel::Services),
            Self::LogsDatabase => View::Logs(LogChannel::Database),
            Self::LogsErrors => View::Logs(LogChannel::Errors),
        }
    }
}

/// Content panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Database,
    Services,
    Logs(LogChannel),
}

/// Which pane receives navigation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Sidebar,
    Content,
}

/// A destructive action waiting for y/n
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirm {
    pub action_id: String,
    pub label: String,
    pub description: String,
    pub command: String,
}

impl PendingConfirm {
    pub fn for_action(spec: &ActionSpec) -> Self {
        Self {
            action_id: spec.id.clone(),
            label: spec.display_label().to_string(),
            description: spec.description.clone(),
            command: spec.command_line(),
        }
    }
}

/// Log viewer settings
#[derive(Debug, Clone)]
pub struct LogViewState {
    pub channel: LogChannel,
    pub filter: LogFilter,
    /// Typing into the text filter
    pub editing_filter: bool,
    /// Lines scrolled up from the newest entry; 0 follows the tail
    pub scroll_back: usize,
    pub streaming: bool,
}

impl Default for LogViewState {
    fn default() -> Self {
        Self {
            channel: LogChannel::Services,
            filter: LogFilter::default(),
            editing_filter: false,
            scroll_back: 0,
            streaming: false,
        }
    }
}

impl LogViewState {
    pub fn is_following(&self) -> bool {
        self.scroll_back == 0
    }

    pub fn scroll_up(&mut self, lines: usize, total: usize) {
        self.scroll_back = (self.scroll_back + lines).min(total.saturating_sub(1));
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }
}

/// Main application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub menu_selection: usize,
    /// Sidebar entry whose panel is showing
    pub active_menu: MenuItem,
    pub view: View,
    pub focus: Focus,
    /// Selected row in the database panel
    pub db_selection: usize,
    /// Selected row in the services table
    pub service_selection: usize,
    pub services: Vec<ServiceSnapshot>,
    pub summary: StatusSummary,
    pub action_status: HashMap<String, ActionStatus>,
    pub action_output: HashMap<String, VecDeque<String>>,
    /// Action whose output the database panel shows
    pub last_action: Option<String>,
    pub logs: LogViewState,
    pub status_message: String,
    pub help_visible: bool,
    pub confirm: Option<PendingConfirm>,
    pub dry_run: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            menu_selection: 0,
            active_menu: MenuItem::DbInstall,
            view: View::Database,
            focus: Focus::Sidebar,
            db_selection: 0,
            service_selection: 0,
            services: Vec::new(),
            summary: StatusSummary::default(),
            action_status: HashMap::new(),
            action_output: HashMap::new(),
            last_action: None,
            logs: LogViewState::default(),
            status_message: "Welcome to opsdeck".to_string(),
            help_visible: false,
            confirm: None,
            dry_run: false,
        }
    }
}

/// Database actions shown in the database panel, in order
pub const DATABASE_ACTIONS: [&str; 3] = ["db-install", "db-uninstall", "db-clean"];

impl AppState {
    pub fn selected_menu(&self) -> MenuItem {
        MenuItem::ALL[self.menu_selection.min(MenuItem::ALL.len() - 1)]
    }

    pub fn menu_up(&mut self) {
        self.menu_selection = self.menu_selection.saturating_sub(1);
    }

    pub fn menu_down(&mut self) {
        if self.menu_selection + 1 < MenuItem::ALL.len() {
            self.menu_selection += 1;
        }
    }

    /// Switch the content panel to the selected sidebar entry
    pub fn activate_menu(&mut self) -> MenuItem {
        let item = self.selected_menu();
        self.active_menu = item;
        self.view = item.view();
        match item {
            MenuItem::DbInstall => self.db_selection = 0,
            MenuItem::DbUninstall => self.db_selection = 1,
            MenuItem::DbClean => self.db_selection = 2,
            _ => {}
        }
        if let View::Logs(channel) = self.view {
            if self.logs.channel != channel {
                self.logs.channel = channel;
                self.logs.scroll_back = 0;
            }
        }
        self.focus = Focus::Content;
        item
    }

    /// Keybinding context for the current focus, dialog and view
    pub fn key_context(&self) -> KeyContext {
        if self.confirm.is_some() {
            return KeyContext::Confirm;
        }
        if self.logs.editing_filter {
            return KeyContext::FilterInput;
        }
        match (self.focus, self.view) {
            (Focus::Sidebar, _) => KeyContext::Sidebar,
            (Focus::Content, View::Database) => KeyContext::Database,
            (Focus::Content, View::Services) => KeyContext::Services,
            (Focus::Content, View::Logs(_)) => KeyContext::Logs,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Sidebar => Focus::Content,
            Focus::Content => Focus::Sidebar,
        };
    }

    pub fn selected_db_action(&self) -> &'static str {
        DATABASE_ACTIONS[self.db_selection.min(DATABASE_ACTIONS.len() - 1)]
    }

    pub fn selected_service(&self) -> Option<&ServiceSnapshot> {
        self.services.get(self.service_selection)
    }

    /// Move the selection of the content panel
    pub fn content_up(&mut self) {
        match self.view {
            View::Database => self.db_selection = self.db_selection.saturating_sub(1),
            View::Services => self.service_selection = self.service_selection.saturating_sub(1),
            View::Logs(_) => self.logs.scroll_up(1, usize::MAX),
        }
    }

    pub fn content_down(&mut self) {
        match self.view {
            View::Database => {
                if self.db_selection + 1 < DATABASE_ACTIONS.len() {
                    self.db_selection += 1;
                }
            }
            View::Services => {
                if self.service_selection + 1 < self.services.len() {
                    self.service_selection += 1;
                }
            }
            View::Logs(_) => self.logs.scroll_down(1),
        }
    }

    /// Replace service snapshots, keeping the selection in range
    pub fn update_services(&mut self, services: Vec<ServiceSnapshot>, summary: StatusSummary) {
        self.services = services;
        self.summary = summary;
        if self.service_selection >= self.services.len() {
            self.service_selection = self.services.len().saturating_sub(1);
        }
    }

    pub fn action_status(&self, id: &str) -> ActionStatus {
        self.action_status.get(id).copied().unwrap_or_default()
    }

    /// Mark an action as started, clearing its previous output
    pub fn begin_action(&mut self, id: &str) {
        self.action_status.insert(id.to_string(), ActionStatus::Running);
        self.action_output.insert(id.to_string(), VecDeque::new());
        self.last_action = Some(id.to_string());
    }

    fn push_output(&mut self, id: &str, line: String) {
        let output = self.action_output.entry(id.to_string()).or_default();
        output.push_back(line);
        while output.len() > UiConstants::ACTION_OUTPUT_LINES {
            output.pop_front();
        }
    }

    /// Apply one event of a running action
    pub fn record_exec_event(&mut self, event: &ExecEvent) {
        match event {
            ExecEvent::Started { action, pid } => {
                let line = match pid {
                    Some(pid) => format!("Started (pid {})", pid),
                    None => "Started (dry run)".to_string(),
                };
                self.push_output(action, line);
            }
            ExecEvent::Output {
                action,
                stream,
                line,
            } => {
                let line = match stream {
                    OutputStream::Stdout => line.clone(),
                    OutputStream::Stderr => format!("! {}", line),
                };
                self.push_output(action, line);
            }
            ExecEvent::Finished(outcome) => {
                let status = outcome.status();
                self.action_status.insert(outcome.action.clone(), status);
                self.status_message = match (status, outcome.exit_code) {
                    (ActionStatus::Success, _) => format!("{} completed", outcome.action),
                    (_, _) if outcome.timed_out => format!("{} timed out", outcome.action),
                    (_, Some(code)) => format!("{} failed (exit code {})", outcome.action, code),
                    (_, None) => format!("{} was killed by a signal", outcome.action),
                };
                let summary = self.status_message.clone();
                self.push_output(&outcome.action, summary);
            }
            ExecEvent::Failed { action, error } => {
                self.action_status.insert(action.clone(), ActionStatus::Error);
                self.status_message = error.clone();
                self.push_output(action, error.clone());
            }
        }
    }

    /// Mark an action that could not be started
    pub fn fail_action(&mut self, id: &str, message: String) {
        self.action_status.insert(id.to_string(), ActionStatus::Error);
        self.push_output(id, message.clone());
        self.status_message = message;
    }
}
