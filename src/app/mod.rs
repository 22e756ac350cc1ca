//! Application module
//!
//! Contains the main application loop, event handling and the wiring between
//! the engines and the UI.
//!
//! # Module Structure
//! - `state` - Application state types (AppState, View, MenuItem, etc.)
//! - Main module - App struct and event loop

mod state;

// Re-export state types for external use
pub use state::{
    AppState, Focus, LogViewState, MenuItem, PendingConfirm, Section, View, DATABASE_ACTIONS,
};

use crate::command_executor::{
    spawn_executor_thread, CommandId, CommandRequest, CommandResponse, ServiceCommand,
};
use crate::components::keybindings::{KeyAction, KeyContext, KeybindingContext};
use crate::config::DeckConfig;
use crate::dispatcher::{Dispatcher, ExecEvent, Execution};
use crate::error::{DeckError, Result};
use crate::logs::{LogAggregator, LogStream};
use crate::process_guard::ProcessGuard;
use crate::supervisor::{ReconcilerHandle, Supervisor};
use crate::theme::UiConstants;
use crate::types::LogChannel;
use crate::ui::{LogPanel, UiRenderer};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{backend::Backend, Terminal};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main application struct
pub struct App {
    state: Arc<Mutex<AppState>>,
    config: DeckConfig,
    logs: LogAggregator,
    dispatcher: Dispatcher,
    supervisor: Supervisor,
    stream: LogStream,
    /// Actions started from the UI that have not finished yet
    executions: Vec<Execution>,
    command_tx: Sender<CommandRequest>,
    response_rx: Receiver<CommandResponse>,
    next_command_id: CommandId,
    ui_renderer: UiRenderer,
    keybinding_context: KeybindingContext,
    _reconciler: ReconcilerHandle,
    /// Terminates every tracked child when the App is dropped
    _process_guard: ProcessGuard,
}

impl App {
    /// Create the application and start its background workers
    pub fn new(config: DeckConfig, dry_run: bool) -> Result<Self> {
        info!("Creating new App instance");
        let logs =
            LogAggregator::with_capacity(config.logs.retention, config.logs.subscriber_capacity);
        let dispatcher = Dispatcher::new(&config, logs.clone()).with_dry_run(dry_run);
        let supervisor = Supervisor::new(&config, logs.clone());
        let stream = LogStream::from_settings(logs.clone(), &config.logs);

        let process_guard = ProcessGuard::new();
        debug!("ProcessGuard initialized for child process tracking");

        let (command_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        spawn_executor_thread(supervisor.clone(), request_rx, response_tx)?;

        for (id, err) in supervisor.start_autostart()? {
            warn!("Autostart of {} failed: {}", id, err);
        }
        let reconciler = supervisor
            .spawn_reconciler(Duration::from_millis(config.supervisor.poll_interval_ms))?;

        let mut state = AppState {
            dry_run,
            ..AppState::default()
        };
        if dry_run {
            state.status_message = "Dry run: actions are described, not executed".to_string();
        }

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            ui_renderer: UiRenderer::new(dispatcher.actions()),
            config,
            logs,
            dispatcher,
            supervisor,
            stream,
            executions: Vec::new(),
            command_tx,
            response_rx,
            next_command_id: 0,
            keybinding_context: KeybindingContext::new(),
            _reconciler: reconciler,
            _process_guard: process_guard,
        })
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, AppState>> {
        self.state.lock().map_err(DeckError::poisoned)
    }

    /// Shared handle to the UI state
    pub fn state(&self) -> Arc<Mutex<AppState>> {
        Arc::clone(&self.state)
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.logs
    }

    /// Run the main application loop until the operator quits
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        info!("Starting main application loop");

        loop {
            self.poll_executions()?;
            self.poll_command_responses()?;
            self.refresh_services()?;

            if crossterm::event::poll(Duration::from_millis(50))? {
                if let Event::Key(key_event) = crossterm::event::read()? {
                    if key_event.kind == KeyEventKind::Press && self.handle_key_event(key_event)? {
                        break;
                    }
                }
            }

            let log_panel = self.capture_log_panel()?;
            let state = self.lock_state()?;
            terminal.draw(|f| {
                self.ui_renderer
                    .render(f, &state, &log_panel, &self.keybinding_context)
            })?;
        }

        self.shutdown();
        Ok(())
    }

    /// Stop streaming and the service fleet
    pub fn shutdown(&mut self) {
        info!("Shutting down");
        self.stream.stop();
        match self.supervisor.stop_all() {
            Ok(failures) => {
                for (id, err) in failures {
                    warn!("Failed to stop {}: {}", id, err);
                }
            }
            Err(e) => warn!("Failed to stop services: {}", e),
        }
    }

    /// Apply pending events of running actions
    pub fn poll_executions(&mut self) -> Result<()> {
        if self.executions.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().map_err(DeckError::poisoned)?;
        self.executions.retain(|execution| {
            let exited = execution.worker_finished();
            let mut done = false;
            for event in execution.try_events() {
                done |= event.is_terminal();
                state.record_exec_event(&event);
            }
            if exited && !done {
                // Worker died without reporting
                state.record_exec_event(&ExecEvent::Failed {
                    action: execution.action().to_string(),
                    error: format!("{} ended unexpectedly", execution.action()),
                });
                done = true;
            }
            !done
        });
        Ok(())
    }

    /// Apply results of finished service operations
    pub fn poll_command_responses(&mut self) -> Result<()> {
        while let Ok(response) = self.response_rx.try_recv() {
            let mut state = self.lock_state()?;
            match response.result {
                Ok(message) => {
                    info!("{}", message);
                    state.status_message = message;
                }
                Err(err) => {
                    warn!("Failed to {}: {}", response.command, err);
                    state.status_message = format!("Failed to {}: {}", response.command, err);
                }
            }
        }
        Ok(())
    }

    /// Copy supervisor snapshots into the UI state
    pub fn refresh_services(&mut self) -> Result<()> {
        let services = self.supervisor.list_services()?;
        let summary = self.supervisor.summary()?;
        let streaming = self.stream.is_streaming();
        let mut state = self.lock_state()?;
        state.update_services(services, summary);
        state.logs.streaming = streaming;
        Ok(())
    }

    fn capture_log_panel(&self) -> Result<LogPanel> {
        let state = self.lock_state()?;
        let View::Logs(channel) = state.view else {
            return Ok(LogPanel::default());
        };
        Ok(LogPanel {
            entries: self.logs.filtered(channel, &state.logs.filter),
            total: self.logs.len(channel),
            counts: self.logs.counts(channel),
        })
    }

    /// Handle one key press. Returns true when the app should exit.
    pub fn handle_key_event(&mut self, key_event: KeyEvent) -> Result<bool> {
        let (context, help_visible) = {
            let state = self.lock_state()?;
            (state.key_context(), state.help_visible)
        };

        // ? or Esc dismisses help, everything else is swallowed
        if help_visible {
            if matches!(key_event.code, KeyCode::Char('?') | KeyCode::Esc) {
                self.lock_state()?.help_visible = false;
            }
            return Ok(false);
        }

        if context == KeyContext::FilterInput {
            self.handle_filter_input(key_event)?;
            return Ok(false);
        }

        match self.keybinding_context.resolve(context, &key_event) {
            Some(action) => self.handle_action(context, action),
            None => Ok(false),
        }
    }

    fn handle_filter_input(&mut self, key_event: KeyEvent) -> Result<()> {
        let action = self
            .keybinding_context
            .resolve(KeyContext::FilterInput, &key_event);
        let mut state = self.lock_state()?;
        match (action, key_event.code) {
            (Some(KeyAction::Confirm), _) => state.logs.editing_filter = false,
            (Some(KeyAction::Cancel), _) => {
                state.logs.editing_filter = false;
                state.logs.filter.text.clear();
            }
            (_, KeyCode::Backspace) => {
                state.logs.filter.text.pop();
            }
            (_, KeyCode::Char(c)) => state.logs.filter.text.push(c),
            _ => {}
        }
        state.logs.scroll_back = 0;
        Ok(())
    }

    fn handle_action(&mut self, context: KeyContext, action: KeyAction) -> Result<bool> {
        debug!("Key action {:?} in {:?}", action, context);
        match action {
            KeyAction::Quit => return Ok(true),
            KeyAction::Help => self.lock_state()?.help_visible = true,
            KeyAction::SwitchFocus => self.lock_state()?.toggle_focus(),
            KeyAction::Back => self.lock_state()?.focus = Focus::Sidebar,
            KeyAction::NavigateUp | KeyAction::NavigateDown | KeyAction::PageUp
            | KeyAction::PageDown | KeyAction::FollowLatest => self.navigate(context, action)?,
            KeyAction::Select => self.select(context)?,

            KeyAction::StartService => self.service_command(ServiceCommand::Start)?,
            KeyAction::StopService => self.service_command(ServiceCommand::Stop)?,
            KeyAction::RestartService => self.service_command(ServiceCommand::Restart)?,
            KeyAction::InstallServices => self.run_action("pm2-install")?,
            KeyAction::ReloadServices => self.run_action("pm2-reload")?,
            KeyAction::StopAllServices => self.run_action("pm2-stop-all")?,

            KeyAction::ToggleStream => self.toggle_stream()?,
            KeyAction::ClearLogs => self.clear_logs()?,
            KeyAction::ExportLogs => self.export_logs()?,
            KeyAction::EditFilter => self.lock_state()?.logs.editing_filter = true,
            KeyAction::CycleLevel => {
                let mut state = self.lock_state()?;
                state.logs.filter.cycle_level();
                state.logs.scroll_back = 0;
                state.status_message = format!("Level filter: {}", state.logs.filter.level_label());
            }

            KeyAction::Confirm => self.confirm_pending()?,
            KeyAction::Cancel => {
                let mut state = self.lock_state()?;
                if let Some(pending) = state.confirm.take() {
                    state.status_message = format!("Cancelled {}", pending.label);
                }
            }
        }
        Ok(false)
    }

    fn navigate(&mut self, context: KeyContext, action: KeyAction) -> Result<()> {
        let total = self.visible_log_count()?;
        let mut state = self.lock_state()?;
        match (context, action) {
            (KeyContext::Sidebar, KeyAction::NavigateUp) => state.menu_up(),
            (KeyContext::Sidebar, KeyAction::NavigateDown) => state.menu_down(),
            (KeyContext::Logs, KeyAction::NavigateUp) => state.logs.scroll_up(1, total),
            (KeyContext::Logs, KeyAction::PageUp) => {
                state.logs.scroll_up(UiConstants::PAGE_SCROLL_SIZE, total)
            }
            (KeyContext::Logs, KeyAction::PageDown) => {
                state.logs.scroll_down(UiConstants::PAGE_SCROLL_SIZE)
            }
            (KeyContext::Logs, KeyAction::FollowLatest) => state.logs.scroll_back = 0,
            (_, KeyAction::NavigateUp) => state.content_up(),
            (_, KeyAction::NavigateDown) => state.content_down(),
            _ => {}
        }
        Ok(())
    }

    fn visible_log_count(&self) -> Result<usize> {
        let state = self.lock_state()?;
        Ok(match state.view {
            View::Logs(channel) => self.logs.filtered(channel, &state.logs.filter).len(),
            _ => 0,
        })
    }

    fn select(&mut self, context: KeyContext) -> Result<()> {
        match context {
            KeyContext::Sidebar => {
                let item = self.lock_state()?.activate_menu();
                if let View::Logs(channel) = item.view() {
                    self.stream.switch_channel(channel);
                }
            }
            KeyContext::Database => {
                let id = self.lock_state()?.selected_db_action();
                self.run_action(id)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Start an action, asking for confirmation first when it is destructive
    fn run_action(&mut self, id: &str) -> Result<()> {
        let result = self.dispatcher.execute(id);
        self.track_execution(id, result)
    }

    fn confirm_pending(&mut self) -> Result<()> {
        let pending = self.lock_state()?.confirm.take();
        if let Some(pending) = pending {
            info!("Operator confirmed {}", pending.action_id);
            let result = self.dispatcher.execute_confirmed(&pending.action_id);
            self.track_execution(&pending.action_id, result)?;
        }
        Ok(())
    }

    fn track_execution(&mut self, id: &str, result: Result<Execution>) -> Result<()> {
        let mut state = self.state.lock().map_err(DeckError::poisoned)?;
        match result {
            Ok(execution) => {
                state.begin_action(id);
                state.status_message = format!("Running {}", id);
                self.executions.push(execution);
            }
            Err(DeckError::ConfirmationRequired { .. }) => {
                if let Some(spec) = self.dispatcher.action(id) {
                    state.confirm = Some(PendingConfirm::for_action(spec));
                }
            }
            Err(err @ DeckError::ActionInFlight { .. }) => {
                state.status_message = err.to_string();
            }
            Err(err) => {
                warn!("Could not start {}: {}", id, err);
                state.fail_action(id, err.to_string());
            }
        }
        Ok(())
    }

    /// Queue an operation on the selected service
    fn service_command(&mut self, build: fn(String) -> ServiceCommand) -> Result<()> {
        let selected = self.lock_state()?.selected_service().map(|s| s.id.clone());
        match selected {
            Some(id) => self.send_command(build(id)),
            None => {
                self.lock_state()?.status_message = "No service selected".to_string();
                Ok(())
            }
        }
    }

    fn send_command(&mut self, command: ServiceCommand) -> Result<()> {
        self.next_command_id += 1;
        let label = command.to_string();
        let request = CommandRequest {
            id: self.next_command_id,
            command,
        };
        let message = if self.command_tx.send(request).is_ok() {
            format!("Requested: {}", label)
        } else {
            warn!("Service worker is gone, dropping {}", label);
            "Service worker stopped".to_string()
        };
        self.lock_state()?.status_message = message;
        Ok(())
    }

    fn current_log_channel(&self) -> Result<Option<LogChannel>> {
        Ok(match self.lock_state()?.view {
            View::Logs(channel) => Some(channel),
            _ => None,
        })
    }

    fn toggle_stream(&mut self) -> Result<()> {
        let Some(channel) = self.current_log_channel()? else {
            return Ok(());
        };
        let streaming = self.stream.toggle(channel);
        let mut state = self.lock_state()?;
        state.logs.streaming = streaming;
        state.status_message = if streaming {
            format!("Streaming {} logs", channel)
        } else {
            "Streaming paused".to_string()
        };
        Ok(())
    }

    fn clear_logs(&mut self) -> Result<()> {
        let Some(channel) = self.current_log_channel()? else {
            return Ok(());
        };
        self.logs.clear(channel);
        let mut state = self.lock_state()?;
        state.logs.scroll_back = 0;
        state.status_message = format!("Cleared {} logs", channel);
        Ok(())
    }

    fn export_logs(&mut self) -> Result<()> {
        let Some(channel) = self.current_log_channel()? else {
            return Ok(());
        };
        let message = match self.logs.export_to_dir(channel, &self.config.logs.export_dir) {
            Ok(path) => {
                info!("Exported {} logs to {}", channel, path.display());
                format!("Exported to {}", path.display())
            }
            Err(err) => {
                warn!("Export of {} logs failed: {}", channel, err);
                format!("Export failed: {}", err)
            }
        };
        self.lock_state()?.status_message = message;
        Ok(())
    }
}
