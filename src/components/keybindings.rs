//! Keybinding system for context-aware keyboard shortcuts
//!
//! The App resolves every key press through this registry, and the nav bar
//! and help overlay are generated from it, so hints never drift from the
//! actual bindings.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

/// Where a key press lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyContext {
    Sidebar,
    Database,
    Services,
    Logs,
    /// Typing into the log text filter
    FilterInput,
    /// A confirmation dialog is open
    Confirm,
}

impl KeyContext {
    pub fn title(self) -> &'static str {
        match self {
            Self::Sidebar => "Navigation",
            Self::Database => "Database",
            Self::Services => "Services",
            Self::Logs => "Log Viewer",
            Self::FilterInput => "Filter",
            Self::Confirm => "Confirmation",
        }
    }
}

/// Actions that can be triggered by keybindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    NavigateUp,
    NavigateDown,
    PageUp,
    PageDown,
    FollowLatest,
    SwitchFocus,
    Select,
    Back,
    Quit,
    Help,
    StartService,
    StopService,
    RestartService,
    InstallServices,
    ReloadServices,
    StopAllServices,
    ToggleStream,
    ClearLogs,
    ExportLogs,
    EditFilter,
    CycleLevel,
    Confirm,
    Cancel,
}

/// A keybinding definition
#[derive(Debug, Clone)]
pub struct Keybinding {
    pub key: KeyCode,
    pub modifiers: KeyModifiers,
    pub action: KeyAction,
    pub display: String,
    pub description: String,
}

impl Keybinding {
    /// Create a new keybinding with no modifiers
    pub fn new(key: KeyCode, action: KeyAction, display: &str, description: &str) -> Self {
        Self {
            key,
            modifiers: KeyModifiers::NONE,
            action,
            display: display.to_string(),
            description: description.to_string(),
        }
    }

    /// Create a keybinding with modifiers
    pub fn with_modifiers(
        key: KeyCode,
        modifiers: KeyModifiers,
        action: KeyAction,
        display: &str,
        description: &str,
    ) -> Self {
        Self {
            key,
            modifiers,
            action,
            display: display.to_string(),
            description: description.to_string(),
        }
    }

    fn matches(&self, event: &KeyEvent) -> bool {
        // Shift is implied by the character for '?' and friends
        let mods = event.modifiers - KeyModifiers::SHIFT;
        self.key == event.code && self.modifiers == mods
    }
}

/// Context-aware keybinding registry
pub struct KeybindingContext {
    context_bindings: HashMap<KeyContext, Vec<Keybinding>>,
    /// Available everywhere except text input and dialogs
    global_bindings: Vec<Keybinding>,
}

impl Default for KeybindingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl KeybindingContext {
    pub fn new() -> Self {
        let mut ctx = Self {
            context_bindings: HashMap::new(),
            global_bindings: Vec::new(),
        };
        ctx.register_defaults();
        ctx
    }

    fn register_defaults(&mut self) {
        self.global_bindings = vec![
            Keybinding::new(KeyCode::Tab, KeyAction::SwitchFocus, "Tab", "Switch pane"),
            Keybinding::new(KeyCode::Char('?'), KeyAction::Help, "?", "Help"),
            Keybinding::new(KeyCode::Char('q'), KeyAction::Quit, "Q", "Quit"),
            Keybinding::with_modifiers(
                KeyCode::Char('c'),
                KeyModifiers::CONTROL,
                KeyAction::Quit,
                "Ctrl+C",
                "Quit",
            ),
        ];

        self.context_bindings.insert(
            KeyContext::Sidebar,
            vec![
                Keybinding::new(KeyCode::Up, KeyAction::NavigateUp, "Up", "Previous item"),
                Keybinding::new(KeyCode::Down, KeyAction::NavigateDown, "Down", "Next item"),
                Keybinding::new(KeyCode::Enter, KeyAction::Select, "Enter", "Open"),
            ],
        );

        self.context_bindings.insert(
            KeyContext::Database,
            vec![
                Keybinding::new(KeyCode::Up, KeyAction::NavigateUp, "Up", "Previous action"),
                Keybinding::new(KeyCode::Down, KeyAction::NavigateDown, "Down", "Next action"),
                Keybinding::new(KeyCode::Enter, KeyAction::Select, "Enter", "Run action"),
                Keybinding::new(KeyCode::Esc, KeyAction::Back, "Esc", "Back to menu"),
            ],
        );

        self.context_bindings.insert(
            KeyContext::Services,
            vec![
                Keybinding::new(KeyCode::Up, KeyAction::NavigateUp, "Up", "Previous service"),
                Keybinding::new(KeyCode::Down, KeyAction::NavigateDown, "Down", "Next service"),
                Keybinding::new(KeyCode::Char('s'), KeyAction::StartService, "S", "Start"),
                Keybinding::new(KeyCode::Char('x'), KeyAction::StopService, "X", "Stop"),
                Keybinding::new(KeyCode::Char('r'), KeyAction::RestartService, "R", "Restart"),
                Keybinding::new(KeyCode::Char('i'), KeyAction::InstallServices, "I", "Install services"),
                Keybinding::new(KeyCode::Char('l'), KeyAction::ReloadServices, "L", "Reload configuration"),
                Keybinding::new(KeyCode::Char('a'), KeyAction::StopAllServices, "A", "Stop all"),
                Keybinding::new(KeyCode::Esc, KeyAction::Back, "Esc", "Back to menu"),
            ],
        );

        self.context_bindings.insert(
            KeyContext::Logs,
            vec![
                Keybinding::new(KeyCode::Up, KeyAction::NavigateUp, "Up", "Scroll up"),
                Keybinding::new(KeyCode::Down, KeyAction::NavigateDown, "Down", "Scroll down"),
                Keybinding::new(KeyCode::PageUp, KeyAction::PageUp, "PgUp", "Page up"),
                Keybinding::new(KeyCode::PageDown, KeyAction::PageDown, "PgDn", "Page down"),
                Keybinding::new(KeyCode::End, KeyAction::FollowLatest, "End", "Follow newest"),
                Keybinding::new(KeyCode::Char(' '), KeyAction::ToggleStream, "Space", "Streaming on/off"),
                Keybinding::new(KeyCode::Char('/'), KeyAction::EditFilter, "/", "Filter text"),
                Keybinding::new(KeyCode::Char('v'), KeyAction::CycleLevel, "V", "Cycle level"),
                Keybinding::new(KeyCode::Char('c'), KeyAction::ClearLogs, "C", "Clear"),
                Keybinding::new(KeyCode::Char('e'), KeyAction::ExportLogs, "E", "Export"),
                Keybinding::new(KeyCode::Esc, KeyAction::Back, "Esc", "Back to menu"),
            ],
        );

        self.context_bindings.insert(
            KeyContext::FilterInput,
            vec![
                Keybinding::new(KeyCode::Enter, KeyAction::Confirm, "Enter", "Apply filter"),
                Keybinding::new(KeyCode::Esc, KeyAction::Cancel, "Esc", "Clear filter"),
            ],
        );

        self.context_bindings.insert(
            KeyContext::Confirm,
            vec![
                Keybinding::new(KeyCode::Char('y'), KeyAction::Confirm, "Y", "Run it"),
                Keybinding::new(KeyCode::Enter, KeyAction::Confirm, "Enter", "Run it"),
                Keybinding::new(KeyCode::Char('n'), KeyAction::Cancel, "N", "Cancel"),
                Keybinding::new(KeyCode::Esc, KeyAction::Cancel, "Esc", "Cancel"),
            ],
        );
    }

    fn has_globals(context: KeyContext) -> bool {
        !matches!(context, KeyContext::FilterInput | KeyContext::Confirm)
    }

    /// Bindings active in `context`, context-specific first
    pub fn get_bindings(&self, context: KeyContext) -> Vec<&Keybinding> {
        let mut bindings: Vec<&Keybinding> = Vec::new();
        if let Some(specific) = self.context_bindings.get(&context) {
            bindings.extend(specific.iter());
        }
        if Self::has_globals(context) {
            bindings.extend(self.global_bindings.iter());
        }
        bindings
    }

    /// Map a key press to an action
    pub fn resolve(&self, context: KeyContext, event: &KeyEvent) -> Option<KeyAction> {
        self.get_bindings(context)
            .into_iter()
            .find(|b| b.matches(event))
            .map(|b| b.action)
    }

    /// Nav bar items, Up/Down collapsed into one entry
    pub fn get_nav_items(&self, context: KeyContext) -> Vec<NavBarItem> {
        let mut items = Vec::new();
        let mut has_nav = false;
        for binding in self.get_bindings(context) {
            match binding.action {
                KeyAction::NavigateUp | KeyAction::NavigateDown => {
                    if !has_nav {
                        items.push(NavBarItem {
                            key_display: "Up/Dn".to_string(),
                            action_label: "Navigate".to_string(),
                        });
                        has_nav = true;
                    }
                }
                // Long-tail keys live in the help overlay only
                KeyAction::PageUp | KeyAction::PageDown | KeyAction::FollowLatest => {}
                _ if binding.modifiers != KeyModifiers::NONE => {}
                _ => items.push(NavBarItem {
                    key_display: binding.display.clone(),
                    action_label: binding.description.clone(),
                }),
            }
        }
        items
    }

    /// Full help content for the help overlay
    pub fn get_help_content(&self, context: KeyContext) -> Vec<HelpSection> {
        let bindings = self.get_bindings(context);
        let general = |a: KeyAction| {
            matches!(
                a,
                KeyAction::SwitchFocus | KeyAction::Help | KeyAction::Quit
            )
        };

        let mut sections = Vec::new();
        let specific: Vec<(String, String)> = bindings
            .iter()
            .filter(|b| !general(b.action))
            .map(|b| (b.display.clone(), b.description.clone()))
            .collect();
        if !specific.is_empty() {
            sections.push(HelpSection {
                title: context.title().to_string(),
                items: specific,
            });
        }

        let common: Vec<(String, String)> = bindings
            .iter()
            .filter(|b| general(b.action))
            .map(|b| (b.display.clone(), b.description.clone()))
            .collect();
        if !common.is_empty() {
            sections.push(HelpSection {
                title: "General".to_string(),
                items: common,
            });
        }
        sections
    }
}

/// Navigation bar item for display
#[derive(Debug, Clone)]
pub struct NavBarItem {
    pub key_display: String,
    pub action_label: String,
}

/// Help section for the help overlay
#[derive(Debug, Clone)]
pub struct HelpSection {
    pub title: String,
    pub items: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_resolve_context_specific_keys() {
        let ctx = KeybindingContext::new();
        assert_eq!(
            ctx.resolve(KeyContext::Services, &key(KeyCode::Char('x'))),
            Some(KeyAction::StopService)
        );
        assert_eq!(
            ctx.resolve(KeyContext::Logs, &key(KeyCode::Char(' '))),
            Some(KeyAction::ToggleStream)
        );
        assert_eq!(ctx.resolve(KeyContext::Database, &key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_globals_skip_text_input() {
        let ctx = KeybindingContext::new();
        assert_eq!(
            ctx.resolve(KeyContext::Sidebar, &key(KeyCode::Char('q'))),
            Some(KeyAction::Quit)
        );
        assert_eq!(ctx.resolve(KeyContext::FilterInput, &key(KeyCode::Char('q'))), None);
    }

    #[test]
    fn test_shifted_question_mark_opens_help() {
        let ctx = KeybindingContext::new();
        let event = KeyEvent::new(KeyCode::Char('?'), KeyModifiers::SHIFT);
        assert_eq!(ctx.resolve(KeyContext::Logs, &event), Some(KeyAction::Help));
    }

    #[test]
    fn test_ctrl_c_quits() {
        let ctx = KeybindingContext::new();
        let event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(ctx.resolve(KeyContext::Logs, &event), Some(KeyAction::Quit));
        // Plain 'c' still clears
        assert_eq!(
            ctx.resolve(KeyContext::Logs, &key(KeyCode::Char('c'))),
            Some(KeyAction::ClearLogs)
        );
    }

    #[test]
    fn test_nav_items_collapse_navigation() {
        let ctx = KeybindingContext::new();
        let items = ctx.get_nav_items(KeyContext::Sidebar);
        assert_eq!(items.iter().filter(|i| i.action_label == "Navigate").count(), 1);
        assert!(items.iter().all(|i| i.key_display != "Ctrl+C"));
    }

    #[test]
    fn test_help_has_general_section() {
        let ctx = KeybindingContext::new();
        let sections = ctx.get_help_content(KeyContext::Services);
        assert_eq!(sections[0].title, "Services");
        assert_eq!(sections.last().unwrap().title, "General");
    }
}
