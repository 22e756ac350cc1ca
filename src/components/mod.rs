//! Reusable TUI components

pub mod help_overlay;
pub mod keybindings;
pub mod nav_bar;
