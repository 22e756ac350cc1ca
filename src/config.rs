//! Configuration file handling
//!
//! The whole deck (actions, services, log sources, supervisor timings) is
//! described by one JSON document. Every section is optional; missing
//! sections fall back to the defaults the dashboard ships with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logs::aggregator::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::logs::DEFAULT_RETENTION;
use crate::types::LogChannel;

/// A symbolic operation mapped to a concrete command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionSpec {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Requires operator confirmation before it runs
    #[serde(default)]
    pub destructive: bool,
    /// Channel receiving the action's output
    #[serde(default = "default_action_channel")]
    pub channel: LogChannel,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_action_channel() -> LogChannel {
    LogChannel::Database
}

impl ActionSpec {
    pub fn new(id: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            description: String::new(),
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            destructive: false,
            channel: default_action_channel(),
            timeout_secs: None,
        }
    }

    pub fn with_label(mut self, label: &str, description: &str) -> Self {
        self.label = label.to_string();
        self.description = description.to_string();
        self
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    pub fn on_channel(mut self, channel: LogChannel) -> Self {
        self.channel = channel;
        self
    }

    /// Label for menus, falling back to the id
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// The command line as the operator would type it
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A long-running process owned by the supervisor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Started by `Supervisor::start_autostart`
    #[serde(default)]
    pub autostart: bool,
    /// Respawn after a failing exit
    #[serde(default)]
    pub autorestart: bool,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_max_restarts() -> u32 {
    5
}

impl ServiceSpec {
    pub fn new(id: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: BTreeMap::new(),
            autostart: false,
            autorestart: false,
            max_restarts: default_max_restarts(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A log file followed into a channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSourceSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub channel: LogChannel,
    /// Source tag on entries; defaults to the file stem
    #[serde(default)]
    pub source: Option<String>,
}

impl FileSourceSpec {
    pub fn source_name(&self) -> String {
        self.source.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogSettings {
    /// Entries retained per channel
    pub retention: usize,
    /// Queue depth of each live subscription
    pub subscriber_capacity: usize,
    pub poll_interval_ms: u64,
    pub export_dir: PathBuf,
    /// Run the synthetic generator while streaming
    pub demo: bool,
    pub sources: Vec<FileSourceSpec>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            poll_interval_ms: 250,
            export_dir: PathBuf::from("."),
            demo: false,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Reconciliation interval
    pub poll_interval_ms: u64,
    /// SIGTERM-to-SIGKILL grace period when stopping a service
    pub stop_grace_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            stop_grace_ms: 5000,
        }
    }
}

/// Complete deck configuration that can be saved/loaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeckConfig {
    /// Working directory for actions; relative script paths resolve here
    pub scripts_dir: PathBuf,
    pub actions: Vec<ActionSpec>,
    pub services: Vec<ServiceSpec>,
    pub logs: LogSettings,
    pub supervisor: SupervisorSettings,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("."),
            actions: default_actions(),
            services: default_services(),
            logs: LogSettings::default(),
            supervisor: SupervisorSettings::default(),
        }
    }
}

/// The database and PM2 operations of the dashboard
pub fn default_actions() -> Vec<ActionSpec> {
    vec![
        ActionSpec::new("db-install", "bash", &["scripts/db/install.sh"]).with_label(
            "Install database",
            "Run the database installation scripts",
        ),
        ActionSpec::new("db-uninstall", "bash", &["scripts/db/uninstall.sh"])
            .with_label(
                "Uninstall database",
                "Remove the database from this system completely",
            )
            .destructive(),
        ActionSpec::new("db-clean", "bash", &["scripts/db/clean.sh"])
            .with_label(
                "Clean database",
                "Delete the data while keeping the schema",
            )
            .destructive(),
        ActionSpec::new("pm2-install", "pm2", &["start", "ecosystem.config.js"])
            .with_label("Install services", "Register and start the service fleet")
            .on_channel(LogChannel::Services),
        ActionSpec::new("pm2-reload", "pm2", &["reload", "ecosystem.config.js"])
            .with_label("Reload configuration", "Reload services with zero downtime")
            .on_channel(LogChannel::Services),
        ActionSpec::new("pm2-stop-all", "pm2", &["stop", "all"])
            .with_label("Stop all", "Stop every registered service")
            .on_channel(LogChannel::Services)
            .destructive(),
    ]
}

/// The service fleet the dashboard expects
pub fn default_services() -> Vec<ServiceSpec> {
    ["api-gateway", "auth-service", "notification-service", "file-processor"]
        .iter()
        .map(|name| {
            let script = format!("services/{}/index.js", name);
            ServiceSpec::new(*name, "node", &[script.as_str()])
        })
        .collect()
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl DeckConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load and validate `path`, or fall back to defaults when none is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for action in &self.actions {
            if !is_valid_id(&action.id) {
                anyhow::bail!(
                    "Action id '{}' must be lowercase letters, digits and '-'",
                    action.id
                );
            }
            if !seen.insert(action.id.as_str()) {
                anyhow::bail!("Duplicate action id '{}'", action.id);
            }
            if action.program.trim().is_empty() {
                anyhow::bail!("Action '{}' has no program", action.id);
            }
            if action.timeout_secs == Some(0) {
                anyhow::bail!("Action '{}' has a zero timeout", action.id);
            }
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !is_valid_id(&service.id) {
                anyhow::bail!(
                    "Service id '{}' must be lowercase letters, digits and '-'",
                    service.id
                );
            }
            if !seen.insert(service.id.as_str()) {
                anyhow::bail!("Duplicate service id '{}'", service.id);
            }
            if service.program.trim().is_empty() {
                anyhow::bail!("Service '{}' has no program", service.id);
            }
        }

        if self.logs.retention == 0 {
            anyhow::bail!("logs.retention must be greater than zero");
        }
        if self.logs.subscriber_capacity == 0 {
            anyhow::bail!("logs.subscriber_capacity must be greater than zero");
        }
        if self.logs.poll_interval_ms == 0 {
            anyhow::bail!("logs.poll_interval_ms must be greater than zero");
        }
        if self.supervisor.poll_interval_ms == 0 {
            anyhow::bail!("supervisor.poll_interval_ms must be greater than zero");
        }

        Ok(())
    }

    pub fn action(&self, id: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn service(&self, id: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DeckConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.actions.len(), 6);
        assert_eq!(config.services.len(), 4);
        assert_eq!(config.logs.retention, 100);
    }

    #[test]
    fn test_destructive_defaults() {
        let config = DeckConfig::default();
        let destructive: Vec<&str> = config
            .actions
            .iter()
            .filter(|a| a.destructive)
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(destructive, vec!["db-uninstall", "db-clean", "pm2-stop-all"]);
    }

    #[test]
    fn test_duplicate_action_rejected() {
        let mut config = DeckConfig::default();
        config.actions.push(ActionSpec::new("db-install", "true", &[]));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate action id"));
    }

    #[test]
    fn test_bad_ids_rejected() {
        let mut config = DeckConfig::default();
        config.services.push(ServiceSpec::new("Bad Name", "sleep", &["1"]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retention_rejected() {
        let mut config = DeckConfig::default();
        config.logs.retention = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "services": [ { "id": "worker", "program": "sleep", "args": ["30"] } ] }"#;
        let config: DeckConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.actions.len(), 6);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].max_restarts, 5);
        assert_eq!(config.supervisor.stop_grace_ms, 5000);
    }

    #[test]
    fn test_source_name_defaults_to_file_stem() {
        let spec = FileSourceSpec {
            path: PathBuf::from("/var/log/postgresql.log"),
            channel: LogChannel::Database,
            source: None,
        };
        assert_eq!(spec.source_name(), "postgresql");
    }

    #[test]
    fn test_command_line() {
        let action = ActionSpec::new("x", "pm2", &["stop", "all"]);
        assert_eq!(action.command_line(), "pm2 stop all");
    }
}
