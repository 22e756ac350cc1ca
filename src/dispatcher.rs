//! Command Dispatcher
//!
//! Maps a symbolic action id (`db-install`, `pm2-reload`, ...) to the command
//! configured for it and owns the resulting process:
//!
//! - at most one invocation per action id is in flight
//! - destructive actions only run once the caller confirms them
//! - the child runs in its own process group and is registered for cleanup
//! - stdout/stderr are streamed line by line as [`ExecEvent`]s and published
//!   to the [`LogAggregator`] on the action's channel
//! - the exit code is surfaced in the final [`ActionOutcome`]

use crate::config::{ActionSpec, DeckConfig};
use crate::error::{DeckError, Result};
use crate::logs::pipe::spawn_publisher;
use crate::logs::LogAggregator;
use crate::process_guard::{terminate_group, ChildRegistry, CommandProcessGroup, Termination};
use crate::types::{ActionStatus, LogLevel, OutputStream};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often a running action is checked for exit or timeout
const EXIT_POLL: Duration = Duration::from_millis(50);

/// SIGTERM-to-SIGKILL grace when an action times out
const TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// How long output readers may keep draining after the action exited.
/// A background process holding the pipes open is left to them after that.
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

/// Progress of one action invocation, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ExecEvent {
    /// The process was spawned. `pid` is None in dry-run mode.
    Started { action: String, pid: Option<u32> },
    Output {
        action: String,
        stream: OutputStream,
        line: String,
    },
    Finished(ActionOutcome),
    /// The process could not be waited on
    Failed { action: String, error: String },
}

impl ExecEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Failed { .. })
    }
}

/// Result of a completed invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub action: String,
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration: Duration,
    pub timed_out: bool,
    pub dry_run: bool,
}

impl ActionOutcome {
    /// Turn a failed outcome into an error
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            return Ok(());
        }
        if self.timed_out {
            return Err(DeckError::action(format!(
                "{} timed out after {:.1}s",
                context,
                self.duration.as_secs_f64()
            )));
        }
        match self.exit_code {
            Some(code) => Err(DeckError::action(format!(
                "{} failed (exit code {})",
                context, code
            ))),
            None => Err(DeckError::action(format!(
                "{} was terminated by a signal",
                context
            ))),
        }
    }

    /// Status flag for the dashboard
    pub fn status(&self) -> ActionStatus {
        if self.success {
            ActionStatus::Success
        } else {
            ActionStatus::Error
        }
    }
}

/// Marks an action id as in flight until dropped
struct InFlightGuard {
    id: String,
    set: Arc<Mutex<HashSet<String>>>,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, id: &str) -> Result<Self> {
        let mut running = set.lock().map_err(DeckError::poisoned)?;
        if !running.insert(id.to_string()) {
            return Err(DeckError::ActionInFlight { id: id.to_string() });
        }
        Ok(Self {
            id: id.to_string(),
            set: Arc::clone(set),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // Runs during unwinding too, so recover a poisoned set
        let mut running = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        running.remove(&self.id);
        debug!("Action {} released", self.id);
    }
}

/// Handle to one running invocation
pub struct Execution {
    action: String,
    events: Receiver<ExecEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Execution {
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Events produced since the last call, without blocking
    pub fn try_events(&self) -> Vec<ExecEvent> {
        self.events.try_iter().collect()
    }

    /// True once the worker thread has returned
    pub fn worker_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Next event, waiting up to `timeout`
    pub fn next_event(&self, timeout: Duration) -> Option<ExecEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Block until the invocation ends, discarding remaining output events
    pub fn wait(self) -> Result<ActionOutcome> {
        self.wait_with(|_| {})
    }

    /// Block until the invocation ends, handing every event to `on_event`
    pub fn wait_with<F: FnMut(&ExecEvent)>(mut self, mut on_event: F) -> Result<ActionOutcome> {
        let mut result = Err(DeckError::state(format!(
            "worker for {} ended without an outcome",
            self.action
        )));
        loop {
            match self.events.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => {
                    on_event(&event);
                    match event {
                        ExecEvent::Finished(outcome) => {
                            result = Ok(outcome);
                            break;
                        }
                        ExecEvent::Failed { error, .. } => {
                            result = Err(DeckError::action(error));
                            break;
                        }
                        _ => {}
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Worker thread for {} panicked", self.action);
            }
        }
        result
    }
}

/// Runs configured actions
#[derive(Clone)]
pub struct Dispatcher {
    actions: Vec<ActionSpec>,
    scripts_dir: PathBuf,
    in_flight: Arc<Mutex<HashSet<String>>>,
    logs: LogAggregator,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(config: &DeckConfig, logs: LogAggregator) -> Self {
        Self::from_actions(config.actions.clone(), &config.scripts_dir, logs)
    }

    pub fn from_actions(actions: Vec<ActionSpec>, scripts_dir: &Path, logs: LogAggregator) -> Self {
        Self {
            actions,
            scripts_dir: scripts_dir.to_path_buf(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            logs,
            dry_run: false,
        }
    }

    /// Describe commands instead of running them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Configured actions in configuration order
    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    pub fn action(&self, id: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    /// Start an action. Destructive actions are refused with
    /// `ConfirmationRequired`; use [`Dispatcher::execute_confirmed`].
    pub fn execute(&self, id: &str) -> Result<Execution> {
        self.launch(id, false)
    }

    /// Start an action the operator has explicitly confirmed
    pub fn execute_confirmed(&self, id: &str) -> Result<Execution> {
        self.launch(id, true)
    }

    fn launch(&self, id: &str, confirmed: bool) -> Result<Execution> {
        let spec = self
            .action(id)
            .cloned()
            .ok_or_else(|| DeckError::unknown_action(id))?;
        if spec.destructive && !confirmed {
            return Err(DeckError::ConfirmationRequired { id: spec.id });
        }
        let guard = InFlightGuard::acquire(&self.in_flight, &spec.id)?;

        if self.dry_run {
            return self.launch_dry_run(spec, guard);
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .current_dir(&self.scripts_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        info!("Executing {}: {}", spec.id, spec.command_line());
        let mut child = cmd
            .spawn()
            .map_err(|e| DeckError::spawn(spec.command_line(), e))?;
        let pid = child.id();
        ChildRegistry::track(pid);

        let (tx, rx) = mpsc::channel();
        let _ = tx.send(ExecEvent::Started {
            action: spec.id.clone(),
            pid: Some(pid),
        });
        self.logs.publish(
            spec.channel,
            LogLevel::Info,
            spec.id.as_str(),
            format!("Starting {} ({})", spec.display_label(), spec.command_line()),
        );

        let readers = self.spawn_readers(&spec, &mut child, &tx);
        let logs = self.logs.clone();
        let action = spec.id.clone();

        let worker = thread::Builder::new()
            .name(format!("action-{}", spec.id))
            .spawn(move || {
                let _guard = guard;
                run_to_completion(spec, child, readers, tx, logs);
            });

        match worker {
            Ok(handle) => Ok(Execution {
                action,
                events: rx,
                handle: Some(handle),
            }),
            Err(e) => {
                // The closure (child included) was dropped; make sure the
                // process does not outlive the failed launch.
                terminate_group(pid, TIMEOUT_GRACE, || !crate::process_guard::is_process_alive(pid));
                ChildRegistry::untrack(pid);
                Err(DeckError::spawn(format!("worker thread for {}", action), e))
            }
        }
    }

    fn launch_dry_run(&self, spec: ActionSpec, guard: InFlightGuard) -> Result<Execution> {
        let (tx, rx) = mpsc::channel();
        let line = format!(
            "[DRY RUN] Would execute in {}: {}",
            self.scripts_dir.display(),
            spec.command_line()
        );
        info!("{}", line);
        self.logs
            .publish(spec.channel, LogLevel::Info, spec.id.as_str(), line.as_str());

        let _ = tx.send(ExecEvent::Started {
            action: spec.id.clone(),
            pid: None,
        });
        let _ = tx.send(ExecEvent::Output {
            action: spec.id.clone(),
            stream: OutputStream::Stdout,
            line,
        });
        let _ = tx.send(ExecEvent::Finished(ActionOutcome {
            action: spec.id.clone(),
            exit_code: Some(0),
            success: true,
            duration: Duration::ZERO,
            timed_out: false,
            dry_run: true,
        }));
        drop(guard);

        Ok(Execution {
            action: spec.id,
            events: rx,
            handle: None,
        })
    }

    fn spawn_readers(
        &self,
        spec: &ActionSpec,
        child: &mut Child,
        tx: &Sender<ExecEvent>,
    ) -> Vec<JoinHandle<()>> {
        let mut readers = Vec::new();
        let pipes: [(OutputStream, Option<Box<dyn std::io::Read + Send>>); 2] = [
            (
                OutputStream::Stdout,
                child.stdout.take().map(|p| Box::new(p) as Box<dyn std::io::Read + Send>),
            ),
            (
                OutputStream::Stderr,
                child.stderr.take().map(|p| Box::new(p) as Box<dyn std::io::Read + Send>),
            ),
        ];

        for (stream, pipe) in pipes {
            let Some(pipe) = pipe else { continue };
            let tx = tx.clone();
            let action = spec.id.clone();
            let spawned = spawn_publisher(
                pipe,
                stream,
                self.logs.clone(),
                spec.channel,
                spec.id.clone(),
                move |stream, line| {
                    // The receiver may be gone; the aggregator still gets the line
                    let _ = tx.send(ExecEvent::Output {
                        action: action.clone(),
                        stream,
                        line: line.to_string(),
                    });
                },
            );
            match spawned {
                Ok(handle) => readers.push(handle),
                Err(e) => warn!("Failed to start {} reader for {}: {}", stream, spec.id, e),
            }
        }
        readers
    }
}

/// Join readers that reach EOF within `limit`. Readers still blocked on a
/// pipe some leftover process holds open are detached; they keep publishing
/// to the aggregator until that process closes it.
fn drain_readers(action: &str, readers: Vec<JoinHandle<()>>, limit: Duration) {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline && !readers.iter().all(|r| r.is_finished()) {
        thread::sleep(Duration::from_millis(10));
    }
    for reader in readers {
        if !reader.is_finished() {
            debug!("Output of {} is still open after exit, detaching reader", action);
            continue;
        }
        if reader.join().is_err() {
            warn!("Output reader for {} panicked", action);
        }
    }
}

/// Worker body: wait for exit (enforcing the timeout), drain the readers
/// for at most [`OUTPUT_DRAIN`], then report the outcome.
fn run_to_completion(
    spec: ActionSpec,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    tx: Sender<ExecEvent>,
    logs: LogAggregator,
) {
    let pid = child.id();
    let started = Instant::now();
    let deadline = spec.timeout_secs.map(|s| started + Duration::from_secs(s));
    let mut timed_out = false;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {}
            Err(e) => break Err(e),
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                warn!("Action {} exceeded its {}s timeout", spec.id, spec.timeout_secs.unwrap_or(0));
                timed_out = true;
                let how = terminate_group(pid, TIMEOUT_GRACE, || {
                    matches!(child.try_wait(), Ok(Some(_)))
                });
                debug!("Timed out action {} ended: {:?}", spec.id, how);
                if how == Termination::Killed {
                    let _ = child.kill();
                }
                break child.wait();
            }
        }
        thread::sleep(EXIT_POLL);
    };

    drain_readers(&spec.id, readers, OUTPUT_DRAIN);
    ChildRegistry::untrack(pid);

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            let message = format!("Failed to wait for {}: {}", spec.id, e);
            error!("{}", message);
            logs.publish(spec.channel, LogLevel::Error, spec.id.as_str(), message.as_str());
            let _ = tx.send(ExecEvent::Failed {
                action: spec.id,
                error: message,
            });
            return;
        }
    };

    let outcome = ActionOutcome {
        action: spec.id.clone(),
        exit_code: status.code(),
        success: status.success() && !timed_out,
        duration: started.elapsed(),
        timed_out,
        dry_run: false,
    };

    if outcome.success {
        info!("Action {} completed in {:?}", spec.id, outcome.duration);
        logs.publish(
            spec.channel,
            LogLevel::Info,
            spec.id.as_str(),
            format!("{} completed successfully", spec.display_label()),
        );
    } else {
        let reason = match (outcome.timed_out, outcome.exit_code) {
            (true, _) => "timed out".to_string(),
            (false, Some(code)) => format!("failed with exit code {}", code),
            (false, None) => "was terminated by a signal".to_string(),
        };
        warn!("Action {} {}", spec.id, reason);
        logs.publish(
            spec.channel,
            LogLevel::Error,
            spec.id.as_str(),
            format!("{} {}", spec.display_label(), reason),
        );
    }

    let _ = tx.send(ExecEvent::Finished(outcome));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogChannel;

    fn sh(id: &str, script: &str) -> ActionSpec {
        ActionSpec::new(id, "sh", &["-c", script])
    }

    fn dispatcher(actions: Vec<ActionSpec>) -> (Dispatcher, LogAggregator) {
        let logs = LogAggregator::new(100);
        let d = Dispatcher::from_actions(actions, Path::new("."), logs.clone());
        (d, logs)
    }

    #[test]
    fn test_events_are_ordered() {
        let (d, _) = dispatcher(vec![sh("hello", "echo one; echo two")]);
        let mut events = Vec::new();
        let outcome = d
            .execute("hello")
            .unwrap()
            .wait_with(|e| events.push(e.clone()))
            .unwrap();

        assert!(matches!(events[0], ExecEvent::Started { pid: Some(_), .. }));
        let lines: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ExecEvent::Output { line, .. } => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
        assert!(events.last().unwrap().is_terminal());
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[test]
    fn test_exit_code_is_surfaced() {
        let (d, logs) = dispatcher(vec![sh("fail", "exit 3")]);
        let outcome = d.execute("fail").unwrap().wait().unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success);
        assert_eq!(outcome.status(), ActionStatus::Error);
        assert!(outcome.ensure_success("fail").is_err());
        // Failure line is mirrored into errors
        assert!(!logs.is_empty(LogChannel::Errors));
    }

    #[test]
    fn test_unknown_action() {
        let (d, _) = dispatcher(vec![]);
        assert!(matches!(
            d.execute("nope"),
            Err(DeckError::UnknownAction { .. })
        ));
    }

    #[test]
    fn test_destructive_requires_confirmation() {
        let (d, _) = dispatcher(vec![sh("wipe", "true").destructive()]);
        assert!(matches!(
            d.execute("wipe"),
            Err(DeckError::ConfirmationRequired { .. })
        ));
        assert!(!d.is_running("wipe"));
        let outcome = d.execute_confirmed("wipe").unwrap().wait().unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn test_duplicate_invocation_refused_until_done() {
        let (d, _) = dispatcher(vec![sh("slow", "sleep 0.3")]);
        let first = d.execute("slow").unwrap();
        assert!(d.is_running("slow"));
        assert!(matches!(
            d.execute("slow"),
            Err(DeckError::ActionInFlight { .. })
        ));

        first.wait().unwrap();
        assert!(!d.is_running("slow"));
        d.execute("slow").unwrap().wait().unwrap();
    }

    #[test]
    fn test_spawn_failure_releases_guard() {
        let (d, _) = dispatcher(vec![ActionSpec::new("ghost", "/nonexistent/program", &[])]);
        assert!(matches!(d.execute("ghost"), Err(DeckError::Spawn { .. })));
        assert!(!d.is_running("ghost"));
    }

    #[test]
    fn test_timeout_kills_process_group() {
        let mut spec = sh("hang", "sleep 30");
        spec.timeout_secs = Some(1);
        let (d, _) = dispatcher(vec![spec]);

        let started = Instant::now();
        let outcome = d.execute("hang").unwrap().wait().unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_dry_run_spawns_nothing() {
        let (d, logs) = dispatcher(vec![sh("hello", "exit 1")]);
        let d = d.with_dry_run(true);
        let outcome = d.execute("hello").unwrap().wait().unwrap();
        assert!(outcome.success);
        assert!(outcome.dry_run);
        let entries = logs.snapshot(LogChannel::Database);
        assert!(entries[0].message.starts_with("[DRY RUN]"));
        assert!(!d.is_running("hello"));
    }

    #[test]
    fn test_output_reaches_aggregator_with_levels() {
        let (d, logs) = dispatcher(vec![sh("mixed", "echo fine; echo oops >&2")]);
        d.execute("mixed").unwrap().wait().unwrap();

        let entries = logs.snapshot(LogChannel::Database);
        let fine = entries.iter().find(|e| e.message == "fine").unwrap();
        let oops = entries.iter().find(|e| e.message == "oops").unwrap();
        assert_eq!(fine.level, LogLevel::Info);
        assert_eq!(oops.level, LogLevel::Warn);
        assert_eq!(oops.source, "mixed");
    }
}
