//! Process Supervisor
//!
//! Owns one OS process per configured service. Status, pid, resource usage,
//! uptime and restart counts are tracked per service and reconciled with the
//! real processes on a polling interval:
//!
//! - exit code 0 leaves a service `stopped`
//! - any other exit (including death by signal) marks it `error`
//! - services with `autorestart` are respawned up to `max_restarts` times
//!
//! Stopping sends SIGTERM to the service's process group, waits the grace
//! period, then sends SIGKILL. The state lock is never held during that wait.

pub mod stats;

pub use stats::{format_cpu, format_memory, format_uptime, ResourceSampler, ResourceUsage};

use crate::config::{DeckConfig, ServiceSpec, SupervisorSettings};
use crate::error::{DeckError, Result};
use crate::logs::pipe::spawn_publisher;
use crate::logs::stream::sleep_unless_stopped;
use crate::logs::LogAggregator;
use crate::process_guard::{terminate_group, ChildRegistry, CommandProcessGroup};
use crate::types::{LogChannel, LogLevel, OutputStream, ServiceStatus};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Point-in-time view of one service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSnapshot {
    pub id: String,
    pub name: String,
    pub status: ServiceStatus,
    pub pid: Option<u32>,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub uptime: Duration,
    pub restarts: u32,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
}

impl ServiceSnapshot {
    pub fn cpu_label(&self) -> String {
        format_cpu(self.cpu_percent)
    }

    pub fn memory_label(&self) -> String {
        format_memory(self.memory_bytes)
    }

    pub fn uptime_label(&self) -> String {
        format_uptime(self.uptime)
    }
}

/// A status transition seen by `reconcile`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: String,
    pub from: ServiceStatus,
    pub to: ServiceStatus,
}

/// Fleet totals for the summary tiles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub online: usize,
    pub stopped: usize,
    pub errored: usize,
    pub total_restarts: u32,
}

struct ServiceRuntime {
    spec: ServiceSpec,
    status: ServiceStatus,
    child: Option<Child>,
    pid: Option<u32>,
    started_at: Option<Instant>,
    restarts: u32,
    /// Respawns done by reconciliation since the last manual start
    auto_restarts: u32,
    usage: ResourceUsage,
    last_exit_code: Option<i32>,
    last_error: Option<String>,
}

impl ServiceRuntime {
    fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            status: ServiceStatus::Stopped,
            child: None,
            pid: None,
            started_at: None,
            restarts: 0,
            auto_restarts: 0,
            usage: ResourceUsage::default(),
            last_exit_code: None,
            last_error: None,
        }
    }

    fn snapshot(&self) -> ServiceSnapshot {
        let online = self.status.is_online();
        ServiceSnapshot {
            id: self.spec.id.clone(),
            name: self.spec.display_name().to_string(),
            status: self.status,
            pid: self.pid,
            cpu_percent: if online { self.usage.cpu_percent } else { 0.0 },
            memory_bytes: if online { self.usage.memory_bytes } else { 0 },
            uptime: match (online, self.started_at) {
                (true, Some(at)) => at.elapsed(),
                _ => Duration::ZERO,
            },
            restarts: self.restarts,
            last_exit_code: self.last_exit_code,
            last_error: self.last_error.clone(),
        }
    }

    /// Record the end of the process. Returns the resulting status.
    fn record_exit(&mut self, status: ExitStatus) -> ServiceStatus {
        if let Some(pid) = self.pid.take() {
            ChildRegistry::untrack(pid);
        }
        self.child = None;
        self.started_at = None;
        self.usage = ResourceUsage::default();
        self.last_exit_code = status.code();
        self.status = if status.success() {
            self.last_error = None;
            ServiceStatus::Stopped
        } else {
            self.last_error = Some(match status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "killed by a signal".to_string(),
            });
            ServiceStatus::Error
        };
        self.status
    }
}

struct SupervisorState {
    services: Vec<ServiceRuntime>,
    sampler: ResourceSampler,
}

impl SupervisorState {
    fn find(&mut self, id: &str) -> Result<&mut ServiceRuntime> {
        self.services
            .iter_mut()
            .find(|s| s.spec.id == id)
            .ok_or_else(|| DeckError::unknown_service(id))
    }
}

/// Shared handle to the supervised fleet
#[derive(Clone)]
pub struct Supervisor {
    state: Arc<Mutex<SupervisorState>>,
    logs: LogAggregator,
    base_dir: PathBuf,
    stop_grace: Duration,
}

impl Supervisor {
    pub fn new(config: &DeckConfig, logs: LogAggregator) -> Self {
        Self::with_services(config.services.clone(), logs)
            .with_base_dir(&config.scripts_dir)
            .with_stop_grace(Duration::from_millis(config.supervisor.stop_grace_ms))
    }

    pub fn with_services(specs: Vec<ServiceSpec>, logs: LogAggregator) -> Self {
        let services = specs.into_iter().map(ServiceRuntime::new).collect();
        Self {
            state: Arc::new(Mutex::new(SupervisorState {
                services,
                sampler: ResourceSampler::new(),
            })),
            logs,
            base_dir: PathBuf::from("."),
            stop_grace: Duration::from_millis(SupervisorSettings::default().stop_grace_ms),
        }
    }

    /// Working directory for services without their own `cwd`
    pub fn with_base_dir(mut self, dir: &Path) -> Self {
        self.base_dir = dir.to_path_buf();
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, SupervisorState>> {
        self.state.lock().map_err(DeckError::poisoned)
    }

    /// Snapshots in configuration order
    pub fn list_services(&self) -> Result<Vec<ServiceSnapshot>> {
        Ok(self.lock()?.services.iter().map(ServiceRuntime::snapshot).collect())
    }

    pub fn get(&self, id: &str) -> Result<ServiceSnapshot> {
        Ok(self.lock()?.find(id)?.snapshot())
    }

    pub fn ids(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.services.iter().map(|s| s.spec.id.clone()).collect())
    }

    /// Start a stopped or errored service
    pub fn start(&self, id: &str) -> Result<ServiceSnapshot> {
        let mut state = self.lock()?;
        let runtime = state.find(id)?;
        if runtime.status.is_online() {
            return Err(DeckError::AlreadyRunning { id: id.to_string() });
        }
        runtime.auto_restarts = 0;
        self.spawn(runtime)?;
        Ok(runtime.snapshot())
    }

    /// Stop an online service and reap it
    pub fn stop(&self, id: &str) -> Result<ServiceSnapshot> {
        let (mut child, pid, name) = {
            let mut state = self.lock()?;
            let runtime = state.find(id)?;
            let child = match (runtime.status.is_online(), runtime.child.take()) {
                (true, Some(child)) => child,
                (_, child) => {
                    runtime.child = child;
                    return Err(DeckError::NotRunning { id: id.to_string() });
                }
            };
            let pid = child.id();
            (child, pid, runtime.spec.display_name().to_string())
        };

        info!("Stopping service {} (pid {})", name, pid);
        let outcome = terminate_group(pid, self.stop_grace, || {
            matches!(child.try_wait(), Ok(Some(_)))
        });
        debug!("Service {} terminated: {:?}", name, outcome);
        let exit = child.wait();
        ChildRegistry::untrack(pid);

        let mut state = self.lock()?;
        let runtime = state.find(id)?;
        runtime.pid = None;
        runtime.started_at = None;
        runtime.usage = ResourceUsage::default();
        runtime.status = ServiceStatus::Stopped;
        runtime.last_error = None;
        runtime.last_exit_code = exit.ok().and_then(|s| s.code());
        self.logs.publish(
            LogChannel::Services,
            LogLevel::Info,
            name.as_str(),
            format!("Service {} stopped", name),
        );
        Ok(runtime.snapshot())
    }

    /// Stop (when online) and start again, counting a restart
    pub fn restart(&self, id: &str) -> Result<ServiceSnapshot> {
        match self.stop(id) {
            Ok(_) | Err(DeckError::NotRunning { .. }) => {}
            Err(e) => return Err(e),
        }
        let mut state = self.lock()?;
        let runtime = state.find(id)?;
        if runtime.status.is_online() {
            // Started by someone else in between
            return Err(DeckError::AlreadyRunning { id: id.to_string() });
        }
        runtime.auto_restarts = 0;
        self.spawn(runtime)?;
        runtime.restarts += 1;
        Ok(runtime.snapshot())
    }

    /// Start every service that is not online. Returns the failures.
    pub fn start_all(&self) -> Result<Vec<(String, DeckError)>> {
        let ids = self.ids()?;
        Ok(self.start_each(ids))
    }

    /// Start services configured with `autostart`. Returns the failures.
    pub fn start_autostart(&self) -> Result<Vec<(String, DeckError)>> {
        let ids: Vec<String> = self
            .lock()?
            .services
            .iter()
            .filter(|s| s.spec.autostart)
            .map(|s| s.spec.id.clone())
            .collect();
        Ok(self.start_each(ids))
    }

    fn start_each(&self, ids: Vec<String>) -> Vec<(String, DeckError)> {
        ids.into_iter()
            .filter_map(|id| match self.start(&id) {
                Ok(_) | Err(DeckError::AlreadyRunning { .. }) => None,
                Err(e) => {
                    warn!("Failed to start {}: {}", id, e);
                    Some((id, e))
                }
            })
            .collect()
    }

    /// Stop every online service concurrently. Returns the failures.
    pub fn stop_all(&self) -> Result<Vec<(String, DeckError)>> {
        let online: Vec<String> = self
            .lock()?
            .services
            .iter()
            .filter(|s| s.status.is_online())
            .map(|s| s.spec.id.clone())
            .collect();

        let failures = thread::scope(|scope| {
            let handles: Vec<_> = online
                .iter()
                .map(|id| (id, scope.spawn(move || self.stop(id))))
                .collect();
            handles
                .into_iter()
                .filter_map(|(id, handle)| match handle.join() {
                    Ok(Ok(_)) | Ok(Err(DeckError::NotRunning { .. })) => None,
                    Ok(Err(e)) => Some((id.clone(), e)),
                    Err(_) => Some((id.clone(), DeckError::state("stop thread panicked"))),
                })
                .collect()
        });
        Ok(failures)
    }

    /// Reap exited children, apply auto-restart and sample resource usage.
    /// Returns the status transitions observed.
    pub fn reconcile(&self) -> Result<Vec<StatusChange>> {
        let mut state = self.lock()?;
        let mut changes = Vec::new();

        for runtime in state.services.iter_mut() {
            let exited = match runtime.child.as_mut().map(|c| c.try_wait()) {
                Some(Ok(Some(status))) => status,
                Some(Ok(None)) | None => continue,
                Some(Err(e)) => {
                    warn!("Cannot poll service {}: {}", runtime.spec.id, e);
                    continue;
                }
            };

            let from = runtime.status;
            let to = runtime.record_exit(exited);
            let name = runtime.spec.display_name().to_string();
            match to {
                ServiceStatus::Error => {
                    let reason = runtime.last_error.clone().unwrap_or_default();
                    error!("Service {} {}", name, reason);
                    self.logs.publish(
                        LogChannel::Services,
                        LogLevel::Error,
                        name.as_str(),
                        format!("Service {} {}", name, reason),
                    );
                }
                _ => {
                    info!("Service {} exited cleanly", name);
                    self.logs.publish(
                        LogChannel::Services,
                        LogLevel::Info,
                        name.as_str(),
                        format!("Service {} exited", name),
                    );
                }
            }
            changes.push(StatusChange {
                id: runtime.spec.id.clone(),
                from,
                to,
            });

            if to == ServiceStatus::Error
                && runtime.spec.autorestart
                && runtime.auto_restarts < runtime.spec.max_restarts
            {
                runtime.auto_restarts += 1;
                info!(
                    "Auto-restarting {} ({}/{})",
                    name, runtime.auto_restarts, runtime.spec.max_restarts
                );
                if self.spawn(runtime).is_ok() {
                    runtime.restarts += 1;
                    changes.push(StatusChange {
                        id: runtime.spec.id.clone(),
                        from: to,
                        to: ServiceStatus::Online,
                    });
                }
            }
        }

        let pids: Vec<u32> = state.services.iter().filter_map(|s| s.pid).collect();
        let usage = state.sampler.sample(&pids);
        for runtime in state.services.iter_mut() {
            if let Some(pid) = runtime.pid {
                runtime.usage = usage.get(&pid).copied().unwrap_or_default();
            }
        }

        Ok(changes)
    }

    /// Run `reconcile` every `interval` on a background thread until the
    /// returned handle is dropped
    pub fn spawn_reconciler(&self, interval: Duration) -> Result<ReconcilerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let supervisor = self.clone();
        let handle = thread::Builder::new()
            .name("reconciler".to_string())
            .spawn(move || {
                debug!("Reconciler running every {:?}", interval);
                loop {
                    if let Err(e) = supervisor.reconcile() {
                        error!("Reconciliation failed: {}", e);
                    }
                    if sleep_unless_stopped(&flag, interval) {
                        break;
                    }
                }
            })?;
        Ok(ReconcilerHandle {
            stop,
            handle: Some(handle),
        })
    }

    pub fn summary(&self) -> Result<StatusSummary> {
        let state = self.lock()?;
        let mut summary = StatusSummary::default();
        for runtime in &state.services {
            match runtime.status {
                ServiceStatus::Online => summary.online += 1,
                ServiceStatus::Stopped => summary.stopped += 1,
                ServiceStatus::Error => summary.errored += 1,
            }
            summary.total_restarts += runtime.restarts;
        }
        Ok(summary)
    }

    /// Spawn the service process. On failure the service is left in error.
    fn spawn(&self, runtime: &mut ServiceRuntime) -> Result<()> {
        let spec = &runtime.spec;
        let name = spec.display_name().to_string();
        let cwd = spec.cwd.clone().unwrap_or_else(|| self.base_dir.clone());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start service {}: {}", name, e);
                runtime.status = ServiceStatus::Error;
                runtime.last_error = Some(e.to_string());
                self.logs.publish(
                    LogChannel::Services,
                    LogLevel::Error,
                    name.as_str(),
                    format!("Failed to start {}: {}", name, e),
                );
                return Err(DeckError::spawn(name, e));
            }
        };

        let pid = child.id();
        ChildRegistry::track(pid);

        let pipes = [
            (OutputStream::Stdout, child.stdout.take().map(|p| Box::new(p) as Box<dyn std::io::Read + Send>)),
            (OutputStream::Stderr, child.stderr.take().map(|p| Box::new(p) as Box<dyn std::io::Read + Send>)),
        ];
        for (stream, pipe) in pipes {
            let Some(pipe) = pipe else { continue };
            // Readers end on their own at EOF, when the process exits
            if let Err(e) = spawn_publisher(
                pipe,
                stream,
                self.logs.clone(),
                LogChannel::Services,
                name.clone(),
                |_, _| {},
            ) {
                warn!("No {} reader for {}: {}", stream, name, e);
            }
        }

        info!("Service {} started (pid {})", name, pid);
        self.logs.publish(
            LogChannel::Services,
            LogLevel::Info,
            name.as_str(),
            format!("Service {} started (pid {})", name, pid),
        );

        runtime.child = Some(child);
        runtime.pid = Some(pid);
        runtime.status = ServiceStatus::Online;
        runtime.started_at = Some(Instant::now());
        runtime.usage = ResourceUsage::default();
        runtime.last_error = None;
        Ok(())
    }
}

/// Stops the background reconciler when dropped
pub struct ReconcilerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Reconciler thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(specs: Vec<ServiceSpec>) -> Supervisor {
        Supervisor::with_services(specs, LogAggregator::new(100))
            .with_stop_grace(Duration::from_millis(500))
    }

    fn sleeper(id: &str) -> ServiceSpec {
        ServiceSpec::new(id, "sleep", &["30"])
    }

    /// Reconcile until `id` leaves online or the deadline passes
    fn reconcile_until_exit(sup: &Supervisor, id: &str) -> ServiceSnapshot {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            sup.reconcile().unwrap();
            let snap = sup.get(id).unwrap();
            if !snap.status.is_online() || Instant::now() > deadline {
                return snap;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_start_stop_cycle() {
        let sup = supervisor(vec![sleeper("worker")]);
        let snap = sup.start("worker").unwrap();
        assert_eq!(snap.status, ServiceStatus::Online);
        let pid = snap.pid.unwrap();

        assert!(matches!(
            sup.start("worker"),
            Err(DeckError::AlreadyRunning { .. })
        ));

        let snap = sup.stop("worker").unwrap();
        assert_eq!(snap.status, ServiceStatus::Stopped);
        assert_eq!(snap.pid, None);
        assert!(!crate::process_guard::is_process_alive(pid));

        assert!(matches!(sup.stop("worker"), Err(DeckError::NotRunning { .. })));
    }

    #[test]
    fn test_unknown_service() {
        let sup = supervisor(vec![]);
        assert!(matches!(
            sup.start("ghost"),
            Err(DeckError::UnknownService { .. })
        ));
    }

    #[test]
    fn test_restart_counts_and_goes_online() {
        let sup = supervisor(vec![sleeper("worker")]);
        let snap = sup.restart("worker").unwrap();
        assert_eq!(snap.status, ServiceStatus::Online);
        assert_eq!(snap.restarts, 1);

        let snap = sup.restart("worker").unwrap();
        assert_eq!(snap.restarts, 2);
        sup.stop_all().unwrap();
    }

    #[test]
    fn test_exit_codes_map_to_status() {
        let sup = supervisor(vec![
            ServiceSpec::new("clean", "sh", &["-c", "exit 0"]),
            ServiceSpec::new("broken", "sh", &["-c", "exit 3"]),
        ]);
        sup.start("clean").unwrap();
        sup.start("broken").unwrap();

        assert_eq!(reconcile_until_exit(&sup, "clean").status, ServiceStatus::Stopped);
        let broken = reconcile_until_exit(&sup, "broken");
        assert_eq!(broken.status, ServiceStatus::Error);
        assert_eq!(broken.last_exit_code, Some(3));

        // An errored service can be started again
        assert_eq!(sup.start("broken").unwrap().status, ServiceStatus::Online);
    }

    #[test]
    fn test_spawn_failure_marks_error() {
        let sup = supervisor(vec![ServiceSpec::new("bad", "/nonexistent/bin", &[])]);
        assert!(matches!(sup.start("bad"), Err(DeckError::Spawn { .. })));
        assert_eq!(sup.get("bad").unwrap().status, ServiceStatus::Error);
    }

    #[test]
    fn test_autorestart_is_bounded() {
        let mut spec = ServiceSpec::new("flaky", "sh", &["-c", "exit 1"]);
        spec.autorestart = true;
        spec.max_restarts = 2;
        let sup = supervisor(vec![spec]);
        sup.start("flaky").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            sup.reconcile().unwrap();
            let snap = sup.get("flaky").unwrap();
            if snap.status == ServiceStatus::Error && snap.restarts == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let snap = sup.get("flaky").unwrap();
        assert_eq!(snap.status, ServiceStatus::Error);
        assert_eq!(snap.restarts, 2);
    }

    #[test]
    fn test_summary_counts() {
        let sup = supervisor(vec![
            sleeper("a"),
            sleeper("b"),
            ServiceSpec::new("c", "/nonexistent/bin", &[]),
        ]);
        sup.start("a").unwrap();
        let _ = sup.start("c");

        let summary = sup.summary().unwrap();
        assert_eq!(summary.online, 1);
        assert_eq!(summary.stopped, 1);
        assert_eq!(summary.errored, 1);
        sup.stop_all().unwrap();
    }

    #[test]
    fn test_output_published_with_service_name() {
        let logs = LogAggregator::new(100);
        let sup = Supervisor::with_services(
            vec![ServiceSpec::new("echoer", "sh", &["-c", "echo ready; echo failing >&2"])],
            logs.clone(),
        );
        sup.start("echoer").unwrap();
        reconcile_until_exit(&sup, "echoer");
        thread::sleep(Duration::from_millis(100));

        let entries = logs.snapshot(LogChannel::Services);
        let ready = entries.iter().find(|e| e.message == "ready").unwrap();
        assert_eq!(ready.source, "echoer");
        let failing = entries.iter().find(|e| e.message == "failing").unwrap();
        assert_eq!(failing.level, LogLevel::Warn);
    }

    #[test]
    fn test_reconciler_handle_stops_on_drop() {
        let sup = supervisor(vec![]);
        let handle = sup.spawn_reconciler(Duration::from_millis(10)).unwrap();
        assert!(handle.is_running());
        let started = Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
