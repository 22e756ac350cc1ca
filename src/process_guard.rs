//! Process lifecycle management for child processes
//!
//! Every action script and supervised service runs in its own process group
//! and is registered in a global registry. When opsdeck exits (normally, via
//! the `ProcessGuard` drop, or on SIGINT/SIGTERM/SIGHUP) every registered
//! group gets SIGTERM, a grace period, then SIGKILL.
//!
//! Children also get `PR_SET_PDEATHSIG(SIGTERM)`, so a hard crash of the
//! parent still takes them down.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Grace period used when the guard is dropped
pub const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Grace period used from the signal handler
pub const SIGNAL_GRACE: Duration = Duration::from_secs(3);

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// How a process group ended after `terminate_group`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Nothing was running under that pid
    AlreadyGone,
    /// Exited within the grace period after SIGTERM
    Graceful,
    /// Needed SIGKILL
    Killed,
}

/// Registry of live child process groups (pid == pgid)
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    /// Set once terminate_all ran, so exit paths do not race each other
    shutting_down: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Track a child in the global registry. Poisoning is tolerated.
    pub fn track(pid: u32) {
        if let Ok(mut registry) = Self::global().lock() {
            registry.register(pid);
        }
    }

    /// Stop tracking a child in the global registry
    pub fn untrack(pid: u32) {
        if let Ok(mut registry) = Self::global().lock() {
            registry.unregister(pid);
        }
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Registered child process group {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process group {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    /// Terminate every tracked group. Only the first call does any work.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.shutting_down {
            debug!("Child cleanup already ran, skipping");
            return;
        }
        self.shutting_down = true;

        if self.pids.is_empty() {
            return;
        }
        info!("Terminating {} child process group(s)", self.pids.len());

        let pids: Vec<u32> = self.pids.drain().collect();
        for &pid in &pids {
            signal_group(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && pids.iter().any(|&p| is_group_alive(p)) {
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_group_alive(pid) {
                warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
                signal_group(pid, Signal::SIGKILL);
            }
        }
        info!("Child process cleanup complete");
    }
}

/// Signal a whole group, falling back to the leader alone
fn signal_group(pgid: u32, sig: Signal) {
    if let Err(e) = signal::kill(Pid::from_raw(-(pgid as i32)), sig) {
        debug!("Group signal {} to {} failed ({}), trying the leader", sig, pgid, e);
        if let Err(e) = signal::kill(Pid::from_raw(pgid as i32), sig) {
            debug!("Signal {} to {} failed: {}", sig, pgid, e);
        }
    }
}

/// Terminate one child's process group: SIGTERM, wait up to `grace` for the
/// leader and every other member to exit, then SIGKILL the group.
///
/// `exited` reports whether the leader is gone; callers holding a
/// `std::process::Child` pass a closure around `try_wait` so the zombie is
/// reaped, others can use [`is_process_alive`].
pub fn terminate_group<F>(pid: u32, grace: Duration, mut exited: F) -> Termination
where
    F: FnMut() -> bool,
{
    if exited() && !is_group_alive(pid) {
        return Termination::AlreadyGone;
    }
    signal_group(pid, Signal::SIGTERM);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if exited() && !is_group_alive(pid) {
            debug!("Process group {} exited after SIGTERM", pid);
            return Termination::Graceful;
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    warn!("Process group {} did not exit within {:?}, sending SIGKILL", pid, grace);
    signal_group(pid, Signal::SIGKILL);
    Termination::Killed
}

/// True while any running (non-zombie) process is left in group `pgid`
pub fn is_group_alive(pgid: u32) -> bool {
    if signal::kill(Pid::from_raw(-(pgid as i32)), None).is_err() {
        return false;
    }

    let Ok(entries) = std::fs::read_dir("/proc") else {
        return true;
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|e| std::fs::read_to_string(e.path().join("stat")).ok())
        .any(|stat| {
            // After the command name: state, ppid, pgrp
            let mut fields = match stat.rsplit_once(')') {
                Some((_, rest)) => rest.split_whitespace(),
                None => return false,
            };
            let state = fields.next();
            let pgrp = fields.nth(1).and_then(|f| f.parse::<u32>().ok());
            pgrp == Some(pgid) && !matches!(state, Some("Z" | "X"))
        })
}

/// Check if a process is still alive (not dead or zombie)
pub fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state; Z and X are not running
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        if let Some(state) = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
        {
            return !matches!(state, "Z" | "X");
        }
    }

    true
}

/// RAII guard that terminates all registered children on drop.
/// Held by the application for its whole lifetime.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }

    /// Number of tracked children
    pub fn child_count(&self) -> usize {
        self.registry.lock().map(|r| r.count()).unwrap_or(0)
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        debug!("ProcessGuard dropped, terminating children");
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(EXIT_GRACE);
        }
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP that terminate every
/// registered child and exit with 128 + signal number. Call once at startup.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                let name = match sig {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    SIGHUP => "SIGHUP",
                    _ => "signal",
                };
                info!("Received {}, stopping children", name);

                if let Ok(mut registry) = ChildRegistry::global().lock() {
                    registry.terminate_all(SIGNAL_GRACE);
                }
                std::process::exit(128 + sig);
            }
        })?;

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        // SAFETY: the closure only calls async-signal-safe functions
        // (setpgid, prctl) between fork and exec.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::from)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();
        registry.register(1234);
        registry.register(5678);
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(1234));

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
        assert!(!registry.contains(1234));
    }

    #[test]
    fn test_terminate_group_stops_sleeping_child() {
        let mut child = Command::new("sleep")
            .arg("60")
            .in_new_process_group()
            .spawn()
            .expect("spawn sleep");
        let pid = child.id();

        let outcome = terminate_group(pid, Duration::from_secs(2), || {
            matches!(child.try_wait(), Ok(Some(_)))
        });
        assert_eq!(outcome, Termination::Graceful);
    }

    #[test]
    fn test_terminate_group_kills_after_grace() {
        let mut child = Command::new("bash")
            .args(["-c", "trap '' TERM; sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("spawn bash");
        let pid = child.id();
        std::thread::sleep(Duration::from_millis(100));

        let outcome = terminate_group(pid, Duration::from_millis(200), || {
            matches!(child.try_wait(), Ok(Some(_)))
        });
        assert_eq!(outcome, Termination::Killed);
        let status = child.wait().expect("reap");
        assert!(!status.success());
    }

    #[test]
    fn test_terminate_group_kills_members_outliving_leader() {
        use std::io::{BufRead, BufReader};

        let mut child = Command::new("sh")
            .args(["-c", "(trap '' TERM; exec sleep 300) & echo $!; wait"])
            .stdout(std::process::Stdio::piped())
            .in_new_process_group()
            .spawn()
            .expect("spawn sh");
        let pid = child.id();
        let mut line = String::new();
        BufReader::new(child.stdout.take().expect("stdout"))
            .read_line(&mut line)
            .expect("read member pid");
        let member: u32 = line.trim().parse().expect("member pid");
        std::thread::sleep(Duration::from_millis(100));
        assert!(is_group_alive(pid));

        let outcome = terminate_group(pid, Duration::from_millis(300), || {
            matches!(child.try_wait(), Ok(Some(_)))
        });
        assert_eq!(outcome, Termination::Killed);

        let deadline = Instant::now() + Duration::from_secs(2);
        while is_process_alive(member) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!is_process_alive(member), "group member {} survived", member);
        let _ = child.wait();
    }

    #[test]
    fn test_is_group_alive_without_group() {
        assert!(!is_group_alive(999_999));
    }

    #[test]
    fn test_terminate_group_on_exited_child() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        child.wait().expect("wait");
        let outcome = terminate_group(child.id(), Duration::from_millis(100), || true);
        assert_eq!(outcome, Termination::AlreadyGone);
    }

    #[test]
    fn test_terminate_all_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.register(999_999);
        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.shutting_down);
        assert_eq!(registry.count(), 0);

        registry.register(999_998);
        registry.terminate_all(Duration::from_millis(10));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(999_999));
    }

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }
}
