//! Integration tests for the process supervisor
//!
//! These tests verify that:
//! 1. Stopping a service tears down its whole process group
//! 2. A service ignoring SIGTERM is killed after the grace period
//! 3. Reconciliation reports exits with the right status
//! 4. Service operations through the command worker keep working in order

use opsdeck::command_executor::{self, ServiceCommand};
use opsdeck::config::{DeckConfig, ServiceSpec};
use opsdeck::logs::LogAggregator;
use opsdeck::process_guard::{is_group_alive, is_process_alive};
use opsdeck::supervisor::Supervisor;
use opsdeck::types::{LogChannel, ServiceStatus};
use std::thread;
use std::time::{Duration, Instant};

fn supervisor(specs: Vec<ServiceSpec>) -> (Supervisor, LogAggregator) {
    let logs = LogAggregator::new(100);
    let sup = Supervisor::with_services(specs, logs.clone())
        .with_stop_grace(Duration::from_millis(500));
    (sup, logs)
}

/// Wait for a process to die with timeout
fn wait_for_process_death(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !is_process_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

/// Poll until `path` holds a pid written by the service
fn read_pid_file(path: &std::path::Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        assert!(Instant::now() < deadline, "service never wrote its pid file");
        thread::sleep(Duration::from_millis(20));
    }
}

/// Reconcile until `id` reaches `status`
fn wait_for_status(sup: &Supervisor, id: &str, status: ServiceStatus) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        sup.reconcile().unwrap();
        if sup.get(id).unwrap().status == status {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn test_stop_kills_grandchildren() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    let script = format!("sleep 300 & echo $! > {}; wait", pid_file.display());
    let (sup, _) = supervisor(vec![ServiceSpec::new("tree", "sh", &["-c", &script])]);

    let leader = sup.start("tree").unwrap().pid.unwrap();
    let grandchild = read_pid_file(&pid_file);
    assert!(is_process_alive(grandchild));

    let stopped = sup.stop("tree").unwrap();
    assert_eq!(stopped.status, ServiceStatus::Stopped);
    assert!(stopped.pid.is_none());
    assert!(wait_for_process_death(leader, Duration::from_secs(3)));
    assert!(
        wait_for_process_death(grandchild, Duration::from_secs(3)),
        "grandchild {} survived the stop",
        grandchild
    );
}

#[test]
fn test_stop_kills_grandchild_ignoring_term() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("stubborn.pid");
    let script = format!(
        "(trap '' TERM; exec sleep 300) & echo $! > {}; wait",
        pid_file.display()
    );
    let (sup, _) = supervisor(vec![ServiceSpec::new("tree", "sh", &["-c", &script])]);

    let leader = sup.start("tree").unwrap().pid.unwrap();
    let grandchild = read_pid_file(&pid_file);
    assert!(is_process_alive(grandchild));

    sup.stop("tree").unwrap();
    assert!(
        wait_for_process_death(grandchild, Duration::from_secs(3)),
        "grandchild {} ignored SIGTERM and survived the stop",
        grandchild
    );
    assert!(!is_group_alive(leader));
}

#[test]
fn test_stop_escalates_when_term_is_ignored() {
    let (sup, _) = supervisor(vec![ServiceSpec::new(
        "stubborn",
        "sh",
        &["-c", "trap '' TERM; while true; do sleep 0.1; done"],
    )]);
    let pid = sup.start("stubborn").unwrap().pid.unwrap();
    // Give the shell time to install its trap
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    sup.stop("stubborn").unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(wait_for_process_death(pid, Duration::from_secs(2)));
}

#[test]
fn test_reconcile_reports_error_exit() {
    let (sup, logs) = supervisor(vec![ServiceSpec::new("crashy", "sh", &["-c", "exit 7"])]);
    sup.start("crashy").unwrap();

    assert!(wait_for_status(&sup, "crashy", ServiceStatus::Error));
    let snapshot = sup.get("crashy").unwrap();
    assert_eq!(snapshot.last_exit_code, Some(7));
    assert!(snapshot.pid.is_none());
    // Error lines are mirrored onto the errors channel
    assert!(!logs.snapshot(LogChannel::Errors).is_empty());
}

#[test]
fn test_reconcile_reports_clean_exit_as_stopped() {
    let (sup, _) = supervisor(vec![ServiceSpec::new("oneshot", "true", &[])]);
    sup.start("oneshot").unwrap();
    assert!(wait_for_status(&sup, "oneshot", ServiceStatus::Stopped));
    assert_eq!(sup.get("oneshot").unwrap().last_exit_code, Some(0));
}

#[test]
fn test_start_from_error_goes_online() {
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("fail-once");
    std::fs::write(&flag, "").unwrap();
    let script = format!(
        "if [ -e {0} ]; then rm {0}; exit 1; fi; sleep 30",
        flag.display()
    );
    let (sup, _) = supervisor(vec![ServiceSpec::new("flaky", "sh", &["-c", &script])]);

    sup.start("flaky").unwrap();
    assert!(wait_for_status(&sup, "flaky", ServiceStatus::Error));

    let snapshot = sup.start("flaky").unwrap();
    assert_eq!(snapshot.status, ServiceStatus::Online);
    sup.stop("flaky").unwrap();
}

#[test]
fn test_supervisor_uses_config_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    let config = DeckConfig {
        scripts_dir: dir.path().to_path_buf(),
        services: vec![ServiceSpec::new("touch", "touch", &["started"])],
        ..DeckConfig::default()
    };
    let sup = Supervisor::new(&config, LogAggregator::new(10));

    sup.start("touch").unwrap();
    assert!(wait_for_status(&sup, "touch", ServiceStatus::Stopped));
    assert!(marker.exists());
}

#[test]
fn test_stop_all_collects_only_real_failures() {
    let (sup, _) = supervisor(vec![
        ServiceSpec::new("a", "sleep", &["30"]),
        ServiceSpec::new("b", "sleep", &["30"]),
        ServiceSpec::new("c", "sleep", &["30"]),
    ]);
    assert!(sup.start_all().unwrap().is_empty());
    assert_eq!(sup.summary().unwrap().online, 3);

    let failures = sup.stop_all().unwrap();
    assert!(failures.is_empty());
    assert_eq!(sup.summary().unwrap().stopped, 3);
}

#[test]
fn test_command_executor_round_trip() {
    let (sup, _) = supervisor(vec![ServiceSpec::new("api", "sleep", &["30"])]);

    let started = command_executor::execute(&sup, &ServiceCommand::Start("api".into())).unwrap();
    assert!(started.starts_with("Started api"));

    let restarted =
        command_executor::execute(&sup, &ServiceCommand::Restart("api".into())).unwrap();
    assert_eq!(restarted, "Restarted api (1 restarts)");

    let err = command_executor::execute(&sup, &ServiceCommand::Start("api".into())).unwrap_err();
    assert!(err.contains("already running"));

    command_executor::execute(&sup, &ServiceCommand::StopAll).unwrap();
    let err = command_executor::execute(&sup, &ServiceCommand::Stop("api".into())).unwrap_err();
    assert!(err.contains("not running"));
}
