//! command_executor.rs - Runs supervisor operations on a dedicated background thread.
//!
//! Stopping a service can wait out a multi-second grace period, so the TUI
//! never calls the supervisor directly. It sends a `CommandRequest` here and
//! picks up the `CommandResponse` on its next tick.

use crate::supervisor::Supervisor;
use std::fmt;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Unique identifier for each command request/response pair.
pub type CommandId = u64;

/// A supervisor operation requested by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    Start(String),
    Stop(String),
    Restart(String),
    StartAll,
    StopAll,
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(id) => write!(f, "start {}", id),
            Self::Stop(id) => write!(f, "stop {}", id),
            Self::Restart(id) => write!(f, "restart {}", id),
            Self::StartAll => write!(f, "start all services"),
            Self::StopAll => write!(f, "stop all services"),
        }
    }
}

#[derive(Debug)]
pub struct CommandRequest {
    pub id: CommandId,
    pub command: ServiceCommand,
}

/// Ok carries a status line for the UI, Err the failure message.
#[derive(Debug)]
pub struct CommandResponse {
    pub id: CommandId,
    pub command: ServiceCommand,
    pub result: Result<String, String>,
}

fn join_failures(failures: Vec<(String, crate::error::DeckError)>) -> Result<(), String> {
    if failures.is_empty() {
        return Ok(());
    }
    Err(failures
        .iter()
        .map(|(id, e)| format!("{}: {}", id, e))
        .collect::<Vec<_>>()
        .join("; "))
}

/// Execute one command against the supervisor
pub fn execute(supervisor: &Supervisor, command: &ServiceCommand) -> Result<String, String> {
    let result = match command {
        ServiceCommand::Start(id) => supervisor
            .start(id)
            .map(|s| format!("Started {} (pid {})", s.name, s.pid.unwrap_or_default())),
        ServiceCommand::Stop(id) => supervisor.stop(id).map(|s| format!("Stopped {}", s.name)),
        ServiceCommand::Restart(id) => supervisor
            .restart(id)
            .map(|s| format!("Restarted {} ({} restarts)", s.name, s.restarts)),
        ServiceCommand::StartAll => {
            return supervisor
                .start_all()
                .map_err(|e| e.to_string())
                .and_then(join_failures)
                .map(|_| "All services started".to_string());
        }
        ServiceCommand::StopAll => {
            return supervisor
                .stop_all()
                .map_err(|e| e.to_string())
                .and_then(join_failures)
                .map(|_| "All services stopped".to_string());
        }
    };
    result.map_err(|e| e.to_string())
}

/// Spawns a dedicated thread serving `CommandRequest`s until the request
/// channel closes or the response receiver is dropped.
pub fn spawn_executor_thread(
    supervisor: Supervisor,
    request_rx: Receiver<CommandRequest>,
    response_tx: Sender<CommandResponse>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("service-commands".to_string())
        .spawn(move || {
            debug!("Command executor thread started.");
            while let Ok(request) = request_rx.recv() {
                debug!("Executing command request: {:?}", request);
                let result = execute(&supervisor, &request.command);
                let response = CommandResponse {
                    id: request.id,
                    command: request.command,
                    result,
                };
                if response_tx.send(response).is_err() {
                    error!("Failed to send command response. Receiver probably dropped.");
                    break;
                }
            }
            debug!("Command executor thread shut down.");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSpec;
    use crate::logs::LogAggregator;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_requests_are_answered_in_order() {
        let supervisor = Supervisor::with_services(
            vec![ServiceSpec::new("worker", "sleep", &["30"])],
            LogAggregator::new(10),
        )
        .with_stop_grace(Duration::from_millis(500));
        let (req_tx, req_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();
        let handle = spawn_executor_thread(supervisor, req_rx, resp_tx).unwrap();

        req_tx
            .send(CommandRequest { id: 1, command: ServiceCommand::Start("worker".into()) })
            .unwrap();
        req_tx
            .send(CommandRequest { id: 2, command: ServiceCommand::Start("worker".into()) })
            .unwrap();
        req_tx
            .send(CommandRequest { id: 3, command: ServiceCommand::Stop("worker".into()) })
            .unwrap();

        let timeout = Duration::from_secs(5);
        let first = resp_rx.recv_timeout(timeout).unwrap();
        assert_eq!(first.id, 1);
        assert!(first.result.is_ok());
        let second = resp_rx.recv_timeout(timeout).unwrap();
        assert!(second.result.unwrap_err().contains("already running"));
        let third = resp_rx.recv_timeout(timeout).unwrap();
        assert_eq!(third.result.unwrap(), "Stopped worker");

        drop(req_tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_unknown_service_reports_error() {
        let supervisor = Supervisor::with_services(vec![], LogAggregator::new(10));
        let result = execute(&supervisor, &ServiceCommand::Restart("ghost".into()));
        assert!(result.unwrap_err().contains("Unknown service"));
    }

    #[test]
    fn test_command_labels() {
        assert_eq!(ServiceCommand::Stop("api".into()).to_string(), "stop api");
        assert_eq!(ServiceCommand::StopAll.to_string(), "stop all services");
    }
}
