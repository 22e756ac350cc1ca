//! opsdeck - Main entry point
//!
//! Dispatches the CLI subcommands: the interactive dashboard and the headless
//! run / supervise / logs / config modes.

use anyhow::{anyhow, bail, Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use opsdeck::app::App;
use opsdeck::cli::{Cli, Commands, ConfigCommands};
use opsdeck::config::DeckConfig;
use opsdeck::dispatcher::{Dispatcher, ExecEvent};
use opsdeck::error::DeckError;
use opsdeck::logs::stream::sleep_unless_stopped;
use opsdeck::logs::{FileTailer, LogAggregator, LogFilter};
use opsdeck::process_guard::{self, ProcessGuard};
use opsdeck::supervisor::Supervisor;
use opsdeck::types::{LogChannel, OutputStream};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::OpenOptions;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Where opsdeck's own diagnostics go
enum LogTarget {
    /// The dashboard owns the terminal
    File(PathBuf),
    Stderr,
}

/// Initialize tracing; `RUST_LOG` overrides the default `info` filter
fn init_tracing(target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match target {
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow!(e))?;
        }
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow!(e))?;
        }
    }
    Ok(())
}

/// Main application entry point
fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let command = cli.command.unwrap_or(Commands::Tui { demo: false });

    let target = match command {
        Commands::Tui { .. } => LogTarget::File(
            cli.log_file
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("opsdeck.log")),
        ),
        _ => LogTarget::Stderr,
    };
    init_tracing(target)?;
    info!("opsdeck starting up");

    // Headless followers handle signals themselves so they can shut down cleanly
    if !matches!(command, Commands::Supervise { .. } | Commands::Logs { .. }) {
        if let Err(e) = process_guard::init_signal_handlers() {
            warn!("Failed to initialize signal handlers: {}", e);
        }
        debug!("Signal handlers initialized");
    }

    match command {
        Commands::Config { action } => run_config_command(action),
        Commands::Logs {
            file,
            level,
            grep,
            channel,
            from_start,
        } => {
            let filter = LogFilter::new(level, grep.unwrap_or_default());
            follow_log_file(&file, filter, channel, from_start)
        }
        command => {
            let config = DeckConfig::load_or_default(cli.config.as_deref())?;
            match command {
                Commands::Tui { demo } => run_tui(config, demo, cli.dry_run),
                Commands::Actions => {
                    list_actions(&config);
                    Ok(())
                }
                Commands::Run { action, yes } => run_action(&config, &action, yes, cli.dry_run),
                Commands::Supervise { all } => supervise(&config, all),
                Commands::Config { .. } | Commands::Logs { .. } => Ok(()),
            }
        }
    }
}

/// Run the dashboard
fn run_tui(mut config: DeckConfig, demo: bool, dry_run: bool) -> Result<()> {
    config.logs.demo |= demo;
    debug!("Initializing terminal for TUI mode");

    // Build the App before touching the terminal so startup errors stay readable
    let mut app = App::new(config, dry_run)?;

    enable_raw_mode().context("Failed to enable raw mode")?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)
        .context("Failed to enter alternate screen")?;

    let result = Terminal::new(CrosstermBackend::new(stdout()))
        .map_err(DeckError::from)
        .and_then(|mut terminal| {
            let result = app.run(&mut terminal);
            let _ = terminal.show_cursor();
            result
        });

    // Cleanup terminal (always attempt cleanup, even if app failed)
    let _ = disable_raw_mode();
    let _ = crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen);

    result.context("Dashboard failed")
}

fn list_actions(config: &DeckConfig) {
    println!("{:<16} {:<24} COMMAND", "ID", "LABEL");
    for action in &config.actions {
        let marker = if action.destructive { "  (destructive)" } else { "" };
        println!(
            "{:<16} {:<24} {}{}",
            action.id,
            action.display_label(),
            action.command_line(),
            marker
        );
    }
}

/// Execute one action and stream its output; fails on a non-zero exit
fn run_action(config: &DeckConfig, id: &str, confirmed: bool, dry_run: bool) -> Result<()> {
    let _guard = ProcessGuard::new();
    let logs = LogAggregator::with_capacity(config.logs.retention, config.logs.subscriber_capacity);
    let dispatcher = Dispatcher::new(config, logs).with_dry_run(dry_run);

    let execution = if confirmed {
        dispatcher.execute_confirmed(id)
    } else {
        dispatcher.execute(id)
    };
    let execution = match execution {
        Err(DeckError::ConfirmationRequired { .. }) => {
            bail!("'{}' is destructive; re-run with --yes to confirm", id)
        }
        other => other?,
    };

    let outcome = execution.wait_with(|event| match event {
        ExecEvent::Started { pid: Some(pid), .. } => info!("{} started (pid {})", id, pid),
        ExecEvent::Output { stream: OutputStream::Stdout, line, .. } => println!("{}", line),
        ExecEvent::Output { stream: OutputStream::Stderr, line, .. } => eprintln!("{}", line),
        _ => {}
    })?;

    if outcome.dry_run {
        println!("[DRY RUN] {} not executed", id);
    }
    outcome.ensure_success(id)?;
    println!("✓ {} finished in {:.1}s", id, outcome.duration.as_secs_f64());
    Ok(())
}

/// Register SIGINT/SIGTERM/SIGHUP to set a shared flag
fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

    let flag = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM, SIGHUP] {
        signal_hook::flag::register(sig, Arc::clone(&flag))
            .with_context(|| format!("Failed to register handler for signal {}", sig))?;
    }
    Ok(flag)
}

/// Start services and print their output until a signal arrives
fn supervise(config: &DeckConfig, all: bool) -> Result<()> {
    let _guard = ProcessGuard::new();
    let shutdown = shutdown_flag()?;
    let logs = LogAggregator::with_capacity(config.logs.retention, config.logs.subscriber_capacity);
    let supervisor = Supervisor::new(config, logs.clone());
    let subscription = logs.subscribe(LogChannel::Services);

    let failures = if all {
        supervisor.start_all()?
    } else {
        supervisor.start_autostart()?
    };
    for (id, err) in &failures {
        eprintln!("✗ {}: {}", id, err);
    }
    let summary = supervisor.summary()?;
    if summary.online == 0 {
        if !all && config.services.iter().all(|s| !s.autostart) {
            bail!("No services are marked autostart; use --all to start every service");
        }
        bail!("No service could be started");
    }
    info!("Supervising {} services", summary.online);

    let reconciler = supervisor
        .spawn_reconciler(Duration::from_millis(config.supervisor.poll_interval_ms))?;

    while !shutdown.load(Ordering::Relaxed) {
        if let Some(entry) = subscription.recv_timeout(Duration::from_millis(100)) {
            println!("{}", entry.format_line());
        }
    }

    info!("Shutdown requested, stopping services");
    drop(reconciler);
    for (id, err) in supervisor.stop_all()? {
        eprintln!("✗ failed to stop {}: {}", id, err);
    }
    for entry in subscription.drain() {
        println!("{}", entry.format_line());
    }
    if subscription.dropped() > 0 {
        warn!("{} log lines were dropped while printing", subscription.dropped());
    }
    Ok(())
}

/// Tail `path` through the aggregator, printing entries that pass `filter`
fn follow_log_file(
    path: &Path,
    filter: LogFilter,
    channel: LogChannel,
    from_start: bool,
) -> Result<()> {
    let shutdown = shutdown_flag()?;
    let logs = LogAggregator::new(opsdeck::logs::DEFAULT_RETENTION);
    let subscription = logs.subscribe(channel);
    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let mut tailer = FileTailer::new(path, channel, source);
    if from_start {
        tailer = tailer.from_start();
    }
    if !path.exists() {
        warn!("{} does not exist yet, waiting for it", path.display());
    }

    loop {
        tailer.poll(&logs);
        for entry in subscription.drain() {
            if filter.matches(&entry) {
                println!("{}", entry.format_line());
            }
        }
        if sleep_unless_stopped(&shutdown, Duration::from_millis(250)) {
            break;
        }
    }
    Ok(())
}

fn run_config_command(action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Init { file, force } => {
            if file.exists() && !force {
                bail!("{:?} already exists; use --force to overwrite", file);
            }
            DeckConfig::default().save_to_file(&file)?;
            println!("✓ Wrote default configuration to {:?}", file);
        }
        ConfigCommands::Validate { file } => {
            let config = DeckConfig::load_from_file(&file)?;
            config
                .validate()
                .with_context(|| format!("{:?} is not a valid configuration", file))?;
            println!(
                "✓ Configuration file is valid: {} actions, {} services, {} log sources",
                config.actions.len(),
                config.services.len(),
                config.logs.sources.len()
            );
        }
    }
    Ok(())
}
