/// Daemon lifecycle management commands
use anyhow::Result;
use std::{
    env, fs, io,
    path::Path,
    process::Command,
    time::{Duration, Instant},
};
use sysinfo::{Pid, ProcessStatus, Signal, System};
use winddown_core::{
    config::{get_data_dir, DaemonConfig, LOG_FILE, PID_FILE, SOCKET_FILE},
    hosts::blocked_entries,
    ipc::{IpcClient, IpcRequest, IpcResponse},
    Daemon, StatusReport,
};

use super::helpers::{format_transition, print_block_set};

pub fn start_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join(PID_FILE);
    let sock_path = data_dir.join(SOCKET_FILE);

    // 1. Check if daemon is already running
    if pid_file_path.exists() {
        if let Ok(pid_str) = fs::read_to_string(&pid_file_path) {
            if let Ok(pid) = pid_str.trim().parse::<usize>() {
                let mut sys = System::new();
                if sys.refresh_process(Pid::from(pid)) {
                    log::info!("Daemon is already running (PID: {pid}).");
                    return Ok(());
                }
            }
        }
        log::warn!("Removing stale PID file.");
        let _ = fs::remove_file(&pid_file_path);
    }

    // 2. Clean up old socket if it exists
    if sock_path.exists() {
        log::warn!("Removing stale socket file.");
        fs::remove_file(&sock_path)?;
    }

    log::info!("Starting WindDown daemon...");

    // 3. Spawn a new process for the daemon
    let current_exe = env::current_exe()?;
    let current_dir = env::current_dir()?;
    let child = Command::new(current_exe)
        .arg("daemon-internal-start")
        .current_dir(current_dir)
        .spawn()?;

    // 4. In parent process, write PID and exit
    log::info!("Daemon process started with PID: {}", child.id());
    fs::write(&pid_file_path, child.id().to_string())?;

    Ok(())
}

/// Run the daemon attached to the terminal, logging to stderr
pub async fn run_foreground(data_dir: &Path) -> Result<()> {
    let config = DaemonConfig::load(data_dir)?;
    log::info!("Running in the foreground, press Ctrl-C to stop");
    Daemon::new(&config, data_dir)?.run_with_signals().await
}

pub async fn run_daemon_process() -> Result<()> {
    // Detached process: nothing is attached to stderr
    setup_daemon_logging()?;
    log::info!("Daemon process started internally.");

    if let Err(e) = daemon_main_logic().await {
        log::error!("Daemon main logic exited with a fatal error: {e:#}");
        return Err(e);
    }

    Ok(())
}

async fn daemon_main_logic() -> Result<()> {
    let data_dir = get_data_dir()?;
    let config = DaemonConfig::load(&data_dir)?;
    Daemon::new(&config, &data_dir)?.run_with_signals().await
}

/// How long `stop` waits for a requested shutdown. Removing the hosts block
/// may wait on a password prompt.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(180);
/// How long to wait after escalating to SIGTERM
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(60);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn stop_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join(PID_FILE);
    let sock_path = data_dir.join(SOCKET_FILE);

    if !pid_file_path.exists() {
        log::info!("Daemon is not running (no PID file).");
        if sock_path.exists() {
            fs::remove_file(&sock_path)?;
        }
        return Ok(());
    }

    let pid_str = fs::read_to_string(&pid_file_path)?;
    let pid = pid_str
        .trim()
        .parse::<usize>()
        .map(Pid::from)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    log::info!("Stopping WindDown daemon (PID: {pid})...");
    let client = IpcClient::new(&sock_path);

    let stopped = match client.send_command(IpcRequest::Shutdown).await {
        Ok(IpcResponse::Shutdown) => {
            log::info!("Daemon shutdown signal sent. Waiting for process to exit...");
            if wait_for_exit(pid, SHUTDOWN_TIMEOUT).await {
                true
            } else {
                log::warn!("Daemon did not stop in {SHUTDOWN_TIMEOUT:?}. Sending SIGTERM...");
                terminate_process(pid, TERMINATE_TIMEOUT).await
            }
        }
        Ok(resp) => {
            log::error!("Received unexpected response from daemon: {resp:?}. Sending SIGTERM...");
            terminate_process(pid, TERMINATE_TIMEOUT).await
        }
        Err(e) => {
            log::error!("Failed to send shutdown command: {e}. Sending SIGTERM...");
            terminate_process(pid, TERMINATE_TIMEOUT).await
        }
    };

    if !stopped {
        anyhow::bail!("Daemon (PID: {pid}) is still running; it may be waiting on a password prompt");
    }
    log::info!("Daemon stopped successfully.");

    // Cleanup
    fs::remove_file(&pid_file_path)?;
    if sock_path.exists() {
        fs::remove_file(&sock_path)?;
    }

    Ok(())
}

fn is_running(system: &mut System, pid: Pid) -> bool {
    system.refresh_process(pid)
        && system
            .process(pid)
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

/// Poll until `pid` has exited; returns `false` on timeout
async fn wait_for_exit(pid: Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut system = System::new();
    while is_running(&mut system, pid) {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
    true
}

/// Ask `pid` to exit with SIGTERM, which the daemon handles like a shutdown
/// request, and wait for it
async fn terminate_process(pid: Pid, timeout: Duration) -> bool {
    let mut system = System::new();
    if !is_running(&mut system, pid) {
        return true;
    }
    match system.process(pid).and_then(|process| process.kill_with(Signal::Term)) {
        Some(true) => {}
        Some(false) => log::warn!("Failed to deliver SIGTERM to PID {pid}"),
        None => log::warn!("SIGTERM is not supported on this platform"),
    }
    wait_for_exit(pid, timeout).await
}

pub async fn show_status(data_dir: &Path, verbose: bool, json: bool) -> Result<()> {
    let sock_path = data_dir.join(SOCKET_FILE);

    if !sock_path.exists() {
        println!("Daemon Status: Not running");
        return Ok(());
    }

    let client = IpcClient::new(&sock_path);
    match client.send_command(IpcRequest::Status).await {
        Ok(IpcResponse::Status(report)) if json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(IpcResponse::Status(report)) => {
            print_report(&report);
            if verbose {
                print_details(&client, data_dir).await?;
            }
        }
        Ok(_) => anyhow::bail!("Unexpected response from daemon"),
        Err(e) => {
            log::error!("Failed to get status: {e}");
            println!("Daemon Status: Not running (or not responding)");
        }
    }
    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("Daemon Status: Running");
    println!(
        "\nState: {}{}",
        report.lock.state,
        if report.lock.manual { " (manual)" } else { "" }
    );
    println!("Schedule: {}", report.schedule);
    println!(
        "Next transition: {}",
        report
            .next_transition
            .as_ref()
            .map_or_else(|| "None".to_string(), format_transition)
    );

    println!("\nEnforcers:");
    println!(
        "  Apps: {} ({} blocked)",
        if report.apps_active { "active" } else { "inactive" },
        report.blocked_apps
    );
    println!(
        "  Domains: {} ({} blocked)",
        if report.domains.active { "active" } else { "inactive" },
        report.domains.domains.len()
    );
    if let Some(error) = &report.domains.last_error {
        println!("  Last domain error: {error}");
    }
}

async fn print_details(client: &IpcClient, data_dir: &Path) -> Result<()> {
    if let IpcResponse::Settings(settings) = client.send_command(IpcRequest::GetSettings).await? {
        println!("\nWarning threshold: {} minutes", settings.warning_minutes);
        print_block_set(&settings.block_set);
    }

    let config = DaemonConfig::load(data_dir)?;
    match blocked_entries(&config.hosts_path) {
        Ok(entries) if entries.is_empty() => {
            println!("\nNo block section in {}", config.hosts_path.display());
        }
        Ok(entries) => {
            println!("\nBlock section in {}:", config.hosts_path.display());
            for entry in entries {
                println!("  {entry}");
            }
        }
        Err(e) => println!("\nCould not read {}: {e}", config.hosts_path.display()),
    }
    Ok(())
}

/// Manual lock or unlock through the running daemon
pub async fn set_lock(data_dir: &Path, lock: bool) -> Result<()> {
    let sock_path = data_dir.join(SOCKET_FILE);
    if !sock_path.exists() {
        anyhow::bail!("Daemon is not running. Start it with `winddown start`.");
    }

    let request = if lock {
        IpcRequest::Lock
    } else {
        IpcRequest::Unlock
    };
    match IpcClient::new(&sock_path).send_command(request).await? {
        IpcResponse::Status(report) => {
            println!("State: {}", report.lock.state);
            Ok(())
        }
        IpcResponse::Error(message) => anyhow::bail!(message),
        other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
    }
}

fn setup_daemon_logging() -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    let log_path = get_data_dir()?.join(LOG_FILE);

    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Debug)
        .init();

    Ok(())
}
