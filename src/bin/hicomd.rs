//! hicom daemon - Peer health listener
//!
//! Accepts TCP connections from peers, echoes their payloads and records
//! whether each payload carries the health signature.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! hicomd start
//!
//! # Start in the background with a config file
//! hicomd start -d --config /etc/hicom/hicomd.toml
//!
//! # Stop the daemon started with that config (same PID file)
//! hicomd stop --config /etc/hicom/hicomd.toml
//!
//! # Check daemon status
//! hicomd status
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hicomd::config::ServiceConfig;
use hicomd::pidfile::{is_process_running, PidFile};
use hicomd::service::HealthService;

/// How long `stop` waits for the daemon to exit
const STOP_WAIT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// hicom daemon - peer health monitor
#[derive(Parser, Debug)]
#[command(name = "hicomd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Options shared by every command: where the configuration lives.
#[derive(ClapArgs, Debug, Default)]
struct ConfigArgs {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Listening port, overrides config and environment
        #[arg(short, long)]
        port: Option<u16>,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Stop the running daemon
    Stop {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Show daemon status
    Status {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Builds the effective configuration: file, then environment, then flags.
fn load_config(args: &ConfigArgs, port: Option<u16>) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    config
        .apply_env()
        .context("Invalid environment override")?;

    if let Some(port) = port {
        config.port = port;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn send_sigterm(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let Ok(raw_pid) = i32::try_from(pid) else {
            bail!("Invalid PID {pid}");
        };
        // SAFETY: kill(2) takes plain integers and has no memory effects
        let result = unsafe { libc::kill(raw_pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn start(daemon: bool, port: Option<u16>, args: &ConfigArgs) -> Result<()> {
    // Fail before forking so config errors reach the terminal
    let config = load_config(args, port)?;
    let pid_file = config.pid_file();

    if let Some(pid) = pid_file.running_pid() {
        eprintln!("Daemon is already running (PID {pid})");
        eprintln!("Use 'hicomd stop' to stop it first.");
        process::exit(1);
    }

    if daemon {
        daemonize(&pid_file)?;
    }

    pid_file.write_current()?;
    let result = run_daemon(config);
    pid_file.remove();

    result
}

fn stop(pid_file: &PidFile) -> Result<()> {
    let Some(pid) = pid_file.running_pid() else {
        println!("Daemon is not running.");
        return Ok(());
    };

    println!("Stopping daemon (PID {pid})...");
    send_sigterm(pid)?;

    let deadline = std::time::Instant::now() + STOP_WAIT;
    while std::time::Instant::now() < deadline {
        if !is_process_running(pid) {
            println!("Daemon stopped.");
            return Ok(());
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }

    eprintln!("Daemon did not stop within {} seconds.", STOP_WAIT.as_secs());
    process::exit(1);
}

fn status(pid_file: &PidFile) {
    match pid_file.running_pid() {
        Some(pid) => {
            println!("Daemon is running (PID {pid})");
            println!("PID file: {}", pid_file.path().display());
        }
        None => {
            println!("Daemon is not running.");
            process::exit(1);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        port: None,
        config: ConfigArgs::default(),
    });

    match command {
        Command::Start {
            daemon,
            port,
            config,
        } => start(daemon, port, &config),
        Command::Stop { config } => stop(&load_config(&config, None)?.pid_file()),
        Command::Status { config } => {
            status(&load_config(&config, None)?.pid_file());
            Ok(())
        }
    }
}

/// Forks to the background with stdout and stderr sent to the log file.
fn daemonize(pid_file: &PidFile) -> Result<()> {
    use daemonize::Daemonize;

    let log_path = pid_file.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
    let stderr = stdout
        .try_clone()
        .context("Failed to duplicate log file handle")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: ServiceConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hicomd=info".parse()?)
                .add_directive("hicom_core=info".parse()?)
                .add_directive("hicom_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "hicom daemon starting"
    );

    let service = HealthService::init(config)
        .await
        .context("Failed to start health service")?;

    let keys: Vec<&str> = service.items().keys().iter().map(|item| item.key).collect();
    info!(addr = %service.local_addr(), items = ?keys, "Serving peers");

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }
    info!("Shutdown signal received");

    service.uninit().await;

    info!("hicom daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
