//! Monitoring stack control for ML training hosts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use trainmonctl::bootstrap;
use trainmonctl::config::MonitorConfig;
use trainmonctl::influx::InfluxClient;
use trainmonctl::process;

#[derive(Parser)]
#[command(name = "trainmonctl")]
#[command(version, about = "Training host monitoring stack control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Time-series daemon host (overrides MONITOR_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Time-series daemon port (overrides MONITOR_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Metrics database name (overrides MONITOR_DB)
    #[arg(long)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring up the monitoring stack
    /// Examples:
    ///     trainmonctl up
    ///     trainmonctl --port=8087 --database=traindb up
    ///     MONITOR_DEV=1 trainmonctl up   (skips everything on dev hosts)
    #[command(verbatim_doc_comment)]
    Up,
    /// Stop the time-series daemon started by 'up'
    /// Examples:
    ///     trainmonctl down
    ///     trainmonctl down --force
    #[command(verbatim_doc_comment)]
    Down {
        /// Skip confirmation and force kill if needed
        #[arg(short, long)]
        force: bool,
    },
    /// Report daemon and endpoint health
    /// Examples:
    ///     trainmonctl status
    ///     trainmonctl status --json
    #[command(verbatim_doc_comment)]
    Status {
        /// Emit only the JSON report
        #[arg(short, long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct StatusReport {
    host: String,
    port: u16,
    port_bound: bool,
    daemon_running: bool,
    ready: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trainmonctl=debug".into()),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = MonitorConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = cli.database {
        config.database = database;
    }

    match cli.command {
        Commands::Up => {
            bootstrap::run(&config).await?;
        }
        Commands::Down { force } => {
            stop_daemon(&config, force).await?;
        }
        Commands::Status { json } => {
            status(&config, json).await?;
        }
    }

    Ok(())
}

async fn stop_daemon(config: &MonitorConfig, force: bool) -> Result<()> {
    let pid_file = config.pid_file();

    if !pid_file.exists() {
        println!(
            "No running {} found (no PID file at {}).",
            config.daemon_name,
            pid_file.display()
        );
        return Ok(());
    }

    let pid = process::read_pid_file(&pid_file)?;

    if !process::process_exists(pid) {
        println!(
            "Process {} not found. The daemon may have been stopped already.",
            pid
        );
        std::fs::remove_file(&pid_file)?;
        return Ok(());
    }

    if !force {
        print!("Stop {} with PID {}? [y/N]: ", config.daemon_name, pid);
        std::io::Write::flush(&mut std::io::stdout())?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    println!("Stopping {} with PID {}...", config.daemon_name, pid);
    process::send_signal(pid, nix::sys::signal::Signal::SIGTERM)?;

    if process::wait_for_exit(pid, std::time::Duration::from_secs(10)).await {
        std::fs::remove_file(&pid_file)?;
        println!("{} stopped successfully.", config.daemon_name);
        return Ok(());
    }

    if !force {
        print!("Daemon didn't stop gracefully. Force kill? [y/N]: ");
        std::io::Write::flush(&mut std::io::stdout())?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            // The daemon survived SIGTERM and the operator declined the
            // kill; it is still running, so the PID file stays.
            println!(
                "{} is still running with PID {}. PID file kept at {}.",
                config.daemon_name,
                pid,
                pid_file.display()
            );
            return Ok(());
        }
    }

    println!("Force killing {} with PID {}...", config.daemon_name, pid);
    process::send_signal(pid, nix::sys::signal::Signal::SIGKILL)?;

    std::fs::remove_file(&pid_file).context("failed to remove PID file")?;
    println!("{} stopped.", config.daemon_name);

    Ok(())
}

async fn status(config: &MonitorConfig, json_only: bool) -> Result<()> {
    let port_bound = process::port_in_use(config.connect_host(), config.port);
    let daemon_running = process::process_running(&config.daemon_name);
    let ready = InfluxClient::new(&config.base_url()).ping().await;

    let report = StatusReport {
        host: config.host.clone(),
        port: config.port,
        port_bound,
        daemon_running,
        ready,
    };

    if json_only {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{:<16} {}", "host", report.host);
        println!(
            "{:<16} {} ({})",
            "port",
            report.port,
            if report.port_bound { "bound" } else { "free" }
        );
        println!(
            "{:<16} {}",
            "daemon",
            if report.daemon_running {
                "running"
            } else {
                "not running"
            }
        );
        println!(
            "{:<16} {}",
            "ping",
            if report.ready { "204 (ready)" } else { "unreachable" }
        );
    }

    Ok(())
}
