//! Monitoring stack bootstrap sequence.
//!
//! The sequence mirrors what operators previously ran by hand on
//! training hosts: make sure the time-series daemon owns its port,
//! wait for its HTTP API, provision the metrics database, then
//! best-effort start the dashboard service.

use std::process::Command;

use anyhow::Result;

use crate::config::MonitorConfig;
use crate::error::BootstrapError;
use crate::influx::InfluxClient;
use crate::process;

/// How the daemon came to be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// The daemon already held the port; nothing was launched.
    Reused,
    /// Launched by this bootstrap run.
    Spawned { pid: u32 },
}

/// Result of a bootstrap run.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// Development mode set; nothing was touched.
    Skipped,
    /// The full sequence ran.
    Completed {
        daemon: DaemonState,
        /// Whether the readiness poll observed a 204 (always true for a
        /// reused daemon).
        ready: bool,
        database_created: bool,
        dashboard_started: bool,
    },
}

/// Run the bootstrap sequence.
///
/// Fatal only when the port is held by a foreign process or the daemon
/// binary is missing; every later step is best-effort and logged.
pub async fn run(config: &MonitorConfig) -> Result<BootstrapOutcome> {
    if config.dev_mode {
        tracing::info!("MONITOR_DEV is set, skipping monitoring stack bootstrap");
        return Ok(BootstrapOutcome::Skipped);
    }

    let daemon = ensure_daemon(config)?;

    let client = InfluxClient::new(&config.base_url());

    let ready = match daemon {
        DaemonState::Reused => true,
        DaemonState::Spawned { .. } => {
            wait_ready(&client, config.ready_attempts, config.poll_interval).await
        }
    };

    // Deliberately best-effort: the daemon may still come up later and
    // the statement is idempotent, so issue it regardless.
    if !ready {
        tracing::warn!(
            attempts = config.ready_attempts,
            "daemon not ready after poll budget, proceeding anyway"
        );
    }

    let database_created = match client.create_database(&config.database).await {
        Ok(()) => {
            tracing::info!(database = %config.database, "metrics database ready");
            true
        }
        Err(e) => {
            tracing::warn!(database = %config.database, error = %e, "could not create metrics database");
            false
        }
    };

    let dashboard_started = start_dashboard(config);

    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        daemon = ?daemon,
        ready,
        dashboard_started,
        "monitoring stack bootstrap complete"
    );

    Ok(BootstrapOutcome::Completed {
        daemon,
        ready,
        database_created,
        dashboard_started,
    })
}

/// Make sure the daemon holds the monitoring port, launching it if the
/// port is free.
fn ensure_daemon(config: &MonitorConfig) -> Result<DaemonState> {
    if process::port_in_use(config.connect_host(), config.port) {
        if process::process_running(&config.daemon_name) {
            tracing::info!(
                port = config.port,
                daemon = %config.daemon_name,
                "daemon already running, reusing it"
            );
            return Ok(DaemonState::Reused);
        }
        return Err(BootstrapError::PortConflict {
            port: config.port,
            daemon: config.daemon_name.clone(),
        }
        .into());
    }

    let binary = process::find_in_path(&config.daemon_name)
        .ok_or_else(|| BootstrapError::DaemonNotFound(config.daemon_name.clone()))?;

    let pid = process::spawn_daemon(&binary, &config.pid_file())?;
    tracing::info!(
        daemon = %binary.display(),
        pid,
        pid_file = %config.pid_file().display(),
        "daemon started"
    );

    Ok(DaemonState::Spawned { pid })
}

/// Flat readiness poll: one ping per interval, up to `attempts` tries.
pub(crate) async fn wait_ready(
    client: &InfluxClient,
    attempts: u32,
    interval: std::time::Duration,
) -> bool {
    for attempt in 1..=attempts {
        if client.ping().await {
            tracing::debug!(attempt, "daemon is ready");
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Best-effort dashboard start. Skipped when no service manager is
/// installed; failures are logged and ignored.
fn start_dashboard(config: &MonitorConfig) -> bool {
    let Some(manager) = process::find_in_path(&config.service_manager) else {
        tracing::debug!(
            manager = %config.service_manager,
            "service manager not found, skipping dashboard start"
        );
        return false;
    };

    match Command::new(&manager)
        .args(["start", &config.dashboard_service])
        .status()
    {
        Ok(status) if status.success() => {
            tracing::info!(service = %config.dashboard_service, "dashboard service started");
            true
        }
        Ok(status) => {
            tracing::warn!(
                service = %config.dashboard_service,
                code = status.code(),
                "dashboard service start failed, continuing"
            );
            false
        }
        Err(e) => {
            tracing::warn!(
                service = %config.dashboard_service,
                error = %e,
                "could not invoke service manager, continuing"
            );
            false
        }
    }
}
