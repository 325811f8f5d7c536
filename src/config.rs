//! Monitoring stack configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Monitoring stack configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Skip the entire bootstrap when set (development hosts).
    pub dev_mode: bool,

    /// Time-series daemon host.
    pub host: String,

    /// Time-series daemon HTTP port.
    pub port: u16,

    /// Database created for training metrics.
    pub database: String,

    /// Daemon binary name, looked up on PATH and in the process table.
    pub daemon_name: String,

    /// Dashboard service unit started through the service manager.
    pub dashboard_service: String,

    /// Service manager binary. The dashboard step is skipped if absent.
    pub service_manager: String,

    /// Readiness poll attempt budget.
    pub ready_attempts: u32,

    /// Delay between readiness poll attempts.
    pub poll_interval: Duration,

    /// Directory holding the daemon PID file.
    pub pid_dir: PathBuf,
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let dev_mode = std::env::var("MONITOR_DEV")
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        let host = std::env::var("MONITOR_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port: u16 = std::env::var("MONITOR_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8086);

        let database = std::env::var("MONITOR_DB").unwrap_or_else(|_| "monitordb".to_string());

        Ok(Self {
            dev_mode,
            host,
            port,
            database,
            ..Self::default()
        })
    }

    /// Host used for local connection probes. `0.0.0.0` binds everything
    /// but is not connectable, so probe loopback instead.
    pub fn connect_host(&self) -> &str {
        if self.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            &self.host
        }
    }

    /// Base URL of the daemon's HTTP API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.connect_host(), self.port)
    }

    /// Path of the daemon PID file.
    pub fn pid_file(&self) -> PathBuf {
        self.pid_dir.join(format!("{}.pid", self.daemon_name))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let pid_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trainmon");

        Self {
            dev_mode: false,
            host: "127.0.0.1".to_string(),
            port: 8086,
            database: "monitordb".to_string(),
            daemon_name: "influxd".to_string(),
            dashboard_service: "grafana-server".to_string(),
            service_manager: "systemctl".to_string(),
            ready_attempts: 30,
            poll_interval: Duration::from_secs(1),
            pid_dir,
        }
    }
}
