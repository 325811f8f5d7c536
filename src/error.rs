//! Bootstrap error types.

use thiserror::Error;

/// Fatal bootstrap conditions. Everything else in the sequence is
/// best-effort and only logged.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The monitoring port is bound by a process other than the daemon.
    #[error("port {port} is in use but {daemon} is not running; refusing to start")]
    PortConflict { port: u16, daemon: String },

    /// The daemon binary is not installed on this host.
    #[error("daemon binary not found on PATH: {0}")]
    DaemonNotFound(String),
}
