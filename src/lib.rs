//! Monitoring stack bootstrap for ML training hosts.
//!
//! Brings up the local time-series daemon (InfluxDB), provisions the
//! metrics database over its HTTP API, and best-effort starts the
//! dashboard service. Training processes can ship metrics through the
//! [`metrics`] writer.
//!
//! This crate provides:
//! - Bootstrap sequence: port/ownership check, daemon launch, readiness
//!   poll, database provisioning, dashboard start
//! - HTTP client for the daemon's ping/query/write endpoints
//! - Background line-protocol metrics writer with host identity tags

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod influx;
pub mod metrics;
pub mod process;

#[cfg(test)]
pub(crate) mod test_support;

pub use bootstrap::{BootstrapOutcome, DaemonState};
pub use config::MonitorConfig;
pub use error::BootstrapError;
pub use influx::InfluxClient;
