//! Line-protocol metrics writer for training processes.
//!
//! Callers enqueue [`Point`]s without blocking; a background task
//! drains the queue and ships them to the daemon's write endpoint.
//! Every point carries host identity tags so dashboards can group by
//! machine and by GPU/CPU role.

use std::collections::BTreeMap;
use std::process::Command;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::influx::InfluxClient;

/// A single field value in a point.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// A measurement point, rendered as one line of line protocol.
#[derive(Debug, Clone)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<DateTime<Utc>>,
}

impl Point {
    /// Create a point for `measurement`.
    pub fn new(measurement: &str) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Set an explicit timestamp. Without one the daemon assigns its
    /// own receive time.
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render as a line-protocol line.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_identifier(&self.measurement);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        let mut first = true;
        for (key, value) in &self.fields {
            if !first {
                line.push(',');
            }
            first = false;
            line.push_str(&escape_key(key));
            line.push('=');
            match value {
                FieldValue::Float(v) => line.push_str(&v.to_string()),
                FieldValue::Integer(v) => {
                    line.push_str(&v.to_string());
                    line.push('i');
                }
                FieldValue::Boolean(v) => line.push_str(if *v { "true" } else { "false" }),
                FieldValue::Text(v) => {
                    line.push('"');
                    line.push_str(&v.replace('\\', "\\\\").replace('"', "\\\""));
                    line.push('"');
                }
            }
        }

        if let Some(ts) = self.timestamp {
            if let Some(nanos) = ts.timestamp_nanos_opt() {
                line.push(' ');
                line.push_str(&nanos.to_string());
            }
        }

        line
    }
}

// Measurement names escape commas and spaces.
fn escape_identifier(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys/values and field keys additionally escape '='.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

/// Identity of the host emitting metrics.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub hostname: String,
    pub is_gpu: bool,
}

impl HostIdentity {
    /// Detect the host identity once at startup. GPU presence is probed
    /// with `nvidia-smi -L`.
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let is_gpu = Command::new("nvidia-smi")
            .arg("-L")
            .output()
            .map(|out| out.status.success() && !out.stdout.is_empty())
            .unwrap_or(false);

        Self { hostname, is_gpu }
    }

    /// Measurement name for host-level stats.
    pub fn measurement(&self) -> &'static str {
        if self.is_gpu {
            "gpu_ip_info"
        } else {
            "cpu_ip_info"
        }
    }

    /// A point for this host's measurement, tagged with its identity.
    pub fn point(&self) -> Point {
        self.tagged(self.measurement())
    }

    /// A point in the `actor_metrics` measurement, with the actor's
    /// role and id promoted to tags for cheaper queries.
    pub fn actor_point(&self, role: &str, actor_id: &str) -> Point {
        self.tagged("actor_metrics")
            .tag("role", role)
            .tag("actor_id", actor_id)
    }

    fn tagged(&self, measurement: &str) -> Point {
        Point::new(measurement)
            .tag("ip_port", &self.hostname)
            .tag("type", if self.is_gpu { "gpu" } else { "cpu" })
    }
}

/// Background metrics writer with a bounded queue.
///
/// A full queue and points that fail delivery twice are dropped;
/// metrics must never stall training.
pub struct MetricsHandler {
    tx: mpsc::Sender<Point>,
    task: JoinHandle<()>,
}

impl MetricsHandler {
    /// Spawn the delivery task. `queue_size` bounds the in-flight
    /// backlog.
    pub fn spawn(base_url: &str, database: &str, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        let task = tokio::spawn(deliver(rx, base_url.to_string(), database.to_string()));
        Self { tx, task }
    }

    /// Enqueue a point without blocking.
    pub fn emit(&self, point: Point) {
        if point.is_empty() {
            return;
        }
        if self.tx.try_send(point).is_err() {
            tracing::debug!("metrics queue full, dropping point");
        }
    }

    /// Drain the queue and stop the delivery task.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

async fn deliver(mut rx: mpsc::Receiver<Point>, base_url: String, database: String) {
    let mut client = InfluxClient::new(&base_url);

    while let Some(point) = rx.recv().await {
        let line = point.to_line_protocol();

        // Two attempts, rebuilding the client in between, then drop.
        for attempt in 0..2 {
            match client.write(&database, &line).await {
                Ok(()) => break,
                Err(e) if attempt == 0 => {
                    tracing::warn!(error = %e, "metrics write failed, retrying once");
                    client = InfluxClient::new(&base_url);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "metrics write failed again, dropping point");
                }
            }
        }
    }
}
