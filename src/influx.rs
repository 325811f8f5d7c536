//! HTTP client for the time-series daemon.

use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;

/// Client for the daemon's ping/query/write endpoints.
#[derive(Clone)]
pub struct InfluxClient {
    client: reqwest::Client,
    base_url: String,
}

impl InfluxClient {
    /// Create a new client.
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Probe the health endpoint. Ready iff it answers 204.
    pub async fn ping(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == StatusCode::NO_CONTENT => true,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "ping answered with unexpected status");
                false
            }
            Err(e) => {
                tracing::trace!(error = %e, "ping failed");
                false
            }
        }
    }

    /// Create the database if it does not exist. Idempotent on the
    /// server side.
    pub async fn create_database(&self, name: &str) -> Result<()> {
        let statement = format!("CREATE DATABASE \"{}\"", name);

        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .form(&[("q", statement.as_str())])
            .send()
            .await?;

        if response.status().is_success() {
            let result: serde_json::Value = response.json().await.unwrap_or_default();
            tracing::debug!(database = name, %result, "database created");
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(anyhow::anyhow!(
                "create database failed: {} - {}",
                status,
                text
            ))
        }
    }

    /// Write line-protocol points into `db`. The daemon answers 204 on
    /// success.
    pub async fn write(&self, db: &str, lines: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[("db", db)])
            .body(lines.to_string())
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(anyhow::anyhow!("write failed: {} - {}", status, text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockBehavior, MockInflux};

    #[tokio::test]
    async fn test_ping_ready_on_204() {
        let mock = MockInflux::start().await;
        let client = InfluxClient::new(&mock.base_url());
        assert!(client.ping().await);
    }

    #[tokio::test]
    async fn test_ping_not_ready_on_error_status() {
        let mock = MockInflux::start_with(MockBehavior {
            ping_status: 500,
            ..Default::default()
        })
        .await;
        let client = InfluxClient::new(&mock.base_url());
        assert!(!client.ping().await);
    }

    #[tokio::test]
    async fn test_ping_not_ready_when_unreachable() {
        // Grab a free port and release it before probing.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = InfluxClient::new(&format!("http://127.0.0.1:{}", port));
        assert!(!client.ping().await);
    }

    #[tokio::test]
    async fn test_create_database_sends_urlencoded_statement() {
        let mock = MockInflux::start().await;
        let client = InfluxClient::new(&mock.base_url());

        client.create_database("traindb").await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/query");
        assert!(requests[0].body.contains("CREATE+DATABASE"));
        assert!(requests[0].body.contains("%22traindb%22"));
    }

    #[tokio::test]
    async fn test_write_targets_database() {
        let mock = MockInflux::start().await;
        let client = InfluxClient::new(&mock.base_url());

        client
            .write("traindb", "cpu_ip_info,type=cpu loss=0.5")
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].target.starts_with("/write"));
        assert!(requests[0].target.contains("db=traindb"));
        assert_eq!(requests[0].body, "cpu_ip_info,type=cpu loss=0.5");
    }
}
