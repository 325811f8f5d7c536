//! Minimal in-process HTTP server standing in for the time-series
//! daemon in tests. Records every request and answers ping/query/write
//! the way the real daemon does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Request target as sent, including any query string.
    pub target: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Status returned for GET /ping. The daemon answers 204 when ready.
    pub ping_status: u16,
    /// Statuses for successive POST /write requests, in order. Writes
    /// beyond the end of the list answer 204.
    pub write_statuses: Vec<u16>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            ping_status: 204,
            write_statuses: Vec::new(),
        }
    }
}

pub struct MockInflux {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    accept_task: JoinHandle<()>,
}

impl MockInflux {
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::default()).await
    }

    pub async fn start_with(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let write_count = Arc::new(AtomicUsize::new(0));

        let log = requests.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(handle_conn(
                    stream,
                    behavior.clone(),
                    log.clone(),
                    write_count.clone(),
                ));
            }
        });

        Self {
            port,
            requests,
            accept_task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockInflux {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_conn(
    mut stream: TcpStream,
    behavior: MockBehavior,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
    write_count: Arc<AtomicUsize>,
) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    // One connection may carry several keep-alive requests.
    loop {
        let header_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();

        let content_length: usize = head
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                if key.eq_ignore_ascii_case("content-length") {
                    value.trim().parse().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }

        let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();
        buf.drain(..header_end + content_length);

        log.lock().unwrap().push(RecordedRequest {
            method: method.clone(),
            target: target.clone(),
            body,
        });

        let path = target.split('?').next().unwrap_or_default();
        let (status, response_body) = match (method.as_str(), path) {
            ("GET", "/ping") => (behavior.ping_status, String::new()),
            ("POST", "/query") => (200, r#"{"results":[{"statement_id":0}]}"#.to_string()),
            ("POST", "/write") => {
                let n = write_count.fetch_add(1, Ordering::SeqCst);
                let status = behavior.write_statuses.get(n).copied().unwrap_or(204);
                (status, String::new())
            }
            _ => (404, String::new()),
        };

        let response = format!(
            "HTTP/1.1 {} MOCK\r\ncontent-length: {}\r\nconnection: keep-alive\r\n\r\n{}",
            status,
            response_body.len(),
            response_body
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
