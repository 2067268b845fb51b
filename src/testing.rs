// src/testing.rs

//! In-process HTTP responder for tests.
//!
//! Serves canned responses over a loopback `TcpListener`. Each path maps
//! to a sequence of replies; the n-th request to a path receives the n-th
//! reply, and the last reply repeats once the sequence is exhausted.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::models::{Config, FetcherConfig};

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub delay: Duration,
    /// Answer `304` when the request carries a matching `If-None-Match`.
    pub etag: Option<String>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Vec::new(),
            delay: Duration::ZERO,
            etag: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self::status(302).with_header("Location", location)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }
}

#[derive(Default)]
struct State {
    routes: HashMap<String, Vec<Reply>>,
    hits: HashMap<String, usize>,
}

/// Loopback HTTP server; aborted on drop.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let shared = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Register a single reply for `path`.
    pub fn route(&self, path: &str, reply: Reply) {
        self.route_sequence(path, vec![reply]);
    }

    /// Register replies served in order for `path`.
    pub fn route_sequence(&self, path: &str, replies: Vec<Reply>) {
        let mut state = self.state.lock().unwrap();
        state.routes.insert(path.to_string(), replies);
        state.hits.remove(path);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let header = |wanted: &str| {
        head.lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.trim().to_string())
    };
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let if_none_match = header("if-none-match");
    let content_length: usize = header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    // Drain the request body before answering.
    while buffer.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let reply = {
        let mut state = state.lock().unwrap();
        let hit = {
            let counter = state.hits.entry(path.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        state
            .routes
            .get(&path)
            .and_then(|replies| replies.get(hit - 1).or_else(|| replies.last()))
            .cloned()
            .unwrap_or_else(|| Reply::status(404))
    };

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let not_modified = reply.etag.is_some() && reply.etag == if_none_match;
    let (status, body): (u16, &[u8]) = if not_modified {
        (304, b"")
    } else {
        (reply.status, &reply.body)
    };

    let mut head = format!("HTTP/1.1 {} {}\r\n", status, reason(status));
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n", body.len()));
    if let Some(etag) = &reply.etag {
        head.push_str(&format!("ETag: {}\r\n", etag));
    }
    for (name, value) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        302 => "Found",
        304 => "Not Modified",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Fetcher settings that allow plain HTTP to loopback with fast retries.
pub fn fetcher_config() -> FetcherConfig {
    FetcherConfig {
        timeout_secs: 5,
        connect_timeout_secs: 2,
        max_attempts: 3,
        retry_delay_ms: 10,
        backoff_multiplier: 2,
        run_timeout_secs: 30,
        allow_http: true,
        allow_private_addresses: true,
        blocked_hosts: Vec::new(),
        ..FetcherConfig::default()
    }
}

/// Full configuration around [`fetcher_config`], with no static sources.
pub fn config() -> Config {
    Config {
        fetcher: fetcher_config(),
        sources: Vec::new(),
        ..Config::default()
    }
}

/// An adblock list with a header block and `rules` distinct rules.
pub fn adblock_list(title: &str, rules: usize) -> String {
    let mut text = format!("[Adblock Plus 2.0]\n! Title: {title}\n! Expires: 4 days\n");
    for i in 0..rules {
        text.push_str(&format!("||{}-{}.example.com^\n", title.to_lowercase(), i));
    }
    text
}
