//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use teeproxy::config::TeeConfig;
use teeproxy::net::Listener;
use teeproxy::{Shutdown, TeeHandler, TeeServer};

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// What a mock backend answers with.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            status: "200 OK",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn with_session(mut self, cookie_name: &str, token: &str) -> Self {
        self.headers
            .push(("Set-Cookie", format!("{}={}; Path=/", cookie_name, token)));
        self
    }
}

pub type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

/// Start a backend on an ephemeral port whose answer is computed by `f`.
///
/// Every request it receives is appended to the returned log.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Recorded)
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let log = recorded.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                log.lock().unwrap().push(request.clone());

                let response = f(request).await;
                let mut raw = format!("HTTP/1.1 {}\r\n", response.status);
                for (name, value) in &response.headers {
                    raw.push_str(&format!("{}: {}\r\n", name, value));
                }
                raw.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.body.len(),
                    response.body
                ));
                let _ = socket.write_all(raw.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, recorded)
}

/// Start a backend that always gives the same answer.
pub async fn start_mock_backend(response: MockResponse) -> (SocketAddr, Recorded) {
    start_programmable_backend(move |_| {
        let response = response.clone();
        async move { response }
    })
    .await
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut request = RecordedRequest {
        head,
        body: buf[head_end..].to_vec(),
    };
    let length: usize = request
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while request.body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        request.body.extend_from_slice(&chunk[..n]);
    }
    Some(request)
}

/// A running proxy bound to an ephemeral port.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub handler: TeeHandler,
    pub shutdown: Shutdown,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for detached shadow dispatches to finish.
    pub async fn wait_for_shadow(&self) {
        for _ in 0..200 {
            if self.handler.shadow_in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("shadow dispatches still in flight");
    }
}

pub fn tee_config(primary: SocketAddr, shadow: SocketAddr) -> TeeConfig {
    let mut config = TeeConfig::default();
    config.primary.address = primary.to_string();
    config.shadow.address = shadow.to_string();
    config.observability.debug = true;
    config
}

pub async fn start_proxy(config: TeeConfig) -> RunningProxy {
    let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = inner.local_addr().unwrap();
    let listener = Listener::from_listener(inner, config.listener.max_connections);

    let shutdown = Shutdown::new();
    let server = TeeServer::new(config);
    let handler = server.handler();
    tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningProxy {
        addr,
        handler,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
