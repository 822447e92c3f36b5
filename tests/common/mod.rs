//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use trivia_gateway::config::GatewayConfig;
use trivia_gateway::lifecycle::Shutdown;
use trivia_gateway::services::{ClientError, GameRecord, GameSessions, NewUser, UserDirectory, UserRecord};
use trivia_gateway::{AppState, GatewayServer};

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the request method and path and returns status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some((method, path)) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(method, path).await;
                        let status_text = match status {
                            200 => "200 OK",
                            201 => "201 Created",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read one request (head and body); return its method and path.
async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<(String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    Some((method, path))
}

/// In-process user and game services with failure switches and a journal.
#[derive(Default)]
pub struct FakeServices {
    pub fail_register: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_delete_user: AtomicBool,
    pub start_delay_ms: AtomicU64,
    next_id: AtomicU32,
    journal: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.journal().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn log(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }

    fn refused(service: &'static str) -> ClientError {
        ClientError::Status {
            service,
            status: 500,
            body: "injected failure".into(),
        }
    }
}

#[async_trait]
impl UserDirectory for FakeServices {
    async fn register_user(&self, user: &NewUser) -> Result<UserRecord, ClientError> {
        self.log(format!("register {}", user.name));
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(Self::refused("user_management"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UserRecord {
            id: format!("u-{n}"),
            name: user.name.clone(),
            email: user.email.clone(),
            age: user.age,
        })
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), ClientError> {
        self.log(format!("delete user {user_id}"));
        if self.fail_delete_user.load(Ordering::SeqCst) {
            return Err(Self::refused("user_management"));
        }
        Ok(())
    }
}

#[async_trait]
impl GameSessions for FakeServices {
    async fn start_game(&self) -> Result<GameRecord, ClientError> {
        self.log("start game".into());
        let delay = self.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Self::refused("game_engine"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GameRecord {
            id: format!("g-{n}"),
            status: "in_progress".into(),
            players_scores: Default::default(),
        })
    }

    async fn delete_game(&self, game_id: &str) -> Result<(), ClientError> {
        self.log(format!("delete game {game_id}"));
        Ok(())
    }
}

/// A gateway served on an ephemeral port, backed by `FakeServices`.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub state: AppState,
    pub fake: Arc<FakeServices>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn shutdown(&self) {
        self.state.shutdown.trigger();
    }
}

pub async fn spawn_gateway(config: GatewayConfig, fake: Arc<FakeServices>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = AppState::new(config, fake.clone(), fake.clone(), Shutdown::new());
    let server = GatewayServer::new(state.clone());
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    TestGateway { addr, state, fake }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn new_user_body(name: &str) -> serde_json::Value {
    serde_json::json!({
        "user": { "name": name, "email": format!("{name}@example.com"), "age": 30 }
    })
}
