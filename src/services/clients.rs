//! Downstream service clients.
//!
//! # Responsibilities
//! - Describe the user-management and game-engine capabilities the gateway
//!   needs as traits, so workflows can be driven by fakes in tests
//! - Implement them over HTTP against each service directly, never back
//!   through the gateway itself
//!
//! # Design Decisions
//! - Non-2xx responses become `ClientError::Status` with the body kept
//! - 5xx answers, refused connections and transport timeouts are transient
//! - Transport timeout is a backstop; call deadlines come from `OperationGuard`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServicesConfig;
use crate::resilience::Transient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} answered {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
}

impl Transient for ClientError {
    fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_connect() || e.is_timeout(),
            ClientError::Status { status, .. } => *status >= 500,
        }
    }
}

/// Registration payload accepted by the user service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub players_scores: HashMap<String, i64>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn register_user(&self, user: &NewUser) -> Result<UserRecord, ClientError>;
    async fn delete_user(&self, user_id: &str) -> Result<(), ClientError>;
}

#[async_trait]
pub trait GameSessions: Send + Sync {
    async fn start_game(&self) -> Result<GameRecord, ClientError>;
    async fn delete_game(&self, game_id: &str) -> Result<(), ClientError>;
}

fn build_client(config: &ServicesConfig) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()?)
}

async fn check(service: &'static str, response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// User management service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(config: &ServicesConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.user_management_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct Registered {
    user: UserRecord,
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn register_user(&self, user: &NewUser) -> Result<UserRecord, ClientError> {
        let url = format!("{}/users/user/register", self.base_url);
        let response = self.client.post(url).json(user).send().await?;
        let registered: Registered = check("user_management", response).await?.json().await?;
        Ok(registered.user)
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let response = self.client.delete(url).send().await?;
        check("user_management", response).await?;
        Ok(())
    }
}

/// Game engine service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGameSessions {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGameSessions {
    pub fn new(config: &ServicesConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.game_engine_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct Started {
    game: GameRecord,
}

#[async_trait]
impl GameSessions for HttpGameSessions {
    async fn start_game(&self) -> Result<GameRecord, ClientError> {
        let url = format!("{}/game/start-game", self.base_url);
        let response = self.client.post(url).json(&serde_json::json!({})).send().await?;
        let started: Started = check("game_engine", response).await?.json().await?;
        Ok(started.game)
    }

    async fn delete_game(&self, game_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/game/{}", self.base_url, game_id);
        let response = self.client.delete(url).send().await?;
        check("game_engine", response).await?;
        Ok(())
    }
}
