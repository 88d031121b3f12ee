use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use super::PermissionGate;
use crate::models::UserResponse;
use crate::permissions::PermissionSet;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{code} ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("could not encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("response carried no data")]
    MissingData,
    #[error("not signed in")]
    NotSignedIn,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Result of login: the credential plus the permission set to seed a
/// [`PermissionGate`] with.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginSession {
    pub token: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
    pub permissions: PermissionSet,
}

impl LoginSession {
    pub fn gate(&self) -> PermissionGate {
        PermissionGate::from_login(self.user.id, self.permissions.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Me {
    pub user: UserResponse,
    pub permissions: PermissionSet,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Thin JSON client for the auth endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// Server origin, e.g. `http://localhost:3000`.
    base_url: String,
    api_prefix: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_prefix: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_prefix: api_prefix.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Socket URL carrying the current token, e.g. `ws://host/ws?token=...`.
    pub fn websocket_url(&self) -> Result<String, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotSignedIn)?;
        let origin = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        Ok(format!("{origin}/ws?token={token}"))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}{}", self.base_url, self.api_prefix, path);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let envelope: Envelope<T> = response.json().await?;

        if let Some(error) = envelope.error {
            return Err(ClientError::Api {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            });
        }
        envelope.data.ok_or(ClientError::MissingData)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<LoginSession, ClientError> {
        let builder = self
            .request(Method::POST, "/auth/login")
            .json(&Credentials { email, password });
        let session: LoginSession = self.send(builder).await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Fetches the caller's profile and permissions; `refresh` bypasses the
    /// server-side cache.
    pub async fn me(&self, refresh: bool) -> Result<Me, ClientError> {
        if self.token.is_none() {
            return Err(ClientError::NotSignedIn);
        }
        let path = if refresh { "/auth/me?refresh=true" } else { "/auth/me" };
        self.send(self.request(Method::GET, path)).await
    }

    /// Refetches the permission set into `gate`, clearing its stale flag.
    pub async fn refresh_gate(&self, gate: &mut PermissionGate) -> Result<(), ClientError> {
        let me = self.me(true).await?;
        gate.replace(me.permissions);
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        if self.token.is_none() {
            return Ok(());
        }
        let builder = self.request(Method::POST, "/auth/logout");
        let response = builder.send().await?;
        let status = response.status();
        self.token = None;
        if status.is_success() {
            Ok(())
        } else {
            let envelope: Envelope<serde_json::Value> = response.json().await?;
            let error = envelope.error.ok_or(ClientError::MissingData)?;
            Err(ClientError::Api {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            })
        }
    }
}
