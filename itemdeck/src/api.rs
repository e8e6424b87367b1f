//! Request gateway: one HTTP client, bearer injection, 401 interception.
//!
//! The token is read through the injected [`TokenStore`] before every request
//! rather than cached, so the gateway stays correct when another invocation
//! rotates or clears the stored token. A 401 from any endpoint clears the
//! durable token and broadcasts [`SessionEvent::SessionInvalidated`] before
//! the failure is returned; this fires for login and register too, and the
//! hosting layer decides how to react.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::token::{TokenStore, TokenStoreError};
use crate::types::{Item, TokenGrant, User};

/// Cross-cutting session signals emitted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server rejected our credentials; the durable token has been cleared.
    SessionInvalidated,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{detail}")]
    Api { status: StatusCode, detail: String },
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Token(#[from] TokenStoreError),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Api { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// Server-provided message, when the failure carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Api { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    pub fn new(
        base_url: String,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("itemdeck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            events,
        })
    }

    /// Subscribe to session signals. Receivers created after an event was
    /// sent do not see it, so subscribe before issuing requests.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<TokenGrant, ApiError> {
        self.send_json(
            Method::POST,
            "/auth/register",
            Some(json!({ "email": email, "name": name, "password": password })),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenGrant, ApiError> {
        self.send_json(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.send_json(Method::GET, "/auth/me", None).await
    }

    pub async fn list_items(&self) -> Result<Vec<Item>, ApiError> {
        self.send_json(Method::GET, "/items", None).await
    }

    pub async fn get_item(&self, id: &str) -> Result<Item, ApiError> {
        self.send_json(Method::GET, &format!("/items/{id}"), None)
            .await
    }

    pub async fn create_item(&self, title: &str, description: &str) -> Result<Item, ApiError> {
        validate_title(title)?;
        self.send_json(
            Method::POST,
            "/items",
            Some(json!({ "title": title, "description": description })),
        )
        .await
    }

    pub async fn update_item(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<Item, ApiError> {
        validate_title(title)?;
        self.send_json(
            Method::PUT,
            &format!("/items/{id}"),
            Some(json!({ "title": title, "description": description })),
        )
        .await
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, &format!("/items/{id}"), None)
            .await
            .map(|_| ())
    }

    pub async fn health(&self) -> Result<serde_json::Value, ApiError> {
        self.send_json(Method::GET, "/health", None).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, body).await?;
        Ok(response.json().await?)
    }

    /// Uniform dispatch: durable token read, bearer header, 401 interception.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = self.tokens.load()? {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "authentication rejected; clearing stored token");
            if let Err(e) = self.tokens.clear() {
                warn!(error = %e, "failed to clear stored token");
            }
            let _ = self.events.send(SessionEvent::SessionInvalidated);
        }

        if status.is_success() {
            debug!(%method, path, %status, "request ok");
            return Ok(response);
        }

        let detail = extract_detail(response).await.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        debug!(%method, path, %status, detail = %detail, "request failed");
        Err(ApiError::Api { status, detail })
    }
}

/// The API puts its human-readable error message under `detail`.
async fn extract_detail(response: reqwest::Response) -> Option<String> {
    let value: serde_json::Value = response.json().await.ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::InvalidInput(String::from("Title is required")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::{validate_title, ApiError};

    #[test]
    fn validate_title_rejects_empty_and_whitespace() {
        assert!(matches!(
            validate_title(""),
            Err(ApiError::InvalidInput(message)) if message == "Title is required"
        ));
        assert!(validate_title("   \t").is_err());
    }

    #[test]
    fn validate_title_accepts_real_titles() {
        assert!(validate_title("groceries").is_ok());
        assert!(validate_title("  padded  ").is_ok());
    }
}
