//! Session store: the client's belief about who is currently logged in.
//!
//! A cheap clone-able handle over shared state, mirroring the shape the
//! gateway hands back: `user`, `token`, `is_loading`, `error`. Mutations are
//! not mutually exclusive; two concurrent logins interleave and the last
//! write wins. That is accepted for the one-user-at-a-keyboard interaction
//! pattern this client serves.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::token::TokenStore;
use crate::types::{TokenGrant, User};

/// Point-in-time snapshot of the session state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    api: ApiClient,
    tokens: Arc<dyn TokenStore>,
    state: Arc<RwLock<Session>>,
}

impl SessionStore {
    /// Rehydrates the token from durable storage. `user` stays empty until a
    /// successful identity fetch; a storage read failure starts logged out.
    pub fn new(api: ApiClient, tokens: Arc<dyn TokenStore>) -> Self {
        let token = match tokens.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "failed to read stored token; starting logged out");
                None
            }
        };
        Self {
            api,
            tokens,
            state: Arc::new(RwLock::new(Session {
                token,
                ..Session::default()
            })),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    /// On success stores the granted token durably and in memory, then
    /// refreshes the identity. On failure records the server message (or a
    /// generic fallback) in `error` and returns the failure to the caller.
    /// `is_loading` is cleared on every path.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        self.begin_auth().await;
        let outcome = self.api.login(email, password).await;
        self.finish_auth(outcome, "Login failed").await
    }

    /// Identical contract to [`Self::login`] against the registration endpoint.
    pub async fn register(&self, email: &str, name: &str, password: &str) -> Result<(), ApiError> {
        self.begin_auth().await;
        let outcome = self.api.register(email, name, password).await;
        self.finish_auth(outcome, "Registration failed").await
    }

    /// Drops both the durable and in-memory session. No network call.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.tokens.clear()?;
        let mut state = self.state.write().await;
        state.user = None;
        state.token = None;
        Ok(())
    }

    /// Fetches `/auth/me` with the current token. Failures degrade silently
    /// to a logged-out in-memory state; the durable token is cleared only by
    /// the gateway's 401 path, so a transient network error does not destroy
    /// a still-valid stored token.
    pub async fn refresh_current_user(&self) {
        match self.api.current_user().await {
            Ok(user) => {
                let mut state = self.state.write().await;
                state.user = Some(user);
            }
            Err(e) => {
                debug!(error = %e, "identity refresh failed; dropping in-memory session");
                let mut state = self.state.write().await;
                state.user = None;
                state.token = None;
            }
        }
    }

    async fn begin_auth(&self) {
        let mut state = self.state.write().await;
        state.is_loading = true;
        state.error = None;
    }

    async fn finish_auth(
        &self,
        outcome: Result<TokenGrant, ApiError>,
        fallback: &str,
    ) -> Result<(), ApiError> {
        match outcome {
            Ok(granted) => {
                let stored = self.tokens.save(&granted.access_token);
                {
                    let mut state = self.state.write().await;
                    state.is_loading = false;
                    match &stored {
                        Ok(()) => state.token = Some(granted.access_token),
                        Err(e) => state.error = Some(e.to_string()),
                    }
                }
                stored?;
                self.refresh_current_user().await;
                Ok(())
            }
            Err(e) => {
                let message = e
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| String::from(fallback));
                let mut state = self.state.write().await;
                state.is_loading = false;
                state.error = Some(message);
                Err(e)
            }
        }
    }
}
