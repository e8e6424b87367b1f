//! Wire types shared between the gateway and the session store.

use serde::Deserialize;

/// Identity snapshot returned by `GET /auth/me`. Owned by the session store;
/// never mutated client-side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Item as the server owns it. The client only ever holds transient copies,
/// replaced wholesale on each list call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: String,
}

/// Success body of `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
}
