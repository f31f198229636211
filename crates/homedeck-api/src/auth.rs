// Auth endpoints
//
// Session login/refresh/logout plus the hub long-lived token exchange.
// Token records mirror the server's JSON shapes; expiries stay typed so
// callers can make refresh decisions without re-parsing.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::DesignerClient;
use crate::error::Error;

pub const LOGIN_PATH: &str = "auth/login";
pub const LOGOUT_PATH: &str = "auth/logout";
pub const REFRESH_TOKEN_PATH: &str = "auth/refresh-token";
pub const USER_PATH: &str = "auth/user";
pub const LONG_LIVED_TOKEN_PATH: &str = "auth/long-lived-token";

// ── Models ───────────────────────────────────────────────────────────

/// A full session token pair as returned by login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub user_name: String,
    pub access_token: String,
    pub access_token_expiry: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expiry: DateTime<Utc>,
}

/// The replacement access token returned by a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: String,
    pub access_token_expiry: DateTime<Utc>,
}

/// The hub's long-lived token, minted by the designer server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubToken {
    pub token: String,
}

/// The authenticated user, including security roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub user_name: String,
    pub roles: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    password: &'a str,
}

// ── Endpoints ────────────────────────────────────────────────────────

impl DesignerClient {
    /// Log in with username and password.
    ///
    /// `POST /auth/login`
    pub async fn login(
        &self,
        user_name: &str,
        password: &SecretString,
    ) -> Result<AccessToken, Error> {
        debug!(user_name, "logging in");
        let body = LoginRequest {
            user_name,
            password: password.expose_secret(),
        };
        self.post_json(self.url(LOGIN_PATH), &body, None).await
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// `GET /auth/refresh-token`
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedToken, Error> {
        debug!("refreshing access token");
        self.get_json(self.url(REFRESH_TOKEN_PATH), Some(refresh_token))
            .await
    }

    /// End the server-side session.
    ///
    /// `GET /auth/logout`
    pub async fn logout(&self, access_token: &str) -> Result<(), Error> {
        debug!("logging out");
        let _: serde_json::Value = self
            .get_json(self.url(LOGOUT_PATH), Some(access_token))
            .await?;
        Ok(())
    }

    /// Fetch the authenticated user record (includes roles).
    ///
    /// `GET /auth/user`
    pub async fn current_user(&self, access_token: &str) -> Result<User, Error> {
        self.get_json(self.url(USER_PATH), Some(access_token)).await
    }

    /// Fetch a long-lived hub token.
    ///
    /// `GET /auth/long-lived-token`
    pub async fn hub_token(&self, access_token: &str) -> Result<HubToken, Error> {
        self.get_json(self.url(LONG_LIVED_TOKEN_PATH), Some(access_token))
            .await
    }
}
