use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::error::{CoreError, Result};

/// Outcome of a successful sign-in or sign-up. Only `user_id` is consumed by
/// the sync core; the tokens belong to the transport layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

/// Client for the identity provider.
///
/// Sign-up stores the chosen username in the user metadata; callers that
/// want the `userProfile` row as well compose this with
/// [`HabitStore::create_profile`](crate::store::HabitStore::create_profile)
/// once they hold the new session.
pub struct AuthClient {
    config: BackendConfig,
    client: reqwest::Client,
}

impl AuthClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub async fn sign_up(&self, username: &str, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/signup", self.config.auth_url());
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": { "username": username },
        });
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .json(&body)
            .send()
            .await?;
        Self::session_from(response).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/token?grant_type=password", self.config.auth_url());
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .json(&body)
            .send()
            .await?;
        Self::session_from(response).await
    }

    /// Fetch the user behind an access token; `Auth` error when the token is
    /// stale or revoked.
    pub async fn current_user(&self, access_token: &str) -> Result<AuthUser> {
        let url = format!("{}/user", self.config.auth_url());
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CoreError::Auth(response.text().await.unwrap_or_default()));
        }
        Ok(response.json().await?)
    }

    /// Best-effort token revocation.
    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = format!("{}/logout", self.config.auth_url());
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CoreError::Auth(response.text().await.unwrap_or_default()));
        }
        Ok(())
    }

    async fn session_from(response: reqwest::Response) -> Result<Session> {
        if !response.status().is_success() {
            return Err(CoreError::Auth(response.text().await.unwrap_or_default()));
        }
        let token: TokenResponse = response.json().await?;
        Ok(Session {
            user_id: token.user.id,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }
}
