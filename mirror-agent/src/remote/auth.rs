//! Bearer token acquisition.

use super::TokenProvider;
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Two-legged OAuth client-credentials flow.
///
/// No caching: every call performs a token request, matching the per-call
/// contract of [`TokenProvider`].
pub struct ClientCredentials {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ClientCredentials {
    pub fn new(
        client: reqwest::Client,
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: "data:read".to_string(),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn token(&self) -> Result<String> {
        let response = self
            .client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| MirrorError::Network(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Authentication(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| MirrorError::Authentication(format!("malformed token response: {}", e)))?;

        debug!("Obtained access token");
        Ok(body.access_token)
    }
}

/// A fixed token, for services fronted by a pre-issued key.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
