//! Client-credentials token acquisition for Microsoft Graph.
//!
//! A `TokenProvider` owns the only cross-message state in the pipeline: the
//! current access token. It is created by the caller and handed to the
//! orchestrator, so its lifetime is whatever the caller decides.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;
use crate::error::{AuthError, truncate_for_log};

/// Scope requesting every application permission granted to the app registration.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Lifetime assumed when the token endpoint does not state one.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// A bearer token and the instant it stops being usable.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug)]
struct CachedToken {
    tenant_id: String,
    client_id: String,
    token: AccessToken,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Acquires and caches a Graph access token.
///
/// Empty until the first successful request, then cached until the token
/// (minus the configured margin) expires or [`TokenProvider::invalidate`] is
/// called. A failed request never populates the cache.
pub struct TokenProvider {
    http_client: reqwest::Client,
    config: DeliveryConfig,
    expiry_margin: TimeDelta,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http_client: reqwest::Client, config: &DeliveryConfig) -> Self {
        Self {
            http_client,
            config: config.clone(),
            expiry_margin: TimeDelta::from_std(config.token_expiry_margin)
                .unwrap_or_else(|_| TimeDelta::seconds(60)),
            cached: Mutex::new(None),
        }
    }

    /// Return a usable token for the app registration, requesting one if needed.
    pub async fn get_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &SecretString,
    ) -> Result<SecretString, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref()
            && entry.tenant_id == tenant_id
            && entry.client_id == client_id
            && !entry.token.is_expired()
        {
            debug!(tenant_id, "Using cached Graph token");
            return Ok(entry.token.value.clone());
        }

        // Drop whatever was there before asking again.
        *cached = None;

        let token = self.request_token(tenant_id, client_id, client_secret).await?;
        let value = token.value.clone();
        *cached = Some(CachedToken {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            token,
        });
        Ok(value)
    }

    /// Forget the cached token so the next call requests a fresh one.
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            debug!("Graph token invalidated");
        }
    }

    /// Whether a token is currently cached (expired or not).
    pub async fn is_cached(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    async fn request_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &SecretString,
    ) -> Result<AccessToken, AuthError> {
        let token_url = self.config.token_url(tenant_id);
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenTransport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::TokenTransport(e.to_string()))?;

        if !status.is_success() {
            warn!(tenant_id, status = status.as_u16(), "Graph token request rejected");
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                body: truncate_for_log(&body),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidTokenResponse(e.to_string()))?;
        if parsed.access_token.trim().is_empty() {
            return Err(AuthError::InvalidTokenResponse(
                "access_token is empty".into(),
            ));
        }

        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS).max(0);
        let expires_at = TimeDelta::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .and_then(|at| at.checked_sub_signed(self.expiry_margin))
            .ok_or_else(|| {
                AuthError::InvalidTokenResponse(format!("expires_in out of range: {expires_in}"))
            })?;

        info!(tenant_id, expires_at = %expires_at, "Acquired Graph access token");

        Ok(AccessToken {
            value: SecretString::from(parsed.access_token),
            expires_at,
        })
    }
}
