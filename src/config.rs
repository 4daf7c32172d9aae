//! Configuration types.

use std::time::Duration;

/// Runtime configuration for the delivery pipeline.
///
/// Endpoints are configurable so the pipeline can be pointed at a sovereign
/// cloud or a local mock server.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Identity platform host; the tenant ID and token path are appended.
    pub identity_host: String,
    /// Graph API base URL including the version segment.
    pub graph_base_url: String,
    /// User agent sent with every HTTP request.
    pub user_agent: String,
    /// Gap between consecutive desktop draft opens.
    pub draft_stagger: Duration,
    /// How long before its stated expiry a cached token is treated as expired.
    pub token_expiry_margin: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            identity_host: "https://login.microsoftonline.com".to_string(),
            graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            user_agent: format!("credential-delivery/{}", env!("CARGO_PKG_VERSION")),
            draft_stagger: Duration::from_millis(300),
            token_expiry_margin: Duration::from_secs(60),
        }
    }
}

impl DeliveryConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let identity_host = std::env::var("CREDENTIAL_DELIVERY_IDENTITY_HOST")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.identity_host);

        let graph_base_url = std::env::var("CREDENTIAL_DELIVERY_GRAPH_BASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.graph_base_url);

        let user_agent =
            std::env::var("CREDENTIAL_DELIVERY_USER_AGENT").unwrap_or(defaults.user_agent);

        let draft_stagger = std::env::var("CREDENTIAL_DELIVERY_DRAFT_STAGGER_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.draft_stagger);

        let token_expiry_margin = std::env::var("CREDENTIAL_DELIVERY_TOKEN_MARGIN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.token_expiry_margin);

        Self {
            identity_host,
            graph_base_url,
            user_agent,
            draft_stagger,
            token_expiry_margin,
        }
    }

    /// Client-credentials token endpoint for a tenant.
    pub fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{tenant_id}/oauth2/v2.0/token", self.identity_host)
    }

    /// Build the shared HTTP client.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .build()
    }
}
