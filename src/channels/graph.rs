//! Microsoft Graph channel. One `sendMail` call per message, in order.

use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{info, warn};

use crate::channels::DeliveryChannel;
use crate::config::DeliveryConfig;
use crate::error::{AuthError, DispatchError, truncate_for_log};
use crate::oauth::TokenProvider;
use crate::pipeline::types::{DispatchSummary, PreparedMessage};
use crate::settings::{DeliveryMethod, GraphCredentials};

/// Path-segment characters left as-is in the sender's address.
const SENDER_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'@')
    .remove(b'+');

/// Sends prepared messages through Graph on behalf of one mailbox.
pub struct GraphDispatcher {
    http_client: reqwest::Client,
    tokens: Arc<TokenProvider>,
    credentials: GraphCredentials,
    send_url: String,
}

impl GraphDispatcher {
    pub fn new(
        http_client: reqwest::Client,
        tokens: Arc<TokenProvider>,
        credentials: GraphCredentials,
        config: &DeliveryConfig,
    ) -> Self {
        let sender = utf8_percent_encode(&credentials.sender_address, SENDER_SEGMENT);
        let send_url = format!("{}/users/{sender}/sendMail", config.graph_base_url);
        Self {
            http_client,
            tokens,
            credentials,
            send_url,
        }
    }

    async fn token(&self) -> Result<SecretString, AuthError> {
        self.tokens
            .get_token(
                &self.credentials.tenant_id,
                &self.credentials.client_id,
                &self.credentials.client_secret,
            )
            .await
    }

    /// Send one message with the given bearer token.
    pub async fn send(
        &self,
        message: &PreparedMessage,
        token: &SecretString,
    ) -> Result<(), DispatchError> {
        let payload = json!({
            "message": {
                "subject": message.subject,
                "body": {
                    "contentType": message.content_type.graph_value(),
                    "content": message.body,
                },
                "toRecipients": [
                    { "emailAddress": { "address": message.to } }
                ]
            },
            "saveToSentItems": false
        });

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .map(|b| truncate_for_log(&b))
            .unwrap_or_else(|_| "(no details)".to_string());
        let code = status.as_u16();

        Err(match status {
            StatusCode::UNAUTHORIZED => {
                DispatchError::Auth(AuthError::Unauthorized { status: code, body })
            }
            StatusCode::FORBIDDEN => DispatchError::Permission { status: code, body },
            StatusCode::BAD_REQUEST => DispatchError::Request { status: code, body },
            _ => DispatchError::Rejected { status: code, body },
        })
    }

    /// Send one message, refreshing the token and retrying once on a 401.
    ///
    /// The flag in the error is set when no token could be obtained at all.
    async fn send_with_refresh(&self, message: &PreparedMessage) -> Result<(), (DispatchError, bool)> {
        let token = self
            .token()
            .await
            .map_err(|e| (DispatchError::from(e), true))?;

        match self.send(message, &token).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unauthorized() => {
                warn!(recipient = %message.to, "Graph rejected the access token, refreshing");
                self.tokens.invalidate().await;
                let fresh = self
                    .token()
                    .await
                    .map_err(|e| (DispatchError::from(e), true))?;
                self.send(message, &fresh).await.map_err(|e| (e, false))
            }
            Err(e) => Err((e, false)),
        }
    }
}

#[async_trait]
impl DeliveryChannel for GraphDispatcher {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Graph
    }

    async fn dispatch(&self, messages: Vec<PreparedMessage>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for (index, message) in messages.iter().enumerate() {
            match self.send_with_refresh(message).await {
                Ok(()) => summary.record_success(),
                Err((e, true)) => {
                    // Without a token nothing after this can succeed either.
                    fail_remaining(&mut summary, &messages[index..], &e);
                    break;
                }
                Err((e, false)) => {
                    warn!(recipient = %message.to, error = %e, "Graph sendMail failed");
                    summary.record_failure(format!("{}: {e}", message.to));
                }
            }
        }

        info!(
            sent = summary.success,
            failed = summary.failed,
            "Graph batch processed"
        );
        summary
    }
}

fn fail_remaining(summary: &mut DispatchSummary, messages: &[PreparedMessage], error: &DispatchError) {
    warn!(count = messages.len(), error = %error, "Graph token unavailable, failing remaining messages");
    for message in messages {
        summary.record_failure(format!("{}: {error}", message.to));
    }
}
