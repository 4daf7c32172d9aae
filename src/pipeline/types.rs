//! Shared types for the delivery pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::settings::{CredentialKind, DeliveryMethod};

// ── Requests ────────────────────────────────────────────────────────

/// A directory user as the caller knows them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// PIN currently stored in the directory.
    #[serde(default)]
    pub pin: Option<String>,
    /// OTP currently stored in the directory.
    #[serde(default)]
    pub otp: Option<String>,
}

impl Recipient {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }

    /// Trimmed email address, if one is on file.
    pub fn address(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }
}

/// One recipient of a delivery batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    pub recipient: Recipient,
    /// Freshly generated PIN that has not been read back from the directory yet.
    #[serde(default)]
    pub pin_override: Option<String>,
    /// Freshly generated OTP that has not been read back from the directory yet.
    #[serde(default)]
    pub otp_override: Option<String>,
}

impl DeliveryRequest {
    pub fn new(recipient: Recipient) -> Self {
        Self {
            recipient,
            pin_override: None,
            otp_override: None,
        }
    }

    pub fn with_pin_override(mut self, pin: impl Into<String>) -> Self {
        self.pin_override = Some(pin.into());
        self
    }

    pub fn with_otp_override(mut self, otp: impl Into<String>) -> Self {
        self.otp_override = Some(otp.into());
        self
    }

    /// Override first, then the stored value. Blank values count as missing.
    pub fn credential(&self, kind: CredentialKind) -> Option<&str> {
        let (overridden, stored) = match kind {
            CredentialKind::Pin => (&self.pin_override, &self.recipient.pin),
            CredentialKind::Otp => (&self.otp_override, &self.recipient.otp),
        };
        non_blank(overridden.as_deref()).or_else(|| non_blank(stored.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ── Render context ──────────────────────────────────────────────────

/// Resolved token values for one recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    values: BTreeMap<String, String>,
}

impl RenderContext {
    /// Build the context for a request. Missing values resolve to empty strings.
    pub fn for_request(request: &DeliveryRequest) -> Self {
        let recipient = &request.recipient;
        Self::from_pairs([
            ("userName", recipient.user_name.trim()),
            ("fullName", non_blank(recipient.full_name.as_deref()).unwrap_or("")),
            ("email", recipient.address().unwrap_or("")),
            ("pin", request.credential(CredentialKind::Pin).unwrap_or("")),
            ("otp", request.credential(CredentialKind::Otp).unwrap_or("")),
        ])
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

// ── Prepared messages ───────────────────────────────────────────────

/// How a body should be interpreted by the receiving mail client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Html,
}

impl ContentType {
    /// Value of Graph's `body.contentType` field.
    pub fn graph_value(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Html => "HTML",
        }
    }
}

/// A rendered message ready for a channel.
///
/// Only built from a request with a non-empty address, subject and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub content_type: ContentType,
}

// ── Results ─────────────────────────────────────────────────────────

/// What a channel reports after working through a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl DispatchSummary {
    pub fn record_success(&mut self) {
        self.success += 1;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(error.into());
    }
}

/// Outcome of one delivery call, for the operator-facing summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub method: DeliveryMethod,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl DeliveryResult {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }
}
