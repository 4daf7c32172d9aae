//! Email settings as persisted by the settings store.
//!
//! The pipeline only reads these; editing and persisting them belongs to the
//! settings collaborator.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The two notification categories the tool sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Pin,
    Otp,
}

impl CredentialKind {
    /// Upper-case label used in operator-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pin => "PIN",
            Self::Otp => "OTP",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CredentialKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pin" => Ok(Self::Pin),
            "otp" => Ok(Self::Otp),
            other => Err(ConfigError::InvalidValue {
                key: "credentialKind".into(),
                message: format!("expected \"pin\" or \"otp\", got \"{other}\""),
            }),
        }
    }
}

/// Which channel a batch goes out through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMethod {
    /// Pre-filled drafts in the operator's mail client.
    #[default]
    Desktop,
    /// Direct send through Microsoft Graph.
    Graph,
}

impl DeliveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Graph => "graph",
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-editable subject/body pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl EmailTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn default_pin() -> Self {
        Self::new(
            "Your printing PIN",
            "Hello {{fullName || userName}},\n\n\
             Your new printing PIN is {{pin}}.\n\
             Use this code at any printer that asks for a numeric PIN.\n\n\
             Thanks,\nPrint Administrator",
        )
    }

    pub fn default_otp() -> Self {
        Self::new(
            "Your one-time password",
            "Hello {{fullName || userName}},\n\n\
             Your one-time password is {{otp}}.\n\
             Enter this code when the portal or a device asks for an OTP.\n\n\
             Thanks,\nPrint Administrator",
        )
    }

    /// A template with neither a subject nor a body counts as not configured.
    pub fn is_blank(&self) -> bool {
        self.subject.trim().is_empty() && self.body.trim().is_empty()
    }
}

fn default_pin_template() -> Option<EmailTemplate> {
    Some(EmailTemplate::default_pin())
}

fn default_otp_template() -> Option<EmailTemplate> {
    Some(EmailTemplate::default_otp())
}

/// Email section of the settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    #[serde(default)]
    pub method: DeliveryMethod,
    #[serde(default)]
    pub graph_tenant_id: Option<String>,
    #[serde(default)]
    pub graph_client_id: Option<String>,
    #[serde(default)]
    pub graph_client_secret: Option<String>,
    #[serde(default)]
    pub graph_sender_address: Option<String>,
    #[serde(default = "default_pin_template")]
    pub pin_template: Option<EmailTemplate>,
    #[serde(default = "default_otp_template")]
    pub otp_template: Option<EmailTemplate>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            method: DeliveryMethod::Desktop,
            graph_tenant_id: None,
            graph_client_id: None,
            graph_client_secret: None,
            graph_sender_address: None,
            pin_template: default_pin_template(),
            otp_template: default_otp_template(),
        }
    }
}

impl EmailSettings {
    /// Template for a credential kind, or `None` when it is not configured.
    pub fn template_for(&self, kind: CredentialKind) -> Option<&EmailTemplate> {
        let template = match kind {
            CredentialKind::Pin => self.pin_template.as_ref(),
            CredentialKind::Otp => self.otp_template.as_ref(),
        };
        template.filter(|t| !t.is_blank())
    }

    /// Validate the Graph fields. Only meaningful when `method` is `Graph`.
    pub fn graph_credentials(&self) -> Result<GraphCredentials, ConfigError> {
        Ok(GraphCredentials {
            tenant_id: required(&self.graph_tenant_id, "graphTenantId")?,
            client_id: required(&self.graph_client_id, "graphClientId")?,
            client_secret: SecretString::from(required(
                &self.graph_client_secret,
                "graphClientSecret",
            )?),
            sender_address: required(&self.graph_sender_address, "graphSenderAddress")?,
        })
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: "Microsoft Graph delivery needs the tenant ID, client ID, client secret and sender address.".into(),
        })
}

/// Validated app registration used for Graph delivery.
#[derive(Debug, Clone)]
pub struct GraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub sender_address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    #[serde(default)]
    email_settings: Option<EmailSettings>,
}

/// Read the email section of a settings document.
///
/// Returns `Ok(None)` when the file does not exist or carries no email section.
pub fn load_email_settings(path: &Path) -> Result<Option<EmailSettings>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }

    let stored: StoredSettings =
        serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(stored.email_settings)
}
