//! Error types for credential delivery.

use std::path::PathBuf;

use crate::settings::CredentialKind;

/// Top-level error type for the binary and embedding callers.
///
/// Auth and dispatch failures never escape a delivery call; they are folded
/// into `DeliveryResult::errors` per recipient.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-related errors.
///
/// The only class of failure that aborts a whole delivery call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Email settings are not configured")]
    MissingSettings,

    #[error("No {kind} email template is configured")]
    MissingTemplate { kind: CredentialKind },

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A recipient that cannot be delivered to before rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecipientError {
    #[error("{user}: no {kind} value is available to send.")]
    MissingCredential { user: String, kind: CredentialKind },

    #[error("{user}: no email address is on file.")]
    MissingEmail { user: String },
}

/// A template that rendered to nothing usable for a recipient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("{user}: the {kind} email subject is empty after applying the template.")]
    EmptySubject { user: String, kind: CredentialKind },

    #[error("{user}: the {kind} email body is empty after applying the template.")]
    EmptyBody { user: String, kind: CredentialKind },
}

/// Why a request never became a prepared message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrepareError {
    #[error(transparent)]
    Recipient(#[from] RecipientError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Token acquisition or token rejection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("token endpoint returned {status}: {body}")]
    TokenRejected { status: u16, body: String },

    #[error("unable to reach token endpoint: {0}")]
    TokenTransport(String),

    #[error("unable to parse token response: {0}")]
    InvalidTokenResponse(String),

    #[error("mail API rejected the access token ({status}): {body}")]
    Unauthorized { status: u16, body: String },
}

/// Per-message dispatch failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("sender is not permitted to send mail ({status}): {body}")]
    Permission { status: u16, body: String },

    #[error("mail API rejected the request ({status}): {body}")]
    Request { status: u16, body: String },

    #[error("mail API returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to send email ({0})")]
    Transport(String),

    #[error("could not open a mail draft: {0}")]
    Launch(String),
}

impl DispatchError {
    /// Whether the failure means the cached token should be refreshed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Auth(AuthError::Unauthorized { .. }))
    }
}

/// Result type alias for credential delivery.
pub type Result<T> = std::result::Result<T, Error>;

/// Shorten a response body for inclusion in an error message.
pub(crate) fn truncate_for_log(input: &str) -> String {
    const MAX_CHARS: usize = 180;
    let trimmed = input.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{head}…")
    }
}
