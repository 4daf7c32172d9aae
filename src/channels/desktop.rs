//! Desktop draft channel. Opens one `mailto:` compose window per recipient.
//!
//! Nothing is sent from here. The operator reviews and sends each draft in
//! their own mail client. Draft `i` opens no earlier than `i * stagger` after
//! the batch starts.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::channels::DeliveryChannel;
use crate::error::DispatchError;
use crate::pipeline::types::{DispatchSummary, PreparedMessage};
use crate::settings::DeliveryMethod;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Addresses additionally keep `@` readable.
const ADDRESS: &AsciiSet = &COMPONENT.remove(b'@');

/// Build a `mailto:` URI with an encoded subject and a CRLF body.
pub fn mailto_uri(to: &str, subject: &str, body: &str) -> String {
    let body = body.replace("\r\n", "\n").replace('\n', "\r\n");
    format!(
        "mailto:{}?subject={}&body={}",
        utf8_percent_encode(to.trim(), ADDRESS),
        utf8_percent_encode(subject, COMPONENT),
        utf8_percent_encode(&body, COMPONENT),
    )
}

/// Hands a URI to whatever opens `mailto:` links on this machine.
#[async_trait]
pub trait DraftLauncher: Send + Sync {
    async fn open(&self, uri: &str) -> Result<(), DispatchError>;
}

/// Launches URIs through the platform's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }

    fn command(uri: &str) -> (&'static str, Command) {
        if cfg!(target_os = "windows") {
            // `cmd /C start` would split the URI at `&`.
            let mut c = Command::new("rundll32");
            c.args(["url.dll,FileProtocolHandler", uri]);
            ("rundll32", c)
        } else if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(uri);
            ("open", c)
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(uri);
            ("xdg-open", c)
        }
    }
}

#[async_trait]
impl DraftLauncher for SystemLauncher {
    async fn open(&self, uri: &str) -> Result<(), DispatchError> {
        let (program, mut command) = Self::command(uri);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = command
            .status()
            .await
            .map_err(|e| DispatchError::Launch(format!("failed to run {program}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(DispatchError::Launch(format!("{program} exited with {status}")))
        }
    }
}

/// Opens drafts one after another, `stagger` apart.
pub struct DesktopDraftDispatcher {
    launcher: Arc<dyn DraftLauncher>,
    stagger: Duration,
}

impl DesktopDraftDispatcher {
    pub fn new(launcher: Arc<dyn DraftLauncher>, stagger: Duration) -> Self {
        Self { launcher, stagger }
    }

    /// Open a single draft.
    pub async fn open_draft(&self, to: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        self.launcher.open(&mailto_uri(to, subject, body)).await
    }
}

#[async_trait]
impl DeliveryChannel for DesktopDraftDispatcher {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Desktop
    }

    fn requires_plain_text(&self) -> bool {
        true
    }

    /// Bodies are used as given; HTML is reduced before the batch gets here.
    async fn dispatch(&self, messages: Vec<PreparedMessage>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let started = Instant::now();

        for (index, message) in messages.into_iter().enumerate() {
            if index > 0 {
                let offset = self
                    .stagger
                    .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
                tokio::time::sleep_until(started + offset).await;
            }

            match self.open_draft(&message.to, &message.subject, &message.body).await {
                Ok(()) => summary.record_success(),
                Err(e) => {
                    warn!(recipient = %message.to, error = %e, "Failed to open mail draft");
                    summary.record_failure(format!("{}: {e}", message.to));
                }
            }
        }

        info!(
            opened = summary.success,
            failed = summary.failed,
            "Desktop drafts processed"
        );
        summary
    }
}
