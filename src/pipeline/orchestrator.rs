//! Delivery orchestrator: turns a batch of requests into one `DeliveryResult`.
//!
//! Flow:
//! 1. Validate settings (the only step that can fail the whole call)
//! 2. Resolve each recipient's credential and address
//! 3. Render subject/body and classify the body
//! 4. Hand the prepared batch to the configured channel
//! 5. Fold pre-dispatch failures and channel outcomes into one result

use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::channels::{
    DeliveryChannel, DesktopDraftDispatcher, DraftLauncher, GraphDispatcher, SystemLauncher,
};
use crate::config::DeliveryConfig;
use crate::error::{ConfigError, PrepareError, RecipientError, RenderError};
use crate::oauth::TokenProvider;
use crate::pipeline::content::{is_html, strip_html};
use crate::pipeline::template::render_template;
use crate::pipeline::types::{
    ContentType, DeliveryRequest, DeliveryResult, PreparedMessage, RenderContext,
};
use crate::settings::{CredentialKind, DeliveryMethod, EmailSettings, EmailTemplate};

/// Entry point of the credential delivery pipeline.
///
/// Holds the collaborators that outlive a single batch: the HTTP client, the
/// token cache and the draft launcher.
pub struct DeliveryOrchestrator {
    config: DeliveryConfig,
    http_client: reqwest::Client,
    tokens: Arc<TokenProvider>,
    launcher: Arc<dyn DraftLauncher>,
}

impl DeliveryOrchestrator {
    /// Create an orchestrator from explicit collaborators.
    pub fn new(
        config: DeliveryConfig,
        http_client: reqwest::Client,
        tokens: Arc<TokenProvider>,
        launcher: Arc<dyn DraftLauncher>,
    ) -> Self {
        Self {
            config,
            http_client,
            tokens,
            launcher,
        }
    }

    /// Create an orchestrator wired to the real network and the OS mail handler.
    pub fn from_config(config: DeliveryConfig) -> Result<Self, ConfigError> {
        let http_client = config
            .http_client()
            .map_err(|e| ConfigError::InvalidValue {
                key: "httpClient".into(),
                message: e.to_string(),
            })?;
        let tokens = Arc::new(TokenProvider::new(http_client.clone(), &config));
        Ok(Self::new(
            config,
            http_client,
            tokens,
            Arc::new(SystemLauncher::new()),
        ))
    }

    /// The token cache shared by every Graph batch this orchestrator runs.
    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Deliver `kind` notifications to every request.
    ///
    /// Only configuration problems are returned as `Err`; every per-recipient
    /// problem is counted and described in the returned result.
    pub async fn deliver(
        &self,
        requests: &[DeliveryRequest],
        kind: CredentialKind,
        settings: Option<&EmailSettings>,
    ) -> Result<DeliveryResult, ConfigError> {
        let settings = settings.ok_or(ConfigError::MissingSettings)?;
        let template = settings
            .template_for(kind)
            .ok_or(ConfigError::MissingTemplate { kind })?;
        let channel = self.channel_for(settings)?;

        let batch_id = Uuid::new_v4();
        let span = info_span!(
            "deliver",
            %batch_id,
            method = %settings.method,
            kind = %kind,
            recipients = requests.len()
        );

        let result = async move {
            info!("Starting credential delivery");
            let result = run_batch(channel.as_ref(), requests, kind, template).await;
            info!(
                success = result.success,
                failed = result.failed,
                "Credential delivery finished"
            );
            result
        }
        .instrument(span)
        .await;

        Ok(result)
    }

    fn channel_for(&self, settings: &EmailSettings) -> Result<Box<dyn DeliveryChannel>, ConfigError> {
        let channel: Box<dyn DeliveryChannel> = match settings.method {
            DeliveryMethod::Graph => Box::new(GraphDispatcher::new(
                self.http_client.clone(),
                Arc::clone(&self.tokens),
                settings.graph_credentials()?,
                &self.config,
            )),
            DeliveryMethod::Desktop => Box::new(DesktopDraftDispatcher::new(
                Arc::clone(&self.launcher),
                self.config.draft_stagger,
            )),
        };
        Ok(channel)
    }
}

/// Prepare every request and send what survives through `channel`.
pub async fn run_batch(
    channel: &dyn DeliveryChannel,
    requests: &[DeliveryRequest],
    kind: CredentialKind,
    template: &EmailTemplate,
) -> DeliveryResult {
    let plain_text = channel.requires_plain_text();
    let mut prepared = Vec::with_capacity(requests.len());
    let mut failed = 0;
    let mut errors = Vec::new();

    for request in requests {
        match prepare_message(request, kind, template, plain_text) {
            Ok(message) => prepared.push(message),
            Err(e) => {
                warn!(user = %request.recipient.user_name, error = %e, "Skipping recipient");
                failed += 1;
                errors.push(e.to_string());
            }
        }
    }

    let mut success = 0;
    if !prepared.is_empty() {
        let summary = channel.dispatch(prepared).await;
        success = summary.success;
        failed += summary.failed;
        errors.extend(summary.errors);
    }

    DeliveryResult {
        method: channel.method(),
        success,
        failed,
        errors,
    }
}

/// Resolve, render and classify one request.
pub fn prepare_message(
    request: &DeliveryRequest,
    kind: CredentialKind,
    template: &EmailTemplate,
    plain_text: bool,
) -> Result<PreparedMessage, PrepareError> {
    let user = display_name(request);

    if request.credential(kind).is_none() {
        return Err(RecipientError::MissingCredential { user, kind }.into());
    }
    let Some(to) = request.recipient.address() else {
        return Err(RecipientError::MissingEmail { user }.into());
    };

    let context = RenderContext::for_request(request);
    let rendered = render_template(template, &context);
    if rendered.subject.is_empty() {
        return Err(RenderError::EmptySubject { user, kind }.into());
    }

    let (body, content_type) = match (is_html(&rendered.body), plain_text) {
        (true, true) => (strip_html(&rendered.body), ContentType::Text),
        (true, false) => (rendered.body, ContentType::Html),
        (false, _) => (rendered.body, ContentType::Text),
    };
    if body.is_empty() {
        return Err(RenderError::EmptyBody { user, kind }.into());
    }

    Ok(PreparedMessage {
        to: to.to_string(),
        subject: rendered.subject,
        body,
        content_type,
    })
}

fn display_name(request: &DeliveryRequest) -> String {
    let recipient = &request.recipient;
    let name = recipient.user_name.trim();
    if !name.is_empty() {
        name.to_string()
    } else {
        recipient
            .address()
            .unwrap_or("(unnamed user)")
            .to_string()
    }
}
