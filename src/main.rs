use std::path::PathBuf;

use anyhow::Context;

use credential_delivery::config::DeliveryConfig;
use credential_delivery::error::{ConfigError, Error};
use credential_delivery::pipeline::{DeliveryOrchestrator, DeliveryRequest};
use credential_delivery::settings::{CredentialKind, load_email_settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(kind), Some(requests_path)) = (args.next(), args.next()) else {
        eprintln!("Usage: credential-delivery <pin|otp> <requests.json>");
        eprintln!("  export CREDENTIAL_DELIVERY_SETTINGS=./settings.json");
        std::process::exit(2);
    };

    let kind: CredentialKind = kind.parse().map_err(Error::from)?;
    let requests_path = PathBuf::from(requests_path);

    let settings_path = std::env::var("CREDENTIAL_DELIVERY_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./settings.json"));

    let settings = load_email_settings(&settings_path).map_err(Error::from)?;

    let raw = std::fs::read_to_string(&requests_path)
        .with_context(|| format!("reading {}", requests_path.display()))?;
    let requests: Vec<DeliveryRequest> =
        serde_json::from_str(&raw).map_err(|e| {
            Error::from(ConfigError::ParseError {
                path: requests_path.clone(),
                message: e.to_string(),
            })
        })?;

    let config = DeliveryConfig::from_env();

    eprintln!("📨 Credential delivery v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Settings: {}", settings_path.display());
    eprintln!("   Kind: {kind}");
    eprintln!("   Recipients: {}", requests.len());

    let orchestrator = DeliveryOrchestrator::from_config(config).map_err(Error::from)?;
    let result = orchestrator
        .deliver(&requests, kind, settings.as_ref())
        .await
        .map_err(Error::from)?;

    eprintln!("   Method: {}", result.method);
    eprintln!("   Sent: {}  Failed: {}\n", result.success, result.failed);
    for error in &result.errors {
        eprintln!("   - {error}");
    }

    if !result.is_complete_success() {
        std::process::exit(1);
    }

    Ok(())
}
