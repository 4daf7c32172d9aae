//! Graph delivery tests (using WireMock).
//!
//! Each test points the token endpoint and the Graph base URL at a local mock
//! server and checks both the batch result and the exact calls made.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use credential_delivery::channels::SystemLauncher;
use credential_delivery::config::DeliveryConfig;
use credential_delivery::error::AuthError;
use credential_delivery::oauth::TokenProvider;
use credential_delivery::pipeline::{DeliveryOrchestrator, DeliveryRequest, Recipient};
use credential_delivery::settings::{
    CredentialKind, DeliveryMethod, EmailSettings, EmailTemplate,
};

const TOKEN_PATH: &str = "/tenant-id/oauth2/v2.0/token";
const SEND_PATH: &str = "/v1.0/users/noreply@contoso.com/sendMail";

fn create_test_config(base_url: &str) -> DeliveryConfig {
    DeliveryConfig {
        identity_host: base_url.to_string(),
        graph_base_url: format!("{base_url}/v1.0"),
        draft_stagger: Duration::ZERO,
        ..DeliveryConfig::default()
    }
}

fn create_orchestrator(base_url: &str) -> DeliveryOrchestrator {
    let config = create_test_config(base_url);
    let http_client = reqwest::Client::new();
    let tokens = Arc::new(TokenProvider::new(http_client.clone(), &config));
    DeliveryOrchestrator::new(config, http_client, tokens, Arc::new(SystemLauncher::new()))
}

fn graph_settings() -> EmailSettings {
    EmailSettings {
        method: DeliveryMethod::Graph,
        graph_tenant_id: Some("tenant-id".into()),
        graph_client_id: Some("client-id".into()),
        graph_client_secret: Some("client-secret".into()),
        graph_sender_address: Some("noreply@contoso.com".into()),
        pin_template: Some(EmailTemplate::new(
            "Your PIN",
            "Hello {{fullName || userName}}, your PIN is {{pin}}.",
        )),
        ..EmailSettings::default()
    }
}

fn request(user: &str) -> DeliveryRequest {
    DeliveryRequest::new(Recipient::new(user).with_email(format!("{user}@example.com")))
        .with_pin_override("4321")
}

fn token_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token_type": "Bearer",
        "access_token": token,
        "expires_in": 3599
    }))
}

#[tokio::test]
async fn test_graph_batch_uses_one_token_for_all_messages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-id"))
        .and(body_string_contains("client_secret=client-secret"))
        .and(body_string_contains(
            "scope=https%3A%2F%2Fgraph.microsoft.com%2F.default",
        ))
        .respond_with(token_response("mock-token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer mock-token"))
        .and(body_partial_json(json!({
            "message": { "subject": "Your PIN", "body": { "contentType": "Text" } },
            "saveToSentItems": false
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(3)
        .mount(&mock_server)
        .await;

    let requests = vec![request("alice"), request("bob"), request("carol")];
    let result = create_orchestrator(&mock_server.uri())
        .deliver(&requests, CredentialKind::Pin, Some(&graph_settings()))
        .await
        .unwrap();

    assert_eq!(result.method, DeliveryMethod::Graph);
    assert_eq!(result.success, 3);
    assert_eq!(result.failed, 0);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_graph_sends_rendered_html_unchanged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("mock-token"))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({
            "message": {
                "body": { "contentType": "HTML", "content": "<p>PIN: <b>4321</b></p>" },
                "toRecipients": [ { "emailAddress": { "address": "alice@example.com" } } ]
            }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let settings = EmailSettings {
        pin_template: Some(EmailTemplate::new("PIN", "<p>PIN: <b>{{pin}}</b></p>")),
        ..graph_settings()
    };
    let result = create_orchestrator(&mock_server.uri())
        .deliver(&[request("alice")], CredentialKind::Pin, Some(&settings))
        .await
        .unwrap();

    assert_eq!(result.success, 1);
}

#[tokio::test]
async fn test_graph_refreshes_token_once_after_unauthorized() {
    let mock_server = MockServer::start().await;
    let orchestrator = create_orchestrator(&mock_server.uri());
    let settings = graph_settings();

    // Warm the cache with a token the mail API will reject.
    {
        let _stale = Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(token_response("stale-token"))
            .expect(1)
            .mount_as_scoped(&mock_server)
            .await;

        let token = orchestrator
            .tokens()
            .get_token("tenant-id", "client-id", &SecretString::from("client-secret"))
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "stale-token");
    }

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("fresh-token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "InvalidAuthenticationToken", "message": "Access token has expired." }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = orchestrator
        .deliver(&[request("alice")], CredentialKind::Pin, Some(&settings))
        .await
        .unwrap();

    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 0);
    assert!(orchestrator.tokens().is_cached().await);
}

#[tokio::test]
async fn test_graph_gives_up_after_second_unauthorized() {
    let mock_server = MockServer::start().await;

    // Initial token plus exactly one refresh.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("mock-token"))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_string_contains("alice@example.com"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token rejected"))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_string_contains("bob@example.com"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = create_orchestrator(&mock_server.uri())
        .deliver(
            &[request("alice"), request("bob")],
            CredentialKind::Pin,
            Some(&graph_settings()),
        )
        .await
        .unwrap();

    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("alice@example.com: "));
    assert!(result.errors[0].contains("401"));
}

#[tokio::test]
async fn test_graph_forbidden_and_bad_request_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("mock-token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_string_contains("alice@example.com"))
        .respond_with(ResponseTemplate::new(403).set_body_string("ErrorAccessDenied"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_string_contains("bob@example.com"))
        .respond_with(ResponseTemplate::new(400).set_body_string("ErrorInvalidRecipients"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_string_contains("carol@example.com"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = create_orchestrator(&mock_server.uri())
        .deliver(
            &[request("alice"), request("bob"), request("carol")],
            CredentialKind::Pin,
            Some(&graph_settings()),
        )
        .await
        .unwrap();

    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(
        result.errors,
        vec![
            "alice@example.com: sender is not permitted to send mail (403): ErrorAccessDenied",
            "bob@example.com: mail API rejected the request (400): ErrorInvalidRecipients",
        ]
    );
}

#[tokio::test]
async fn test_graph_token_failure_fails_batch_without_sending() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&mock_server)
        .await;

    let requests = vec![
        DeliveryRequest::new(Recipient::new("nopin").with_email("nopin@example.com")),
        request("alice"),
        request("bob"),
    ];
    let result = create_orchestrator(&mock_server.uri())
        .deliver(&requests, CredentialKind::Pin, Some(&graph_settings()))
        .await
        .unwrap();

    assert_eq!(result.success, 0);
    assert_eq!(result.failed, 3);
    assert_eq!(result.errors[0], "nopin: no PIN value is available to send.");
    assert!(result.errors[1].starts_with("alice@example.com: token endpoint returned 401"));
    assert!(result.errors[2].starts_with("bob@example.com: token endpoint returned 401"));
}

#[tokio::test]
async fn test_graph_batch_without_valid_recipients_requests_no_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("mock-token"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let requests = vec![DeliveryRequest::new(Recipient::new("nomail")).with_pin_override("1")];
    let result = create_orchestrator(&mock_server.uri())
        .deliver(&requests, CredentialKind::Pin, Some(&graph_settings()))
        .await
        .unwrap();

    assert_eq!(result.success, 0);
    assert_eq!(result.failed, 1);
}

#[tokio::test]
async fn test_token_is_cached_across_batches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("mock-token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&mock_server)
        .await;

    let orchestrator = create_orchestrator(&mock_server.uri());
    let settings = graph_settings();
    for user in ["alice", "bob"] {
        let result = orchestrator
            .deliver(&[request(user)], CredentialKind::Pin, Some(&settings))
            .await
            .unwrap();
        assert_eq!(result.success, 1);
    }
}

#[tokio::test]
async fn test_token_provider_rerequests_for_other_credentials() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_id=first"))
        .respond_with(token_response("first-token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_id=second"))
        .respond_with(token_response("second-token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let provider = TokenProvider::new(reqwest::Client::new(), &config);
    let secret = SecretString::from("s");

    let first = provider.get_token("tenant-id", "first", &secret).await.unwrap();
    let again = provider.get_token("tenant-id", "first", &secret).await.unwrap();
    let second = provider.get_token("tenant-id", "second", &secret).await.unwrap();

    assert_eq!(first.expose_secret(), "first-token");
    assert_eq!(again.expose_secret(), "first-token");
    assert_eq!(second.expose_secret(), "second-token");
}

#[tokio::test]
async fn test_token_inside_expiry_margin_is_not_reused() {
    let mock_server = MockServer::start().await;

    // 30s lifetime is already inside the default 60s margin.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "short-lived",
            "expires_in": 30
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let provider = TokenProvider::new(reqwest::Client::new(), &config);
    let secret = SecretString::from("s");

    provider.get_token("tenant-id", "client-id", &secret).await.unwrap();
    provider.get_token("tenant-id", "client-id", &secret).await.unwrap();
}

#[tokio::test]
async fn test_token_rejection_is_not_cached_and_body_is_truncated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("x".repeat(500)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let provider = TokenProvider::new(reqwest::Client::new(), &config);

    let err = provider
        .get_token("tenant-id", "client-id", &SecretString::from("s"))
        .await
        .unwrap_err();

    match err {
        AuthError::TokenRejected { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body.chars().count(), 181);
        }
        other => panic!("expected TokenRejected, got {other:?}"),
    }
    assert!(!provider.is_cached().await);
}

#[tokio::test]
async fn test_token_response_without_access_token_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "expires_in": 3600 })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let provider = TokenProvider::new(reqwest::Client::new(), &config);

    let err = provider
        .get_token("tenant-id", "client-id", &SecretString::from("s"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidTokenResponse(_)));
    assert!(!provider.is_cached().await);
}

#[tokio::test]
async fn test_token_with_out_of_range_lifetime_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "far-future",
            "expires_in": 100_000_000_000_000_i64
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let provider = TokenProvider::new(reqwest::Client::new(), &config);

    let err = provider
        .get_token("tenant-id", "client-id", &SecretString::from("s"))
        .await
        .unwrap_err();
    match err {
        AuthError::InvalidTokenResponse(message) => {
            assert!(message.contains("100000000000000"));
        }
        other => panic!("expected InvalidTokenResponse, got {other:?}"),
    }
    assert!(!provider.is_cached().await);
}

#[tokio::test]
async fn test_graph_out_of_range_token_lifetime_fails_batch_without_sending() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "far-future",
            "expires_in": i64::MAX
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = create_orchestrator(&mock_server.uri())
        .deliver(
            &[request("alice"), request("bob")],
            CredentialKind::Pin,
            Some(&graph_settings()),
        )
        .await
        .unwrap();

    assert_eq!(result.success, 0);
    assert_eq!(result.failed, 2);
    assert!(
        result
            .errors
            .iter()
            .all(|e| e.contains("unable to parse token response"))
    );
}

#[tokio::test]
async fn test_graph_transport_failure_is_not_retried_and_batch_continues() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("mock-token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Answers after the client has already given up.
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_string_contains("alice@example.com"))
        .respond_with(ResponseTemplate::new(202).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_string_contains("bob@example.com"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let tokens = Arc::new(TokenProvider::new(http_client.clone(), &config));
    let orchestrator =
        DeliveryOrchestrator::new(config, http_client, tokens, Arc::new(SystemLauncher::new()));

    let requests = vec![request("alice"), request("bob")];
    let result = orchestrator
        .deliver(&requests, CredentialKind::Pin, Some(&graph_settings()))
        .await
        .unwrap();

    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.total(), requests.len());
    assert_eq!(result.errors.len(), 1);
    assert!(
        result.errors[0].starts_with("alice@example.com: failed to send email ("),
        "unexpected error: {}",
        result.errors[0]
    );
}
