//! Client registration, token acquisition and key set fetching against a stubbed
//! identity provider.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{TestKey, claims_for, jwks_json, settings};
use mcp_auth_gateway::services::auth::jwks::RemoteJwks;
use mcp_auth_gateway::services::auth::{BearerToken, TokenVerifier, VerifyError};
use mcp_auth_gateway::services::oauth::{
    ClientRegistration, ClientSession, CredentialRegistrar, CredentialStore, RealmEndpoints,
    RegistrationError, RegistrationSource, TokenAcquirer, TokenAcquisitionError,
};

const DCR_PATH: &str = "/realms/mcp/clients-registrations/openid-connect";
const TOKEN_PATH: &str = "/realms/mcp/protocol/openid-connect/token";
const CERTS_PATH: &str = "/realms/mcp/protocol/openid-connect/certs";

fn endpoints(server: &MockServer) -> RealmEndpoints {
    RealmEndpoints::new(&format!("{}/realms/mcp", server.uri())).unwrap()
}

fn registration() -> ClientRegistration {
    ClientRegistration::from_parts("gw-client", "gw-secret")
}

fn token_body(expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": "issued-access-token",
        "token_type": "Bearer",
        "expires_in": expires_in,
        "scope": "openid mcp:access",
    })
}

fn session(server: &MockServer, margin_secs: i64) -> ClientSession {
    ClientSession::new(
        registration(),
        TokenAcquirer::new(reqwest::Client::new(), endpoints(server)),
        chrono::Duration::seconds(margin_secs),
    )
}

// ---------------------------------------------------------------------------
// Credential registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dcr_registers_a_client_credentials_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DCR_PATH))
        .and(body_partial_json(json!({
            "grant_types": ["client_credentials"],
            "token_endpoint_auth_method": "client_secret_basic",
        })))
        .and(body_string_contains("\"client_name\":\"mcp-gateway-"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "client_id": "generated-id",
            "client_secret": "generated-secret",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registrar = CredentialRegistrar::new(reqwest::Client::new(), endpoints(&server));
    let reg = registrar.register("mcp-gateway").await.unwrap();

    assert_eq!(reg.client_id, "generated-id");
    assert_eq!(reg.client_secret.expose(), "generated-secret");
    assert!(!format!("{:?}", reg).contains("generated-secret"));
}

#[tokio::test]
async fn dcr_rejection_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DCR_PATH))
        .respond_with(
            ResponseTemplate::new(403).set_body_string("{\"error\":\"insufficient_scope\"}"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let registrar = CredentialRegistrar::new(reqwest::Client::new(), endpoints(&server));
    let err = registrar.register("mcp-gateway").await.unwrap_err();

    match err {
        RegistrationError::Rejected { status, body, .. } => {
            assert_eq!(status, 403);
            assert!(body.contains("insufficient_scope"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn bootstrap_prefers_configured_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DCR_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let registrar = CredentialRegistrar::new(reqwest::Client::new(), endpoints(&server));
    let acquirer = TokenAcquirer::new(reqwest::Client::new(), endpoints(&server));

    let session = ClientSession::bootstrap(
        RegistrationSource::Configured(registration()),
        &registrar,
        acquirer.clone(),
        chrono::Duration::seconds(60),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(session.registration().client_id, "gw-client");

    let disabled = ClientSession::bootstrap(
        RegistrationSource::Disabled,
        &registrar,
        acquirer,
        chrono::Duration::seconds(60),
    )
    .await
    .unwrap();
    assert!(disabled.is_none());
}

#[tokio::test]
async fn bootstrap_registration_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DCR_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let registrar = CredentialRegistrar::new(reqwest::Client::new(), endpoints(&server));
    let acquirer = TokenAcquirer::new(reqwest::Client::new(), endpoints(&server));

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("client.json"));

    let result = ClientSession::bootstrap(
        RegistrationSource::Register {
            client_name_prefix: "mcp-gateway".to_string(),
            store: store.clone(),
        },
        &registrar,
        acquirer,
        chrono::Duration::seconds(60),
    )
    .await;

    assert!(matches!(result, Err(RegistrationError::Rejected { status: 500, .. })));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn startup_registration_is_persisted_and_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DCR_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "client_id": "registered-client",
            "client_secret": "registered-secret",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registrar = CredentialRegistrar::new(reqwest::Client::new(), endpoints(&server));
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("client.json"));

    // Two process starts against the same file register exactly once.
    for _ in 0..2 {
        let session = ClientSession::bootstrap(
            RegistrationSource::Register {
                client_name_prefix: "mcp-gateway".to_string(),
                store: store.clone(),
            },
            &registrar,
            TokenAcquirer::new(reqwest::Client::new(), endpoints(&server)),
            chrono::Duration::seconds(60),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(session.registration().client_id, "registered-client");
        assert_eq!(session.registration().client_secret.expose(), "registered-secret");
    }

    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.client_secret.expose(), "registered-secret");
}

// ---------------------------------------------------------------------------
// Token acquisition
// ---------------------------------------------------------------------------

#[tokio::test]
async fn token_request_is_form_encoded_client_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=gw-client"))
        .and(body_string_contains("client_secret=gw-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(300)))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = TokenAcquirer::new(reqwest::Client::new(), endpoints(&server));
    let token = acquirer.request_token(&registration()).await.unwrap();

    assert_eq!(token.token.as_str(), "issued-access-token");
    assert!(token.scopes.contains("mcp:access"));
    assert!(!token.needs_refresh(chrono::Duration::seconds(60)));
}

#[tokio::test]
async fn token_rejection_is_an_error_not_an_empty_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"invalid_client\"}"))
        .expect(2)
        .mount(&server)
        .await;

    let session = session(&server, 60);

    for _ in 0..2 {
        match session.access_token().await {
            Err(TokenAcquisitionError::Rejected { status, body, .. }) => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body(3600))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(session(&server, 60));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.access_token().await })
        })
        .collect();

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.token.as_str(), "issued-access-token");
    }
}

#[tokio::test]
async fn fresh_token_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(3600)))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, 60);
    session.access_token().await.unwrap();
    session.access_token().await.unwrap();
}

#[tokio::test]
async fn token_inside_refresh_margin_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(30)))
        .expect(2)
        .mount(&server)
        .await;

    // 30s lifetime, 60s margin: stale as soon as it arrives.
    let session = session(&server, 60);
    session.access_token().await.unwrap();
    session.access_token().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failed_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("provider down")
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(session(&server, 60));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.access_token().await })
        })
        .collect();

    for handle in handles {
        match handle.await.unwrap() {
            Err(TokenAcquisitionError::Rejected { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_short_lived_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body(30))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Lifetime below the margin: every cached read is stale, yet waiters still coalesce.
    let session = Arc::new(session(&server, 60));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.access_token().await })
        })
        .collect();

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.token.as_str(), "issued-access-token");
    }
}

// ---------------------------------------------------------------------------
// Published key set
// ---------------------------------------------------------------------------

fn remote_verifier(server: &MockServer, min_refetch: Duration) -> TokenVerifier {
    let keys = RemoteJwks::new(
        reqwest::Client::new(),
        format!("{}{}", server.uri(), CERTS_PATH),
        Duration::from_secs(300),
    )
    .with_min_refetch_interval(min_refetch);
    TokenVerifier::new(Arc::new(keys), settings())
}

#[tokio::test]
async fn key_set_is_fetched_once_within_ttl() {
    let key = TestKey::new(7, "k1");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&key])))
        .expect(1)
        .mount(&server)
        .await;

    let verifier = remote_verifier(&server, Duration::from_secs(10));
    for user in ["alice", "bob", "carol", "dave", "erin"] {
        let token = BearerToken::new(key.sign(&claims_for(user)));
        assert_eq!(verifier.verify(&token).await.unwrap().principal_id, user);
    }
}

#[tokio::test]
async fn unknown_kid_triggers_one_refetch_for_rotation() {
    let old = TestKey::new(7, "k1");
    let new = TestKey::new(8, "k2");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&old])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&old, &new])))
        .expect(1)
        .mount(&server)
        .await;

    let verifier = remote_verifier(&server, Duration::ZERO);

    let first = BearerToken::new(old.sign(&claims_for("alice")));
    verifier.verify(&first).await.unwrap();

    let rotated = BearerToken::new(new.sign(&claims_for("bob")));
    assert_eq!(verifier.verify(&rotated).await.unwrap().principal_id, "bob");
}

#[tokio::test]
async fn unknown_kid_refetch_is_rate_limited() {
    let key = TestKey::new(7, "k1");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&key])))
        .expect(1)
        .mount(&server)
        .await;

    let verifier = remote_verifier(&server, Duration::from_secs(60));
    verifier
        .verify(&BearerToken::new(key.sign(&claims_for("alice"))))
        .await
        .unwrap();

    for i in 0..5 {
        let bogus = BearerToken::new(key.sign_with_kid(&claims_for("x"), &format!("bogus-{i}")));
        let err = verifier.verify(&bogus).await.unwrap_err();
        assert!(matches!(err, VerifyError::UnknownKey));
    }
}

#[tokio::test]
async fn key_set_outage_fails_closed() {
    let key = TestKey::new(7, "k1");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let verifier = remote_verifier(&server, Duration::from_secs(10));
    let err = verifier
        .verify(&BearerToken::new(key.sign(&claims_for("alice"))))
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::KeySetUnavailable(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_verifies_share_one_failed_key_fetch() {
    let key = TestKey::new(7, "k1");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let verifier = Arc::new(remote_verifier(&server, Duration::from_secs(10)));
    let token = BearerToken::new(key.sign(&claims_for("alice")));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let verifier = verifier.clone();
            let token = token.clone();
            tokio::spawn(async move { verifier.verify(&token).await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, VerifyError::KeySetUnavailable(_)), "{err:?}");
    }
}

#[tokio::test]
async fn failed_key_fetch_is_not_retried_inside_the_refetch_interval() {
    let key = TestKey::new(7, "k1");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let verifier = remote_verifier(&server, Duration::from_secs(60));
    for user in ["alice", "bob", "carol"] {
        let err = verifier
            .verify(&BearerToken::new(key.sign(&claims_for(user))))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::KeySetUnavailable(_)), "{err:?}");
    }
}
