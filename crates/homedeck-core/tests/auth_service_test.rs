// Auth flow tests against a wiremock designer server: busy gating, token
// persistence, refresh-in-place, and revoked-token suppression.

use std::sync::{Arc, Mutex};

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homedeck_core::{AuthService, DesignerClient, MessageSink, Session};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink(Mutex<Vec<String>>);

impl RecordingSink {
    fn messages(&self) -> Vec<String> {
        self.0.lock().expect("sink lock").clone()
    }
}

impl MessageSink for RecordingSink {
    fn error(&self, message: &str) {
        self.0.lock().expect("sink lock").push(message.to_owned());
    }
}

fn token_body() -> serde_json::Value {
    json!({
        "userName": "alice",
        "accessToken": "access-1",
        "accessTokenExpiry": "2026-08-06T12:00:00Z",
        "refreshToken": "refresh-1",
        "refreshTokenExpiry": "2026-09-06T12:00:00Z"
    })
}

struct Harness {
    server: MockServer,
    session: Arc<Session>,
    sink: Arc<RecordingSink>,
    auth: AuthService,
}

async fn setup(token_path: Option<std::path::PathBuf>) -> Harness {
    let server = MockServer::start().await;
    let api = Arc::new(
        DesignerClient::from_reqwest(&server.uri(), reqwest::Client::new()).expect("client"),
    );
    let session = Arc::new(Session::new(token_path));
    let sink = Arc::new(RecordingSink::default());
    let auth = AuthService::new(api, Arc::clone(&session), sink.clone());
    Harness {
        server,
        session,
        sink,
        auth,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_stores_and_persists_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let token_path = dir.path().join("token.json");
    let h = setup(Some(token_path.clone())).await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&h.server)
        .await;

    let token = h
        .auth
        .login("alice", &SecretString::from("hunter2".to_string()), true)
        .await
        .expect("no storage error")
        .expect("login succeeded");

    assert_eq!(token.user_name, "alice");
    assert!(token_path.exists());
    assert!(!h.session.is_busy());
}

#[tokio::test]
async fn failed_login_reports_and_returns_none() {
    let h = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([
            { "property": null, "errorMessage": "bad credentials" }
        ])))
        .mount(&h.server)
        .await;

    let result = h
        .auth
        .login("alice", &SecretString::from("wrong".to_string()), false)
        .await
        .expect("no storage error");

    assert!(result.is_none());
    assert!(h.session.access_token().is_none());
    assert_eq!(h.sink.messages(), vec!["POST failed. Error was: 'Unauthorized'."]);
    assert!(!h.session.is_busy());
}

#[tokio::test]
async fn refresh_swaps_access_token_in_place() {
    let h = setup(None).await;
    h.session
        .set_access_token(Some(serde_json::from_value(token_body()).expect("token")), false)
        .expect("set token");

    Mock::given(method("GET"))
        .and(path("/auth/refresh-token"))
        .and(header("authorization", "Bearer refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-2",
            "accessTokenExpiry": "2026-08-06T13:00:00Z"
        })))
        .mount(&h.server)
        .await;

    assert!(h.auth.refresh().await);

    let current = h.session.access_token().expect("token present");
    assert_eq!(current.access_token, "access-2");
    assert_eq!(current.refresh_token, "refresh-1");
    assert!(!h.session.is_busy());
}

#[tokio::test]
async fn revoked_refresh_token_is_suppressed_from_display() {
    let h = setup(None).await;
    h.session
        .set_access_token(Some(serde_json::from_value(token_body()).expect("token")), false)
        .expect("set token");

    Mock::given(method("GET"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([
            { "property": null, "errorMessage": "user token revoked" }
        ])))
        .mount(&h.server)
        .await;

    assert!(!h.auth.refresh().await);
    assert!(h.sink.messages().is_empty());
}

#[tokio::test]
async fn logout_clears_local_state_even_when_the_server_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let token_path = dir.path().join("token.json");
    let h = setup(Some(token_path.clone())).await;

    h.session
        .set_access_token(Some(serde_json::from_value(token_body()).expect("token")), true)
        .expect("set token");
    assert!(token_path.exists());

    Mock::given(method("GET"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!([
            { "property": null, "errorMessage": "boom" }
        ])))
        .mount(&h.server)
        .await;

    h.auth.logout().await.expect("logout");

    assert!(h.session.access_token().is_none());
    assert!(!token_path.exists());
    assert!(!h.session.is_busy());
}

#[tokio::test]
async fn stale_persisted_token_forces_local_logout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let token_path = dir.path().join("token.json");
    std::fs::write(
        &token_path,
        serde_json::to_string(&token_body()).expect("serialize"),
    )
    .expect("seed token file");

    let h = setup(Some(token_path.clone())).await;

    Mock::given(method("GET"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([
            { "property": null, "errorMessage": "user token revoked" }
        ])))
        .mount(&h.server)
        .await;

    h.auth.load_stored_token().await.expect("bootstrap");

    assert!(h.session.access_token().is_none());
    assert!(!token_path.exists(), "stale token file is cleared");
    assert!(!h.session.is_busy());
}

#[tokio::test]
async fn hub_token_failure_clears_and_yields_none() {
    let h = setup(None).await;
    h.session
        .set_access_token(Some(serde_json::from_value(token_body()).expect("token")), false)
        .expect("set token");

    Mock::given(method("GET"))
        .and(path("/auth/long-lived-token"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!([
            { "property": null, "errorMessage": "integration not configured" }
        ])))
        .mount(&h.server)
        .await;

    assert!(h.auth.hub_token().await.is_none());
    assert!(h.session.hub_token().is_none());
    assert!(!h.session.is_busy());
}

#[tokio::test]
async fn hub_token_success_is_stored() {
    let h = setup(None).await;
    h.session
        .set_access_token(Some(serde_json::from_value(token_body()).expect("token")), false)
        .expect("set token");

    Mock::given(method("GET"))
        .and(path("/auth/long-lived-token"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "hub-llt" })))
        .mount(&h.server)
        .await;

    assert_eq!(h.auth.hub_token().await.as_deref(), Some("hub-llt"));
    assert_eq!(h.session.hub_token().expect("stored").token, "hub-llt");
}
