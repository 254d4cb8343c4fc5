//! API behavior driven through the router: auth status codes, endpoint
//! validation and per-user scoping, and the metrics projection.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::sync::{mpsc, oneshot};
use tower::ServiceExt;

use vpsmon::conn::{ConnEvent, Dialer, Endpoint};
use vpsmon::db::Db;
use vpsmon::http::{self, ApiState};
use vpsmon::manager::Manager;

/// Accepts every dial and never produces transport events, so read-model
/// entries stay exactly where the manager put them.
struct NullDialer;

impl Dialer for NullDialer {
    fn spawn(
        &self,
        _endpoint: Endpoint,
        _gen: u64,
        _events: mpsc::UnboundedSender<ConnEvent>,
        _shutdown: oneshot::Receiver<()>,
    ) {
    }
}

async fn setup() -> (Router, Db, TempDir) {
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path().join("test.db").to_str().unwrap())
        .await
        .unwrap();
    db.migrate().await.unwrap();
    let manager = Manager::spawn(Arc::new(NullDialer));
    let app = http::router(ApiState {
        db: db.clone(),
        manager,
    });
    (app, db, dir)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut b = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    match body {
        Some(v) => b
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => b.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// Register a user through the API and return their session token.
async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": username, "password": "hunter22" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn add_endpoint(app: &Router, token: &str, name: &str, address: &str) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/endpoints",
            Some(token),
            Some(json!({ "name": name, "address": address })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn register_validates_credentials() {
    let (app, _db, _dir) = setup().await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "short" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "   ", "password": "hunter22" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_username_is_conflict() {
    let (app, _db, _dir) = setup().await;
    register(&app, "alice").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "hunter22" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already taken");
}

#[tokio::test]
async fn login_and_logout_lifecycle() {
    let (app, _db, _dir) = setup().await;
    register(&app, "alice").await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong-pass" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "hunter22" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 64);

    let (status, _) = send(&app, request("POST", "/api/auth/logout", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);

    // A logged-out token no longer authenticates.
    let (status, _) = send(&app, request("GET", "/api/endpoints", Some(&token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requests_without_valid_bearer_are_unauthorized() {
    let (app, db, _dir) = setup().await;

    let (status, _) = send(&app, request("GET", "/api/endpoints", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request("GET", "/api/metrics", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // An expired session is as good as no session.
    let alice = db.create_user("alice", "x$y").await.unwrap();
    db.create_session("tok-dead", alice, Utc::now().timestamp() - 60)
        .await
        .unwrap();
    let (status, _) = send(&app, request("GET", "/api/endpoints", Some("tok-dead"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn endpoint_address_must_be_ws_or_wss() {
    let (app, _db, _dir) = setup().await;
    let token = register(&app, "alice").await;

    for bad in ["not a url", "http://10.0.0.1:9000/ws", "ftp://10.0.0.1/x"] {
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/endpoints",
                Some(&token),
                Some(json!({ "name": "web-1", "address": bad })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {bad}");
    }

    let row = add_endpoint(&app, &token, "web-1", "ws://10.0.0.1:9000/ws").await;
    assert_eq!(row["name"], "web-1");
    assert_eq!(row["address"], "ws://10.0.0.1:9000/ws");

    let (status, body) = send(&app, request("GET", "/api/endpoints", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delete_is_scoped_to_owner() {
    let (app, _db, _dir) = setup().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let row = add_endpoint(&app, &alice, "web-1", "ws://10.0.0.1:9000/ws").await;
    let uri = format!("/api/endpoints/{}", row["id"]);

    let (status, _) = send(&app, request("DELETE", &uri, Some(&bob), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request("DELETE", &uri, Some(&alice), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", "/api/endpoints", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn metrics_are_scoped_and_report_connecting() {
    let (app, db, _dir) = setup().await;
    let alice_tok = register(&app, "alice").await;
    let bob_tok = register(&app, "bob").await;

    // Alice's row goes straight into storage, so the manager has never been
    // told about it and the read model has no view for it yet.
    let alice = db.user_by_name("alice").await.unwrap().unwrap();
    db.insert_endpoint(alice.id, "web-1", "ws://10.0.0.1:9000/ws")
        .await
        .unwrap();
    add_endpoint(&app, &bob_tok, "db-1", "ws://10.0.1.1:9000/ws").await;

    let (status, body) = send(&app, request("GET", "/api/metrics", Some(&alice_tok), None)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "web-1");
    assert_eq!(entries[0]["status"], "connecting");
    assert!(entries[0]["sample"].is_null());
    assert!(entries[0]["display"].is_null());
    assert!(entries[0]["last_update"].is_null());

    let (status, body) = send(&app, request("GET", "/api/metrics", Some(&bob_tok), None)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "db-1");
}
