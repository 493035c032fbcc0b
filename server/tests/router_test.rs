mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use common::{acme, build_chain, secret, xpub, Harness};
use identity_oracle::app_state::AppState;
use identity_oracle::keys::{ExtendedKeys, OracleKey};
use identity_oracle::oracle::sighash;
use identity_oracle::routes;

fn app(h: &Harness) -> Router {
    routes::router(AppState::new(
        h.oracle.clone(),
        h.tracker.clone(),
        CancellationToken::new(),
    ))
}

async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn reports_oracle_identity() {
    let h = Harness::new().await;
    let (status, body) = call(app(&h), Method::GET, "/oracle/id", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["data"]["public_key"],
        h.oracle.identity().public_key.to_string()
    );
}

#[tokio::test]
async fn health_reflects_header_window() {
    let ready = Harness::new().await;
    let (status, body) = call(app(&ready), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["headers"], "ready");

    let syncing = Harness::with_chain(build_chain(2)).await;
    let (status, body) = call(app(&syncing), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["headers"], "syncing");
    assert_eq!(body["data"]["database"], "up");
}

#[tokio::test]
async fn registers_and_finds_user_over_http() {
    let h = Harness::new().await;
    let key = OracleKey::new(secret(30));
    let signature = key.sign(&sighash::registration(&acme()));

    let (status, body) = call(
        app(&h),
        Method::POST,
        "/oracle/register",
        Some(json!({
            "entity": acme(),
            "public_key": key.public_key().to_string(),
            "signature": hex::encode(signature),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["approved"], true);
    let user_id: uuid::Uuid = serde_json::from_value(body["data"]["user_id"].clone()).unwrap();

    let xpubs = ExtendedKeys::single(xpub(31));
    let signature = key.sign(&sighash::add_key_set(&user_id, &xpubs, 1));
    let (status, _) = call(
        app(&h),
        Method::POST,
        "/oracle/addXPub",
        Some(json!({
            "user_id": user_id,
            "xpubs": xpubs.to_string(),
            "required_signers": 1,
            "signature": hex::encode(signature),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        app(&h),
        Method::POST,
        "/oracle/user",
        Some(json!({ "xpubs": xpubs.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], json!(user_id));
}

#[tokio::test]
async fn unknown_key_set_is_404() {
    let h = Harness::new().await;
    let (status, body) = call(
        app(&h),
        Method::POST,
        "/oracle/user",
        Some(json!({ "xpubs": ExtendedKeys::single(xpub(40)).to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn short_window_is_503() {
    let h = Harness::with_chain(build_chain(3)).await;
    let user = h.register_user(41, acme(), 1, 1).await;
    let (status, body) = call(
        app(&h),
        Method::POST,
        "/identity/verifyXPub",
        Some(json!({ "entity": acme(), "xpubs": user.xpubs.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn signed_attestation_carries_signature() {
    let h = Harness::new().await;
    let user = h.register_user(42, acme(), 1, 1).await;
    let (status, body) = call(
        app(&h),
        Method::POST,
        "/identity/verifyPubKey",
        Some(json!({
            "entity": { "name": "Acme Pty Ltd" },
            "xpub": user.xpubs.to_string(),
            "index": 2,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["approved"], true);
    assert_eq!(data["algorithm"], 1);
    assert_eq!(data["block_height"], h.sig_block().1);
    assert!(data["signature"].as_str().is_some_and(|sig| !sig.is_empty()));
    assert!(data.get("status").is_none());
}

#[tokio::test]
async fn approver_rejection_is_a_normal_response() {
    let h = Harness::new().await;
    let user = h.register_user(43, acme(), 1, 1).await;
    h.approver.reject("pending review");

    let (status, body) = call(
        app(&h),
        Method::POST,
        "/identity/verifyXPub",
        Some(json!({ "entity": acme(), "xpubs": user.xpubs.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["approved"], false);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["description"], "pending review");
    assert!(body["data"].get("signature").is_none());
}

#[tokio::test]
async fn invalid_requests_are_refused() {
    let h = Harness::new().await;

    let (status, _) = call(
        app(&h),
        Method::POST,
        "/oracle/register",
        Some(json!({ "entity": acme(), "public_key": "02ab", "signature": "00".repeat(70) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(
        app(&h),
        Method::POST,
        "/identity/verifyAdmin",
        Some(json!({ "xpubs": ExtendedKeys::single(xpub(44)).to_string(), "index": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "invalid request: exactly one of entity and entity_contract is required"
    );

    let (status, _) = call(
        app(&h),
        Method::POST,
        "/identity/verifyAdmin",
        Some(json!({
            "xpubs": ExtendedKeys::single(xpub(44)).to_string(),
            "index": 0,
            "entity": acme(),
            "entity_contract": "not-an-address",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        app(&h),
        Method::POST,
        "/identity/verifyXPub",
        Some(json!({ "entity": acme(), "xpubs": "not-a-key" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
