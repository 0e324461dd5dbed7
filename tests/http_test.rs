mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode, header};
use common::*;
use novalnet_bridge::application::engine::{EngineSettings, ReconciliationEngine};
use novalnet_bridge::application::requests::{Customer, PaymentRequest};
use novalnet_bridge::domain::ledger::LedgerDraft;
use novalnet_bridge::domain::money::MinorUnits;
use novalnet_bridge::domain::ports::Endpoint;
use novalnet_bridge::interfaces::http::{RETURN_PATH, STATUS_PATH, StatusView, WEBHOOK_PATH, router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

fn provider_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 44123))
}

/// Harness whose webhook host resolves to the loopback address.
fn loopback_harness(allow_manual_testing: bool) -> Harness {
    harness_with(EngineSettings {
        webhook_host: "127.0.0.1".into(),
        allow_manual_testing,
        ..Default::default()
    })
}

fn app_from(engine: Arc<ReconciliationEngine>, source: SocketAddr) -> Router {
    router(engine).layer(MockConnectInfo(source))
}

fn post_json(body: &Value) -> Request<Body> {
    Request::post(WEBHOOK_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_webhook_then_status_page() {
    let h = loopback_harness(false);
    h.settled("CONFIRMED", "CREDITCARD").await;
    let app = app_from(Arc::new(h.engine), provider_addr());

    let response = app
        .clone()
        .oneshot(post_json(&webhook(
            "TRANSACTION_REFUND",
            "T2",
            json!({"refund": {"amount": 250}}),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.is_empty());

    let response = app
        .oneshot(
            Request::get(format!("{STATUS_PATH}?reference={REFERENCE}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view: StatusView = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(view.reference, REFERENCE);
    assert_eq!(view.state, "done");
    assert_eq!(view.paid_amount, 1000);
    assert_eq!(view.children.len(), 1);
    assert_eq!(view.children[0].provider_reference.as_deref(), Some("T2"));
    assert_eq!(view.children[0].amount, -250);
}

#[tokio::test]
async fn test_malformed_webhook_is_a_bad_request() {
    let h = loopback_harness(false);
    h.draft().await;
    let app = app_from(Arc::new(h.engine), provider_addr());

    let mut body = webhook("CREDIT", "T2", json!({}));
    body.as_object_mut().unwrap().remove("result");
    let response = app.clone().oneshot(post_json(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(error["error"].as_str().unwrap().starts_with("Malformed notification"));

    let response = app
        .oneshot(
            Request::post(WEBHOOK_PATH)
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_from_foreign_address_is_forbidden() {
    let h = loopback_harness(false);
    h.settled("CONFIRMED", "CREDITCARD").await;
    let engine = Arc::new(h.engine);
    let app = app_from(engine.clone(), SocketAddr::from(([203, 0, 113, 7], 5000)));

    let response = app
        .oneshot(post_json(&webhook(
            "TRANSACTION_REFUND",
            "T2",
            json!({"refund": {"amount": 250}}),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(error["error"], "Unauthorized request from IP 203.0.113.7");
    assert!(engine.callbacks(REFERENCE).await.unwrap().is_empty());
    assert!(engine.ledger(REFERENCE).await.unwrap().children.is_empty());
}

#[tokio::test]
async fn test_manual_testing_accepts_any_address() {
    let h = loopback_harness(true);
    h.settled("CONFIRMED", "CREDITCARD").await;
    let engine = Arc::new(h.engine);
    let app = app_from(engine.clone(), SocketAddr::from(([203, 0, 113, 7], 5000)));

    let response = app
        .oneshot(post_json(&webhook(
            "TRANSACTION_REFUND",
            "T2",
            json!({"refund": {"amount": 250}}),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(engine.ledger(REFERENCE).await.unwrap().children.len(), 1);
}

#[tokio::test]
async fn test_webhook_source_without_host_is_refused() {
    let h = harness();
    let err = h
        .engine
        .verify_webhook_source(provider_addr().ip())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unauthorized access: Missing Host or Received IP");
}

#[tokio::test]
async fn test_status_of_unknown_reference() {
    let app = router(Arc::new(harness().engine));
    let response = app
        .oneshot(
            Request::get(format!("{STATUS_PATH}?reference=missing"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_redirect_return_variants() {
    let h = harness();
    h.draft().await;
    let app = router(Arc::new(h.engine));

    let response = app
        .clone()
        .oneshot(
            Request::get(format!(
                "{RETURN_PATH}?status=FAILURE&status_text=Payment%20aborted&status_code=0"
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Payment aborted");

    let response = app
        .clone()
        .oneshot(
            Request::get(format!(
                "{RETURN_PATH}?status=SUCCESS&status_text=ok&status_code=100&tid=1&txn_secret=unknown&checksum=x"
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Could not find the transaction");

    let response = app
        .oneshot(
            Request::get(format!("{RETURN_PATH}?status=SUCCESS"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await,
        "Unknown error occured please try after some time"
    );
}

#[tokio::test]
async fn test_completed_redirect_goes_to_status_page() {
    let h = harness();
    h.engine
        .create_ledger(LedgerDraft::new("SO 1/2", MinorUnits(1000), "EUR"))
        .await
        .unwrap();
    h.gateway.reply(
        Endpoint::SeamlessPayment,
        json!({
            "result": {"status": "SUCCESS", "status_code": 100, "redirect_url": "https://hpp.example/1"},
            "transaction": {"txn_secret": "s3cr3t"}
        }),
    );
    h.engine
        .hosted_payment_page("SO 1/2", &PaymentRequest::new("", Customer::default()))
        .await
        .unwrap();
    h.gateway.reply(
        Endpoint::TransactionDetails,
        details(PARENT_TID, "CONFIRMED", 100, "IDEAL", 1000),
    );
    let app = router(Arc::new(h.engine));

    let response = app
        .oneshot(
            Request::get(format!(
                "{RETURN_PATH}?status=SUCCESS&status_text=ok&status_code=100&tid={PARENT_TID}&txn_secret=s3cr3t&checksum=x"
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/payment/status?reference=SO+1%2F2"
    );
}
