//! Router-level tests over a scripted upstream.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use possync_engine::{
    Clock, GatewayCall, ManualClock, MockGateway, ReconcileConfig, Reconciler, UpstreamGateway,
};
use possync_server::{router, HandlerContext, RequestHandler, ServerConfig, SharedReconciler};
use possync_staging::{MemoryStagingStore, StagingStore};
use possync_testkit::{fixture_time, lapaz_submission, submission_body};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct App {
    router: Router,
    gateway: Arc<MockGateway>,
    store: Arc<MemoryStagingStore>,
    reconciler: Arc<SharedReconciler>,
}

fn app(config: ServerConfig) -> App {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStagingStore::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(fixture_time()));
    let reconciler: Arc<SharedReconciler> = Arc::new(Reconciler::with_clock(
        ReconcileConfig::default(),
        Arc::clone(&gateway) as Arc<dyn UpstreamGateway>,
        Arc::clone(&store) as Arc<dyn StagingStore>,
        Arc::clone(&clock),
    ));
    let context = HandlerContext::with_clock(config, Arc::clone(&reconciler), clock);
    let handler = Arc::new(RequestHandler::new(Arc::new(context)));
    App {
        router: router(handler),
        gateway,
        store,
        reconciler,
    }
}

fn offline_app() -> App {
    app(ServerConfig::default().with_inline_sync(false))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

#[tokio::test]
async fn health_and_welcome() {
    let app = offline_app();
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));

    let (status, body) = send(&app.router, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("Welcome"));

    let (_, body) = send(&app.router, "GET", "/api/server-time", None).await;
    assert_eq!(body["datetime"], "2024-03-01T08:30:00Z");
}

#[tokio::test]
async fn lapaz_submission_staged_then_reconciled() {
    let app = offline_app();

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/sync-transactions",
        Some(lapaz_submission()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transactionId"], "LAPAZ1001");
    assert_eq!(body["store"], "LAPAZ");
    assert_eq!(body["lines"], 2);
    assert_eq!(body["outcome"], "inserted");
    assert_eq!(body["syncState"], "PENDING");
    assert!(app.gateway.calls().is_empty());

    let (status, body) = send(&app.router, "GET", "/api/pending-transactions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["transactions"][0]["pendingLines"], 2);

    let (status, body) = send(&app.router, "POST", "/api/sync-transactions/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcomes"][0]["outcome"], "pushed");
    assert_eq!(body["outcomes"][0]["linesSynced"], 2);

    let (status, body) = send(&app.router, "GET", "/api/sync-status/LAPAZ1001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["syncState"], "SYNCED");
    assert_eq!(body["fullySynced"], true);
    assert_eq!(body["reconcileState"], "synced");
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);

    assert_eq!(
        app.gateway.calls(),
        vec![
            GatewayCall::Exists("LAPAZ1001".into()),
            GatewayCall::CreateTransaction("LAPAZ1001".into()),
            GatewayCall::CreateLine("LAPAZ1001".into(), 1),
            GatewayCall::CreateLine("LAPAZ1001".into(), 2),
        ]
    );
}

#[tokio::test]
async fn inline_sync_pushes_after_answering() {
    let app = app(ServerConfig::default());
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/sync-transactions",
        Some(submission_body("makati", "77", &[1, 2])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut synced = false;
    for _ in 0..200 {
        if app
            .store
            .get("MAKATI77")
            .is_some_and(|record| record.is_fully_synced())
        {
            synced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(synced);
    assert_eq!(
        app.gateway
            .count(&GatewayCall::CreateTransaction("MAKATI77".into())),
        1
    );
}

#[tokio::test]
async fn malformed_submissions_are_rejected() {
    let app = offline_app();

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/sync-transactions",
        Some(json!({ "transactionSummary": { "store": "lapaz" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid transaction data");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("transactionRecords"));

    let request = Request::builder()
        .method("POST")
        .uri("/api/sync-transactions")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = submission_body("lapaz", "5", &[1]);
    body["transactionRecords"][0]["price"] = json!("twelve");
    let (status, body) = send(&app.router, "POST", "/api/sync-transactions", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("price"));

    assert!(app.store.is_empty());
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let app = app(
        ServerConfig::default()
            .with_inline_sync(false)
            .with_max_body_bytes(64),
    );
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/sync-transactions",
        Some(lapaz_submission()),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn unknown_status_is_404() {
    let app = offline_app();
    let (status, body) = send(&app.router, "GET", "/api/sync-status/LAPAZ404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn reconcile_conflicts_with_running_cycle() {
    let app = offline_app();
    app.gateway.set_latency(Duration::from_millis(300));
    app.store
        .upsert(possync_testkit::staged("lapaz", "1", &[1]))
        .unwrap();

    let reconciler = Arc::clone(&app.reconciler);
    let running = std::thread::spawn(move || reconciler.run_cycle());
    while !app.reconciler.is_cycle_running() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let (status, body) = send(&app.router, "POST", "/api/sync-transactions/reconcile", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    assert_eq!(running.join().unwrap().synced(), 1);
}

#[tokio::test]
async fn refund_is_forwarded_upstream() {
    let app = offline_app();
    app.gateway.set_existing("LAPAZ1001");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/transaction-refund/lapaz/12",
        Some(json!({
            "transactionid": "LAPAZ1001",
            "items": [{ "lineNum": 2, "netamount": "25", "grossamount": "25", "taxamount": "2.68" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refundReceiptId"], "RF12-LAPAZ-20240301");
    assert_eq!(body["summary"]["totalRefundAmount"], "25.00");
    assert_eq!(body["summary"]["totalRefundTax"], "2.68");
    assert_eq!(
        app.gateway.calls(),
        vec![
            GatewayCall::UpdateTransaction("LAPAZ1001".into()),
            GatewayCall::UpdateLine("LAPAZ1001".into(), 2),
        ]
    );
}

#[tokio::test]
async fn refund_upstream_failures_map_to_gateway_errors() {
    let app = offline_app();
    let refund = json!({ "transactionid": "LAPAZ9", "items": [{ "linenum": 1 }] });

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/transaction-refund/lapaz/1",
        Some(refund.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    app.gateway.set_offline(true);
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/transaction-refund/lapaz/1",
        Some(refund),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Upstream request failed");

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/transaction-refund/lapaz/1",
        Some(json!({ "items": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn z_report_assigns_locally_and_upstream() {
    let app = offline_app();
    send(
        &app.router,
        "POST",
        "/api/sync-transactions",
        Some(lapaz_submission()),
    )
    .await;

    let (status, body) = send(&app.router, "POST", "/api/rbotransactiontables/lapaz/Z7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["storeId"], "LAPAZ");
    assert_eq!(body["updatedLocally"], 1);
    assert_eq!(body["localOnly"], false);
    assert_eq!(
        app.store
            .get("LAPAZ1001")
            .unwrap()
            .transaction
            .z_report_id(),
        Some("Z7")
    );
    assert_eq!(
        app.gateway
            .count(&GatewayCall::AssignZReport("LAPAZ".into(), "Z7".into())),
        1
    );
}
