//! Notification endpoint tests

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use telemetry_qa::analytics::anomaly::Algorithm;
use telemetry_qa::broker::{RecordingSink, StaticHistory};
use telemetry_qa::config::{AnalysisDefinition, QaConfig};
use telemetry_qa::http_server::NotificationServer;
use telemetry_qa::ingest::Orchestrator;
use telemetry_qa::monitoring::LastSeenRegistry;
use tower::ServiceExt;

const SUBSCRIPTION: &str = "urn:ngsi-ld:Subscription:hampel_anomaly_detection_1";

fn server() -> (NotificationServer, Arc<RecordingSink>) {
    let config = QaConfig {
        analysis: vec![AnalysisDefinition {
            subscription_id: SUBSCRIPTION.to_string(),
            algorithm: Algorithm::Hampel,
            entity_type: "Dock".to_string(),
            analyzed_properties: vec!["waterLevel".to_string()],
            not_corrected_properties: vec![],
            anomaly_type_id: "A2".to_string(),
            entity_ids: None,
        }],
        ..QaConfig::default()
    };

    let sink = Arc::new(RecordingSink::new());
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(StaticHistory::new()),
        sink.clone(),
        Arc::new(LastSeenRegistry::new()),
    );
    (NotificationServer::new(Arc::new(orchestrator)), sink)
}

fn post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn notification(subscription_id: &str) -> String {
    json!({
        "id": "urn:ngsi-ld:Notification:42",
        "type": "Notification",
        "subscriptionId": subscription_id,
        "notifiedAt": "2024-03-01T10:00:01Z",
        "data": [{
            "id": "urn:ngsi-ld:AquaSpice:Dock:D7",
            "type": "Dock",
            "waterLevel": {"type": "Property", "value": 2.4, "observedAt": "2024-03-01T10:00:00Z"}
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_notify_acknowledges_and_processes() {
    let (server, sink) = server();

    for uri in ["/notify", "/"] {
        let response = server
            .router()
            .oneshot(post(uri, notification(SUBSCRIPTION)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"isError": false, "message": "Success", "statusCode": 200})
        );
    }

    let docs = sink.of_type("DockCorrected").await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["id"], "urn:ngsi-ld:AquaSpice:DockCorrected:D7");
    assert_eq!(docs[0]["waterLevelCorrected"]["value"], 2.4);
}

#[tokio::test]
async fn test_unknown_subscription_still_acknowledged() {
    let (server, sink) = server();

    let response = server
        .router()
        .oneshot(post("/notify", notification("urn:ngsi-ld:Subscription:nope")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["isError"], false);
    assert!(sink.documents().await.is_empty());
}

#[tokio::test]
async fn test_malformed_reading_does_not_drop_batch() {
    let (server, sink) = server();

    let body = json!({
        "id": "urn:ngsi-ld:Notification:43",
        "type": "Notification",
        "subscriptionId": SUBSCRIPTION,
        "data": [
            {
                "id": "urn:ngsi-ld:AquaSpice:Dock:D7",
                "type": "Dock",
                "waterLevel": {"type": "Property", "value": 2.4, "observedAt": "2024-03-01T10:00:00Z"}
            },
            {
                "id": "urn:ngsi-ld:AquaSpice:Dock:D8",
                "waterLevel": {"type": "Property", "value": 3.1, "observedAt": "2024-03-01T10:00:00Z"}
            }
        ]
    })
    .to_string();

    let response = server.router().oneshot(post("/notify", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["isError"], false);

    let docs = sink.of_type("DockCorrected").await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], "urn:ngsi-ld:AquaSpice:DockCorrected:D7");
}

#[tokio::test]
async fn test_unparsable_body_is_rejected() {
    let (server, _) = server();

    let response = server
        .router()
        .oneshot(post("/notify", "{not json".to_string()))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_health() {
    let (server, _) = server();

    let response = server
        .router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "alive");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
