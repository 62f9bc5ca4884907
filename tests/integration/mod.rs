//! Integration tests for the traffic service.
//!
//! Most tests run against the in-memory store and registry. Tests marked
//! `#[ignore]` need a live MongoDB reachable through MONGO_URI.
//! Run with: cargo test --test integration -- --ignored

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use mongodb::bson::{doc, Document};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use traffic_service::api::{create_router, AppState};
use traffic_service::config::StoreConfig;
use traffic_service::correlator::Correlator;
use traffic_service::error::OrchestratorError;
use traffic_service::orchestrator::{
    create_service, MemoryRegistry, RecordTarget, RetryPolicy, ServiceData, ServiceRegistry,
};
use traffic_service::store::{DocumentStore, MemoryStore, MongoStore};
use traffic_service::traffic::TrafficStatus;

fn flow(source: &str, destination: &str, status: &str) -> Document {
    doc! {
        "source_ip": source,
        "source_port": 50000,
        "destination_ip": destination,
        "destination_port": 443,
        "status": status,
    }
}

/// Three services and a mix of traffic in `netdb`.
fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(
        "netdb",
        "testcollectionA",
        vec![
            doc! { "name": "Gaming UI", "ip_address": "10.1.2.3", "listening_port": 443 },
            doc! { "name": "Matchmaker", "ip_address": "10.1.2.4", "listening_port": 7000 },
            doc! { "name": "Ledger", "ip_address": "10.1.2.5" },
        ],
    );
    store.seed(
        "netdb",
        "flows",
        vec![
            flow("10.1.2.3", "10.9.9.9", "OK"),
            flow("10.8.8.8", "10.1.2.3", "Warning"),
            flow("10.1.2.4", "10.9.9.9", "Critical"),
            flow("10.7.7.7", "10.6.6.6", "OK"),
        ],
    );
    store
}

fn app(store: MemoryStore) -> Router {
    let correlator = Correlator::new(Arc::new(store), "testcollectionA");
    create_router(
        AppState::new(correlator),
        &["http://localhost:3000".to_string()],
    )
}

fn traffic_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_traffic_service_end_to_end() {
    let response = app(seeded_store())
        .oneshot(traffic_request(
            "/TrafficService",
            r#"{"database":"netdb","networkCollection":"flows","serviceName":"Gaming UI"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let rows: Vec<serde_json::Value> = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0]["source_ip"], "10.1.2.3");
    assert_eq!(rows[0]["status"], "OK");
    assert_eq!(rows[0]["service_name"], "Gaming UI");
    assert_eq!(rows[0]["service_port"], 443);

    assert_eq!(rows[1]["destination_ip"], "10.1.2.3");
    assert_eq!(rows[1]["status"], "Warning");
}

#[tokio::test]
async fn test_service_without_traffic_returns_empty_array() {
    let response = app(seeded_store())
        .oneshot(traffic_request(
            "/TrafficService",
            r#"{"database":"netdb","networkCollection":"flows","serviceName":"Ledger"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "[]");
}

#[tokio::test]
async fn test_each_missing_field_is_named() {
    let cases = [
        (r#"{"networkCollection":"flows","serviceName":"x"}"#, "database"),
        (r#"{"database":"netdb","serviceName":"x"}"#, "networkCollection"),
        (r#"{"database":"netdb","networkCollection":"flows"}"#, "serviceName"),
        (
            r#"{"database":42,"networkCollection":"flows","serviceName":"x"}"#,
            "database",
        ),
    ];

    for (body, field) in cases {
        let response = app(seeded_store())
            .oneshot(traffic_request("/TrafficService", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_body(response).await,
            format!("Missing or invalid '{}' parameter", field)
        );
    }
}

#[tokio::test]
async fn test_body_fields_take_precedence_over_query() {
    let response = app(seeded_store())
        .oneshot(traffic_request(
            "/TrafficService?serviceName=Ledger",
            r#"{"database":"netdb","networkCollection":"flows","serviceName":"Gaming UI"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let rows: Vec<serde_json::Value> = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_unknown_service_reports_resolution_failure() {
    let response = app(seeded_store())
        .oneshot(traffic_request(
            "/TrafficService",
            r#"{"database":"netdb","networkCollection":"flows","serviceName":"Ghost"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = read_body(response).await;
    assert!(text.starts_with("Error running aggregation query"));
    assert!(text.contains("Ghost"));
}

#[tokio::test]
async fn test_get_is_not_routed_for_traffic() {
    let response = app(seeded_store())
        .oneshot(
            Request::builder()
                .uri("/TrafficService")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_every_row_touches_the_service() {
    let correlator = Correlator::new(Arc::new(seeded_store()), "testcollectionA");

    for name in ["Gaming UI", "Matchmaker", "Ledger"] {
        let ip = correlator.service_ip("netdb", name).await.unwrap();
        let rows = correlator
            .traffic_for_service("netdb", "flows", name)
            .await
            .unwrap();

        for row in &rows {
            assert!(row.source_ip == ip || row.destination_ip == ip);
            assert!(row.service_ip == row.source_ip || row.service_ip == row.destination_ip);
        }
    }
}

#[tokio::test]
async fn test_statuses_round_trip_through_rows() {
    let correlator = Correlator::new(Arc::new(seeded_store()), "testcollectionA");

    let rows = correlator
        .traffic_for_service("netdb", "flows", "Matchmaker")
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TrafficStatus::Critical);
    assert_eq!(rows[0].service_port, Some(7000));
}

#[tokio::test]
async fn test_service_lifecycle() {
    let registry = MemoryRegistry::new();
    let store = MemoryStore::new();
    let target = RecordTarget {
        database: "testdb".to_string(),
        collection: "testcollection".to_string(),
    };
    let policy = RetryPolicy {
        initial_delay_ms: 1,
        max_delay_ms: 1,
        ..Default::default()
    };
    let service = ServiceData {
        name: "checkout".to_string(),
        ip: String::new(),
        port: 8443,
    };

    let created = create_service(&registry, &store, &target, "default", &service, &policy)
        .await
        .unwrap();
    assert!(!created.ip.is_empty());

    let fetched = registry.get("default", "checkout").await.unwrap();
    assert_eq!(fetched, created);

    let listed = registry.list("default").await.unwrap();
    assert_eq!(listed, vec![created.clone()]);

    // The recorded service is resolvable by the correlator.
    let correlator = Correlator::new(Arc::new(store), "testcollection");
    assert_eq!(
        correlator.service_ip("testdb", "checkout").await.unwrap(),
        created.ip
    );
}

#[tokio::test]
async fn test_get_missing_service_is_not_found() {
    let registry = MemoryRegistry::new();

    let err = registry.get("default", "nope").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::NotFound { .. }));
}

#[tokio::test]
async fn test_creation_gives_up_after_policy_attempts() {
    let registry = MemoryRegistry::new();
    registry.fail_next_creates(5);
    let store = MemoryStore::new();
    let target = RecordTarget {
        database: "testdb".to_string(),
        collection: "testcollection".to_string(),
    };
    let policy = RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 1,
        max_delay_ms: 1,
        ..Default::default()
    };
    let service = ServiceData {
        name: "flaky".to_string(),
        ip: String::new(),
        port: 80,
    };

    let err = create_service(&registry, &store, &target, "default", &service, &policy)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::RetriesExhausted { attempts: 2, .. }
    ));
    assert_eq!(registry.create_calls(), 2);
    assert!(store.is_empty("testdb", "testcollection"));
}

/// Live MongoDB round trip.
#[tokio::test]
#[ignore = "requires MONGO_URI"]
async fn test_mongo_correlation() {
    dotenvy::dotenv().ok();
    let Ok(uri) = std::env::var("MONGO_URI") else {
        println!("Skipping: MONGO_URI not set");
        return;
    };

    let store = MongoStore::connect(&StoreConfig::new(uri)).await.unwrap();
    store.ping().await.unwrap();

    let database = format!("traffic_it_{}", std::process::id());
    store
        .insert_one(
            &database,
            "testcollectionA",
            doc! { "name": "Gaming UI", "ip_address": "10.1.2.3", "listening_port": 443 },
        )
        .await
        .unwrap();
    store
        .insert_many(
            &database,
            "flows",
            vec![
                flow("10.1.2.3", "10.9.9.9", "OK"),
                flow("10.7.7.7", "10.6.6.6", "OK"),
            ],
        )
        .await
        .unwrap();

    let store = Arc::new(store);
    let correlator = Correlator::new(store.clone(), "testcollectionA");
    let rows = correlator
        .traffic_for_service(&database, "flows", "Gaming UI")
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].service_name, "Gaming UI");

    store.disconnect().await.unwrap();
}
