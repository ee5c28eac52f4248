use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use stockroom_core::DocumentId;
use stockroom_infra::{PeriodPolicy, StockroomConfig};
use stockroom_invalidation::{EntityKind, InvalidationGraph};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(None).await
    }

    async fn spawn_with(admin_token: Option<&str>) -> Self {
        // Same router as prod with in-memory stores, bound to an ephemeral port.
        let config = StockroomConfig {
            period: PeriodPolicy::Fixed("2026".to_string()),
            admin_token: admin_token.map(str::to_string),
            ..StockroomConfig::default()
        };
        let app = stockroom_api::app::build_app(config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create(client: &reqwest::Client, srv: &TestServer, entity: &str, body: Value) -> Value {
    let res = client
        .post(srv.url(&format!("/documents/{entity}")))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn import(client: &reqwest::Client, srv: &TestServer, entity: &str, number: &str) {
    let res = client
        .post(srv.url(&format!("/documents/{entity}/import")))
        .json(&json!({ "number": number }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

fn invalidate_keys(mutation: &Value) -> BTreeSet<String> {
    mutation["invalidate"]
        .as_array()
        .expect("invalidate array")
        .iter()
        .map(|k| k.as_str().unwrap().to_string())
        .collect()
}

fn graph_keys(entity: EntityKind, id: &str) -> BTreeSet<String> {
    let id: DocumentId = id.parse().unwrap();
    InvalidationGraph::standard()
        .invalidation_set(entity, id)
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn customer_orders_are_numbered_sequentially() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut numbers = Vec::new();
    for _ in 0..3 {
        let m = create(&client, &srv, "customer-order", json!({"customer": "ACME"})).await;
        numbers.push(m["document"]["number"].as_str().unwrap().to_string());
        assert_eq!(m["document"]["body"]["number"], m["document"]["number"]);
    }
    assert_eq!(numbers, vec!["CO-2026-1", "CO-2026-2", "CO-2026-3"]);

    let res = client.get(srv.url("/counters/CO-2026")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let counter: Value = res.json().await.unwrap();
    assert_eq!(counter["seq"], 3);

    let list: Value = client
        .get(srv.url("/documents/customer-orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn customer_order_mutation_returns_exact_invalidation_keys() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let m = create(&client, &srv, "customer-order", json!({})).await;
    let id = m["document"]["id"].as_str().unwrap().to_string();
    let expected: BTreeSet<String> = [
        "customer-orders".to_string(),
        format!("customer-order:{id}"),
        "customer-invoices".to_string(),
        "shipments".to_string(),
        "products".to_string(),
    ]
    .into_iter()
    .collect();
    assert_eq!(invalidate_keys(&m), expected);
}

#[tokio::test]
async fn every_mutation_route_takes_keys_from_the_graph() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for entity in EntityKind::ALL {
        let created = create(&client, &srv, entity.as_str(), json!({"note": "x"})).await;
        let id = created["document"]["id"].as_str().unwrap().to_string();
        assert_eq!(
            invalidate_keys(&created),
            graph_keys(entity, &id),
            "create {entity}"
        );

        let res = client
            .patch(srv.url(&format!("/documents/{}/{id}", entity.collection())))
            .json(&json!({"note": "y"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let updated: Value = res.json().await.unwrap();
        assert_eq!(updated["document"]["body"]["note"], "y");
        assert_eq!(
            invalidate_keys(&updated),
            graph_keys(entity, &id),
            "update {entity}"
        );
    }
}

#[tokio::test]
async fn server_assigns_numbers_and_they_are_immutable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/documents/customer-invoice"))
        .json(&json!({"number": "INV-2026-999"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let m = create(&client, &srv, "customer-invoice", json!({})).await;
    let id = m["document"]["id"].as_str().unwrap();
    let res = client
        .patch(srv.url(&format!("/documents/customer-invoice/{id}")))
        .json(&json!({"number": "INV-2026-7"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn lookup_errors_map_to_status_codes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/documents/warehouses")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/documents/products/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url(&format!("/documents/products/{}", DocumentId::new())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/counters/CO%202026"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reconcile_after_import_continues_past_highest_number() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for number in ["CO-2026-5", "CO-2026-12", "CO-2026-7"] {
        import(&client, &srv, "customer-order", number).await;
    }

    let res = client
        .post(srv.url("/admin/reconcile"))
        .json(&json!({"period": "2026"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    let co = report["bindings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["binding"]["collection"] == "customer-orders")
        .unwrap();
    assert_eq!(co["outcome"]["status"], "raised");
    assert_eq!(co["outcome"]["current"], 12);

    let counter: Value = client
        .get(srv.url("/counters/CO-2026"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counter["seq"], 12);

    let m = create(&client, &srv, "customer-order", json!({})).await;
    assert_eq!(m["document"]["number"], "CO-2026-13");

    // Nothing new to pick up: the second run raises nothing.
    let report: Value = client
        .post(srv.url("/admin/reconcile"))
        .json(&json!({"bindings": ["customer-orders:number:CO-2026"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["bindings"][0]["outcome"]["status"], "unchanged");
    assert_eq!(report["bindings"][0]["outcome"]["current"], 13);
}

#[tokio::test]
async fn duplicate_number_halts_series_until_released() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    import(&client, &srv, "shipment", "SHP-2026-1").await;

    let res = client
        .post(srv.url("/documents/shipment"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_number");

    let res = client
        .post(srv.url("/documents/shipment"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_number_detected");

    let quarantined: Value = client
        .get(srv.url("/admin/quarantine"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(quarantined[0]["key"], "SHP-2026");

    // Other series are unaffected.
    create(&client, &srv, "payment", json!({})).await;

    let res = client
        .delete(srv.url("/admin/quarantine/SHP-2026"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let m = create(&client, &srv, "shipment", json!({})).await;
    assert_eq!(m["document"]["number"], "SHP-2026-2");

    let res = client
        .delete(srv.url("/admin/quarantine/SHP-2026"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_token_when_configured() {
    let srv = TestServer::spawn_with(Some("s3cret")).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/admin/quarantine")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/admin/quarantine"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/admin/quarantine"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Document routes stay open.
    create(&client, &srv, "product", json!({"sku": "A1"})).await;
}

#[tokio::test]
async fn invalidation_keys_are_streamed_over_sse() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let stream_url = srv.url("/stream");
    let reader = tokio::spawn(async move {
        let mut res = reqwest::get(stream_url).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let mut buf = String::new();
        while let Some(chunk) = res.chunk().await.unwrap() {
            buf.push_str(&String::from_utf8_lossy(&chunk));
            if buf.contains("\n\n") && buf.contains("event: cache.invalidate") {
                break;
            }
        }
        buf
    });

    // Give the subscriber time to attach before mutating.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let m = create(&client, &srv, "receipt", json!({})).await;
    let id = m["document"]["id"].as_str().unwrap().to_string();

    let received = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("no invalidation event within timeout")
        .unwrap();
    assert!(received.contains("event: cache.invalidate"));
    assert!(received.contains(&format!("receipt:{id}")));
    assert!(received.contains("purchase-orders"));
}
