use std::sync::Arc;

use netfab_core::UserId;
use netfab_infra::store::InMemoryStore;
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over a fresh in-memory store, on an ephemeral port.
        let app = netfab_api::app::build_app(Arc::new(InMemoryStore::new()));
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

struct Client {
    http: reqwest::Client,
    actor: String,
}

impl Client {
    fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            actor: UserId::new().to_string(),
        }
    }

    async fn post(&self, url: String, body: Value) -> (StatusCode, Value) {
        let res = self
            .http
            .post(url)
            .header("x-user-id", &self.actor)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn patch(&self, url: String, body: Value) -> (StatusCode, Value) {
        let res = self
            .http
            .patch(url)
            .header("x-user-id", &self.actor)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, url: String) -> (StatusCode, Value) {
        let res = self.http.get(url).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }
}

async fn register(srv: &TestServer, client: &Client, code: &str, category: &str, quantity: i64) -> String {
    let (status, body) = client
        .post(
            srv.url("/items"),
            json!({
                "code": code,
                "name": format!("item {code}"),
                "category": category,
                "unit": "m2",
                "unit_cost": "12.50",
                "initial_quantity": quantity,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn on_hand(srv: &TestServer, client: &Client, item_id: &str) -> String {
    let (status, body) = client.get(srv.url(&format!("/items/{item_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    body["quantity_on_hand"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let (status, body) = Client::new().get(srv.url("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn writes_require_an_actor() {
    let srv = TestServer::spawn().await;
    let http = reqwest::Client::new();

    let res = http
        .post(srv.url("/items"))
        .json(&json!({ "code": "X", "name": "x", "category": "material" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_actor");

    let res = http
        .post(srv.url("/items"))
        .header("x-user-id", "not-a-uuid")
        .json(&json!({ "code": "X", "name": "x", "category": "material" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_lifecycle_reserves_and_restores_stock() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "PN-X", "pano", 10).await;
    assert_eq!(on_hand(&srv, &client, &item_id).await, "10");

    let (status, order) = client
        .post(
            srv.url("/orders"),
            json!({
                "client": "Pesquera del Norte",
                "priority": "alta",
                "lines": [{ "item_id": item_id, "quantity": 4 }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["state"], "pendiente");
    assert_eq!(order["priority"], "alta");
    assert!(order["order_number"].as_str().unwrap().starts_with("OP-"));
    assert_eq!(order["lines"][0]["item_type"], "PANO");
    assert_eq!(on_hand(&srv, &client, &item_id).await, "6");

    let order_id = order["id"].as_str().unwrap().to_string();
    let state_url = srv.url(&format!("/orders/{order_id}/state"));

    let (status, body) = client.patch(state_url.clone(), json!({ "state": "cancelada" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["state"], "cancelada");
    assert_eq!(body["lines"][0]["restored"], true);
    assert_eq!(on_hand(&srv, &client, &item_id).await, "10");

    let (status, _) = client.patch(state_url, json!({ "state": "cancelada" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(on_hand(&srv, &client, &item_id).await, "10");

    let (status, page) = client
        .get(srv.url(&format!("/movements?order_id={order_id}")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);

    let (status, report) = client
        .get(srv.url(&format!("/items/{item_id}/reconciliation")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["balanced"], true);
    assert_eq!(report["entries"], 3);
}

#[tokio::test]
async fn insufficient_stock_is_unprocessable_and_persists_nothing() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "MAT-Y", "material", 2).await;

    let (status, body) = client
        .post(
            srv.url("/orders"),
            json!({ "client": "Acme", "lines": [{ "item_id": item_id, "quantity": 5 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(on_hand(&srv, &client, &item_id).await, "2");

    let (_, orders) = client.get(srv.url("/orders")).await;
    assert_eq!(orders["total"], 0);
}

#[tokio::test]
async fn illegal_transition_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "PN-T", "pano", 5).await;

    let (_, order) = client
        .post(
            srv.url("/orders"),
            json!({ "client": "Acme", "lines": [{ "item_id": item_id, "quantity": 1 }] }),
        )
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, body) = client
        .patch(
            srv.url(&format!("/orders/{order_id}/state")),
            json!({ "state": "completada" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (_, stored) = client.get(srv.url(&format!("/orders/{order_id}"))).await;
    assert_eq!(stored["state"], "pendiente");
    assert_eq!(stored["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn manual_movements_and_stats() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "PN-M", "pano", 10).await;

    let (status, entry) = client
        .post(
            srv.url("/movements"),
            json!({ "item_id": item_id, "movement_type": "AJUSTE", "quantity": 7 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert_eq!(entry["quantity_before"], "10");
    assert_eq!(entry["quantity_after"], "7");

    let (status, body) = client
        .post(
            srv.url("/movements"),
            json!({ "item_id": item_id, "movement_type": "SALIDA", "quantity": 8 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");

    let (status, body) = client
        .post(
            srv.url("/movements"),
            json!({ "item_id": item_id, "movement_type": "AJUSTE", "quantity": 7 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, stats) = client.get(srv.url("/movements/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 2);

    let (status, page) = client.get(srv.url("/movements?type=ajuste")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let srv = TestServer::spawn().await;
    let client = Client::new();

    let (status, _) = client.get(srv.url("/items/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = client.get(srv.url(&format!("/orders/{}", UserId::new()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn retired_items_disappear_from_lookups() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "TL-1", "herramienta", 1).await;

    let (status, body) = client
        .post(srv.url(&format!("/items/{item_id}/retire")), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, _) = client.get(srv.url(&format!("/items/{item_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = client.get(srv.url("/items?include_retired=true")).await;
    assert_eq!(listed["count"], 1);
    let (_, listed) = client.get(srv.url("/items")).await;
    assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn restore_endpoint_requires_a_cancelled_order() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "PN-R", "pano", 3).await;

    let (_, order) = client
        .post(
            srv.url("/orders"),
            json!({ "client": "Acme", "lines": [{ "item_id": item_id, "quantity": 3 }] }),
        )
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, _) = client
        .post(srv.url(&format!("/orders/{order_id}/restore")), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stats) = client.get(srv.url("/orders/stats")).await;
    assert_eq!(stats["total"], 1);
}

#[tokio::test]
async fn order_naming_an_unknown_item_is_a_validation_error() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "PN-U", "pano", 5).await;

    let (status, body) = client
        .post(
            srv.url("/orders"),
            json!({
                "client": "Acme",
                "lines": [
                    { "item_id": item_id, "quantity": 1 },
                    { "item_id": UserId::new().to_string(), "quantity": 1 },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("line 2"));
    assert_eq!(on_hand(&srv, &client, &item_id).await, "5");
}

#[tokio::test]
async fn too_many_decimal_places_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "PN-D", "pano", 10).await;

    let (status, body) = client
        .post(
            srv.url("/movements"),
            json!({ "item_id": item_id, "movement_type": "ENTRADA", "quantity": "0.00005" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(on_hand(&srv, &client, &item_id).await, "10");
}

#[tokio::test]
async fn movements_can_be_fetched_one_by_one() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "PN-G", "pano", 4).await;

    let (_, entry) = client
        .post(
            srv.url("/movements"),
            json!({ "item_id": item_id, "movement_type": "SALIDA", "quantity": "1.5" }),
        )
        .await;
    let movement_id = entry["id"].as_str().unwrap().to_string();

    let (status, fetched) = client.get(srv.url(&format!("/movements/{movement_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, entry);

    let (status, _) = client.get(srv.url(&format!("/movements/{}", UserId::new()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = client.get(srv.url("/movements/nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn item_details_and_pending_orders_are_editable() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let item_id = register(&srv, &client, "MAT-E", "material", 8).await;

    let (status, item) = client
        .patch(
            srv.url(&format!("/items/{item_id}")),
            json!({ "name": "Hilo nylon", "unit_cost": "13.75" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{item}");
    assert_eq!(item["name"], "Hilo nylon");
    assert_eq!(item["unit_cost"], "13.75");
    assert_eq!(item["quantity_on_hand"], "8");

    let (status, _) = client
        .patch(srv.url(&format!("/items/{item_id}")), json!({ "code": "OTHER" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, order) = client
        .post(
            srv.url("/orders"),
            json!({ "client": "Acme", "lines": [{ "item_id": item_id, "quantity": 1 }] }),
        )
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let order_url = srv.url(&format!("/orders/{order_id}"));

    let (status, edited) = client
        .patch(order_url.clone(), json!({ "client": "Acuícola Sur", "priority": "urgente" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{edited}");
    assert_eq!(edited["client"], "Acuícola Sur");
    assert_eq!(edited["priority"], "urgente");

    client
        .patch(format!("{order_url}/state"), json!({ "state": "en_proceso" }))
        .await;
    let (status, body) = client.patch(order_url, json!({ "notes": "tarde" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn availability_and_alerts_reserve_nothing() {
    let srv = TestServer::spawn().await;
    let client = Client::new();
    let panel = register(&srv, &client, "PN-A", "pano", 3).await;
    let empty = register(&srv, &client, "MAT-A", "material", 0).await;

    let (status, report) = client
        .post(
            srv.url("/orders/availability"),
            json!({ "lines": [
                { "item_id": panel, "quantity": 2 },
                { "item_id": panel, "quantity": 2 },
            ] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["all_available"], false);
    assert_eq!(report["lines"][0]["available_for_order"], true);
    assert_eq!(report["lines"][1]["available_for_order"], false);
    assert_eq!(on_hand(&srv, &client, &panel).await, "3");

    let (status, alerts) = client.get(srv.url("/items/alerts?threshold=5")).await;
    assert_eq!(status, StatusCode::OK, "{alerts}");
    assert_eq!(alerts["out_of_stock"][0]["id"], empty.as_str());
    assert_eq!(alerts["low_stock"][0]["id"], panel.as_str());
    assert_eq!(alerts["total"], 2);
}
