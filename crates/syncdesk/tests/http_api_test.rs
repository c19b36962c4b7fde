#![allow(clippy::unwrap_used)]
// Router behaviour exercised in-process with `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syncdesk::{AppState, build_state, cors_layer, router};
use syncdesk_config::{Config, TokenIdentity};

const UNREACHABLE: &str = "http://127.0.0.1:1/rest";

// ── Helpers ─────────────────────────────────────────────────────────

fn config(base_url: &str, with_tokens: bool) -> Config {
    let mut config = Config::default();
    config.remote.base_url = base_url.to_owned();
    config.executor.backoff_base_ms = 1;
    config.executor.backoff_max_ms = 5;
    if with_tokens {
        config.auth.tokens.insert(
            "tok-ana".into(),
            TokenIdentity {
                user_id: "u1".into(),
                user_name: Some("Ana".into()),
            },
        );
    }
    config
}

fn app(state: &AppState) -> Router {
    router(state.clone(), cors_layer(&[]).unwrap())
}

fn post_json(uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Pull the next SSE message and return (event name, data JSON).
async fn next_sse(stream: &mut axum::body::BodyDataStream) -> (String, Value) {
    let chunk = stream.next().await.unwrap().unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    let mut event = String::new();
    let mut data = Value::Null;
    for line in text.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            event = name.to_owned();
        } else if let Some(raw) = line.strip_prefix("data: ") {
            data = serde_json::from_str(raw).unwrap();
        }
    }
    (event, data)
}

// ── Health & operations ─────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let state = build_state(&config(UNREACHABLE, false)).unwrap();
    let response = app(&state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok", "connections": 0 }));
}

#[tokio::test]
async fn operation_runs_against_the_remote_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/Materiales"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "m1" }])))
        .expect(1)
        .mount(&server)
        .await;

    let state = build_state(&config(&format!("{}/rest", server.uri()), false)).unwrap();
    let request = json!({ "table": "Materiales", "operation": "list" });

    let first = json_body(
        app(&state)
            .oneshot(post_json("/api/operations", &request, None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first["ok"], true);
    assert_eq!(first["data"], json!([{ "id": "m1" }]));
    assert_eq!(first["metadata"]["cacheHit"], false);

    let second = json_body(
        app(&state)
            .oneshot(post_json("/api/operations", &request, None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(second["metadata"]["cacheHit"], true);
}

#[tokio::test]
async fn invalid_operation_is_a_rejected_result_not_an_http_error() {
    let state = build_state(&config(UNREACHABLE, false)).unwrap();
    let response = app(&state)
        .oneshot(post_json(
            "/api/operations",
            &json!({ "table": "Empleados", "operation": "list" }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn batch_keeps_request_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/Proyectos/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1" })))
        .mount(&server)
        .await;

    let state = build_state(&config(&format!("{}/rest", server.uri()), false)).unwrap();
    let request = json!({
        "operations": [
            { "table": "Proyectos", "operation": "get" },
            { "table": "Proyectos", "operation": "get", "id": "p1" }
        ]
    });
    let body = json_body(
        app(&state)
            .oneshot(post_json("/api/operations/batch", &request, None))
            .await
            .unwrap(),
    )
    .await;

    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["error"], "VALIDATION_ERROR");
    assert_eq!(results[1]["ok"], true);
    assert_eq!(results[1]["data"], json!({ "id": "p1" }));
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let state = build_state(&config(UNREACHABLE, true)).unwrap();
    let response = app(&state)
        .oneshot(post_json(
            "/api/operations",
            &json!({ "table": "Materiales", "operation": "list" }),
            Some("nope"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");
}

// ── Broadcast ingress ───────────────────────────────────────────────

#[tokio::test]
async fn broadcast_requires_an_identity() {
    let state = build_state(&config(UNREACHABLE, false)).unwrap();
    let request = json!({ "table": "Proyectos", "operation": "update", "recordId": "p1" });
    let response = app(&state)
        .oneshot(post_json("/api/sync/broadcast", &request, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn broadcast_validates_fields() {
    let state = build_state(&config(UNREACHABLE, true)).unwrap();
    let response = app(&state)
        .oneshot(post_json(
            "/api/sync/broadcast",
            &json!({ "operation": "update", "recordId": "p1" }),
            Some("tok-ana"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert!(body["message"].as_str().unwrap().contains("table"));
}

#[tokio::test]
async fn broadcast_publishes_and_counts() {
    let state = build_state(&config(UNREACHABLE, true)).unwrap();
    let request = json!({
        "table": "Proyectos",
        "operation": "update",
        "recordId": "p1",
        "data": { "status": "active" },
        "version": 2
    });
    let response = app(&state)
        .oneshot(post_json("/api/sync/broadcast", &request, Some("tok-ana")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["delivered"], 0);
    assert_eq!(body["conflict"], Value::Null);

    let stats = json_body(
        app(&state)
            .oneshot(Request::get("/api/sync/stats").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(stats["eventsPublished"], 1);
    assert_eq!(stats["connectionCount"], 0);
}

// ── Event stream ────────────────────────────────────────────────────

#[tokio::test]
async fn stream_delivers_connected_then_matching_events() {
    let state = build_state(&config(UNREACHABLE, true)).unwrap();
    let response = app(&state)
        .oneshot(
            Request::get("/api/sync/stream?token=tok-ana&tables=Proyectos")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut stream = response.into_body().into_data_stream();
    let (event, data) = next_sse(&mut stream).await;
    assert_eq!(event, "connected");
    let connection_id = data["connectionId"].as_str().unwrap().to_owned();
    assert_eq!(state.hub().connection_count(), 1);

    let heartbeat = app(&state)
        .oneshot(post_json(
            &format!("/api/sync/connections/{connection_id}/heartbeat"),
            &json!({}),
            Some("tok-ana"),
        ))
        .await
        .unwrap();
    assert_eq!(heartbeat.status(), StatusCode::NO_CONTENT);

    let request = json!({
        "table": "Proyectos",
        "operation": "create",
        "recordId": "p9",
        "data": { "name": "Torre Sur" }
    });
    app(&state)
        .oneshot(post_json("/api/sync/broadcast", &request, Some("tok-ana")))
        .await
        .unwrap();

    let (event, data) = next_sse(&mut stream).await;
    assert_eq!(event, "sync-event");
    assert_eq!(data["recordId"], "p9");
    assert_eq!(data["userId"], "u1");

    drop(stream);
    assert_eq!(state.hub().connection_count(), 0);
}

#[tokio::test]
async fn unknown_connection_heartbeat_is_not_found() {
    let state = build_state(&config(UNREACHABLE, false)).unwrap();
    let response = app(&state)
        .oneshot(post_json("/api/sync/connections/missing/heartbeat", &json!({}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "connection_not_found");
}

// ── Cache administration ────────────────────────────────────────────

#[tokio::test]
async fn cache_can_be_cleared_and_inspected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/Pedidos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let state = build_state(&config(&format!("{}/rest", server.uri()), false)).unwrap();
    app(&state)
        .oneshot(post_json(
            "/api/operations",
            &json!({ "table": "Pedidos", "operation": "list" }),
            None,
        ))
        .await
        .unwrap();

    let stats = json_body(
        app(&state)
            .oneshot(Request::get("/api/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(stats["size"], 1);

    let cleared = app(&state)
        .oneshot(Request::delete("/api/cache").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(cleared.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.service.executor().cache().len(), 0);
}

#[tokio::test]
async fn table_invalidation_rejects_unknown_tables() {
    let state = build_state(&config(UNREACHABLE, false)).unwrap();
    let response = app(&state)
        .oneshot(Request::delete("/api/cache/Empleados").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&state)
        .oneshot(Request::delete("/api/cache/Materiales").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({ "ok": true, "removed": 0 }));
}
