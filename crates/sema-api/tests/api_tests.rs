//! HTTP surface tests driven through the router

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tower::util::ServiceExt;

use sema_api::{routes, AppState};
use sema_lsp::client::{framing, protocol, BackendClient, ReconnectPolicy};
use sema_lsp::{
    BackendDescriptor, BackendRegistry, DependencySpec, GlobalSettings, InstallerKind,
    Orchestrator,
};

fn spawn_mock(transport: tokio::io::DuplexStream, symbols: Value) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (read, mut writer) = tokio::io::split(transport);
        let mut reader = BufReader::new(read);

        while let Ok(Some(message)) = framing::read_message(&mut reader).await {
            if let protocol::JsonRpcMessage::Request(request) = message {
                let result = match request.method.as_str() {
                    "initialize" => json!({"capabilities": {}}),
                    "workspace/symbol" => symbols.clone(),
                    "textDocument/references" => Value::Null,
                    _ => continue,
                };
                let reply = protocol::JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    result: Some(result),
                    error: None,
                    id: request.id,
                };
                if framing::write_message(&mut writer, &reply).await.is_err() {
                    break;
                }
            }
        }
    })
}

fn descriptor(language: &str, command: &str, extension: &str) -> BackendDescriptor {
    BackendDescriptor {
        language: language.to_string(),
        display_name: language.to_string(),
        command: command.to_string(),
        args: vec![],
        extensions: vec![extension.to_string()],
        health_check: None,
        dependencies: vec![],
        enabled: true,
        auto_install: false,
        startup_timeout_ms: 1_000,
        request_timeout_ms: 300,
        env: HashMap::new(),
    }
}

/// alpha is served by a scripted backend; beta's executable is missing and
/// it carries an absent optional dependency.
async fn test_state() -> (AppState, JoinHandle<()>) {
    let alpha = descriptor("alpha", "alpha-backend", ".al");
    let mut beta = descriptor("beta", "no-such-backend-xyz", ".bt");
    beta.dependencies.push(DependencySpec {
        name: "beta-extras".to_string(),
        installer: InstallerKind::Pip,
        required: false,
        version: None,
        check_command: Some("false".to_string()),
        source: None,
    });

    let registry = BackendRegistry {
        backends: vec![alpha.clone(), beta],
        global: GlobalSettings {
            reconnect_delay_ms: 10,
            reconnect_max_attempts: 2,
            ..GlobalSettings::default()
        },
    };

    let orchestrator = Arc::new(Orchestrator::new(registry, "/ws"));

    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    let mock = spawn_mock(
        theirs,
        json!([
            {"name": "Foo", "kind": 12, "location": {
                "uri": "file:///ws/lib.al",
                "range": {"start": {"line": 2, "character": 0},
                          "end": {"line": 2, "character": 3}}}}
        ]),
    );

    let client = Arc::new(BackendClient::new(
        alpha,
        "/ws",
        ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(10),
        },
        3,
    ));
    let (read, write) = tokio::io::split(ours);
    client.attach_transport(write, read).await.unwrap();
    orchestrator
        .clients()
        .insert("alpha".to_string(), client)
        .await;

    (AppState::new(orchestrator), mock)
}

fn post(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_active_languages_and_memory() {
    let (state, _mock) = test_state().await;
    let router = routes::router(state);

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeLanguages"], json!(["alpha"]));
    assert!(body["uptimeSeconds"].is_u64());
    assert!(body["memory"]["totalMB"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_status_lists_only_ready_backends() {
    let (state, _mock) = test_state().await;
    let router = routes::router(state);

    let response = router
        .oneshot(Request::get("/lsps/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["available"], json!(["alpha"]));
}

#[tokio::test]
async fn test_search_returns_partial_results_with_annotations() {
    let (state, _mock) = test_state().await;
    let router = routes::router(state);

    let response = router
        .oneshot(post(
            "/symbols/search",
            r#"{"query": "Foo", "languages": ["alpha", "beta"]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["symbols"][0]["name"], "Foo");
    assert_eq!(body["symbols"][0]["language"], "alpha");

    let outcomes = body["outcomes"].as_array().unwrap();
    let beta = outcomes
        .iter()
        .find(|o| o["language"] == "beta")
        .expect("beta outcome");
    assert_eq!(beta["status"], "unavailable");
}

#[tokio::test]
async fn test_search_empty_query_is_structured_400() {
    let (state, _mock) = test_state().await;
    let router = routes::router(state);

    let response = router
        .oneshot(post("/symbols/search", r#"{"query": "  "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_search_malformed_body_is_structured_400() {
    let (state, _mock) = test_state().await;
    let router = routes::router(state);

    let response = router
        .oneshot(post("/symbols/search", r#"{"query": 42"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_references_outside_symbol_is_empty_200() {
    let (state, _mock) = test_state().await;
    let router = routes::router(state);

    let response = router
        .oneshot(post(
            "/references",
            r#"{"filePath": "/ws/lib.al",
                "position": {"line": 999, "character": 0},
                "includeDeclaration": false}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["references"], json!([]));
}

#[tokio::test]
async fn test_references_unclaimed_extension_is_structured_503() {
    let (state, _mock) = test_state().await;
    let router = routes::router(state);

    let response = router
        .oneshot(post(
            "/references",
            r#"{"filePath": "/ws/q.zig",
                "position": {"line": 0, "character": 0},
                "includeDeclaration": false}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_server_start_and_stop_lifecycle() {
    let workspace = tempfile::tempdir().unwrap();
    let registry = BackendRegistry {
        backends: vec![],
        global: GlobalSettings::default(),
    };

    let server = sema_api::ApiServer::start(registry, workspace.path(), 0)
        .await
        .unwrap();
    assert_ne!(server.local_addr().port(), 0);

    server.stop().await.unwrap();
}
