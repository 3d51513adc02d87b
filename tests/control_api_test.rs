//! Control-plane HTTP API tests
//!
//! Requests go straight into the router with `tower::ServiceExt::oneshot`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use lcx_proxy::control::{build_router, AppState};
use lcx_proxy::terminal::TerminalSettings;
use lcx_proxy::{ProxyRegistry, RelaySettings, TerminalBridge};

struct TestApp {
    router: Router,
    registry: Arc<ProxyRegistry>,
    config_file: PathBuf,
    _dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config_file = dir.path().join("proxy_config.json");
    let registry = Arc::new(ProxyRegistry::new(RelaySettings::default()));
    let bridge = TerminalBridge::new(registry.clone(), TerminalSettings::default());
    let state = AppState::new(registry.clone(), bridge, config_file.clone());

    TestApp {
        router: build_router(state, None),
        registry,
        config_file,
        _dir: dir,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_add_and_list() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        get("/lcx/proxy/add?localip=127.0.0.1&localport=9000&remoteip=10.0.0.5&remoteport=22&desc=jump"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["status"], 0);
    assert_eq!(body["desc"], "jump");

    let (status, body) = send(
        &app.router,
        post_json(
            "/lcx/proxy/add",
            json!({"localIp": "127.0.0.1", "localPort": 9001, "remoteIp": "10.0.0.6",
                   "remotePort": 23, "termType": "telnet"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 2);
    assert_eq!(body["termType"], "telnet");

    for uri in ["/lcx", "/lcx/proxylist"] {
        let (status, body) = send(&app.router, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["id"], 1);
        assert_eq!(list[1]["id"], 2);
    }

    let (status, body) = send(&app.router, get("/lcx/proxy?id=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remoteIp"], "10.0.0.6");
}

#[tokio::test]
async fn test_add_rejects_bad_input() {
    let app = test_app();

    let (status, _) = send(&app.router, get("/lcx/proxy/add?localip=127.0.0.1&localport=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        post_json("/lcx/proxy/add", json!({"localIp": "", "localPort": 9000, "remoteIp": "x", "remotePort": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.registry.list().await.is_empty());
}

#[tokio::test]
async fn test_start_stop_and_delete() {
    let app = test_app();
    let port = free_port().await;
    let id = app
        .registry
        .add(lcx_proxy::ProxyDefinition::new("127.0.0.1", port, "127.0.0.1", 9))
        .await
        .unwrap();

    let (status, body) = send(&app.router, get(&format!("/lcx/proxy?id={}&op=start", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": 0, "errMsg": "Success", "id": id, "status": 1}));

    let (status, body) = send(&app.router, get(&format!("/lcx/proxy/op?id={}&op=stop", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 0);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/lcx/proxy?id={}", id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 0);

    let (status, _) = send(&app.router, get(&format!("/lcx/proxy?id={}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_op_errors() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/lcx/proxy/op?id=42&op=del")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["result"], 1);
    assert_eq!(body["errMsg"], "Proxy 42 not exist");

    let (status, _) = send(&app.router, get("/lcx/proxy/op?id=42&op=pause")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, get("/lcx/proxy/op?op=start")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, get("/lcx/proxy?id=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let app = test_app();
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();
    let id = app
        .registry
        .add(lcx_proxy::ProxyDefinition::new("127.0.0.1", port, "127.0.0.1", 9))
        .await
        .unwrap();

    let (status, body) = send(&app.router, get(&format!("/lcx/proxy/op?id={}&op=start", id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["result"], 1);
    assert_eq!(body["status"], 0);
    assert!(body["errMsg"].as_str().unwrap().contains("Failed to listen"));
}

#[tokio::test]
async fn test_modify() {
    let app = test_app();
    let port = free_port().await;
    let id = app
        .registry
        .add(lcx_proxy::ProxyDefinition::new("127.0.0.1", port, "127.0.0.1", 22))
        .await
        .unwrap();

    let (status, body) = send(
        &app.router,
        post_json(
            "/lcx/proxy/modify",
            json!({"id": id, "localIp": "127.0.0.1", "localPort": port, "remoteIp": "127.0.0.1",
                   "remotePort": 22, "desc": "renamed"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 0);
    assert_eq!(app.registry.get(id).await.unwrap().definition.desc, "renamed");

    let (status, _) = send(
        &app.router,
        get(&format!(
            "/lcx/proxy/modify?id={}&localip=127.0.0.1&localport={}&remoteip=127.0.0.1&remoteport=2222",
            id, port
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let record = app.registry.get(id).await.unwrap();
    assert_eq!(record.definition.remote_port, 2222);
    assert_eq!(record.status, lcx_proxy::ProxyStatus::Started);

    let (status, _) = send(
        &app.router,
        post_json(
            "/lcx/proxy/modify",
            json!({"localIp": "127.0.0.1", "localPort": 9000, "remoteIp": "127.0.0.1", "remotePort": 22}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        get("/lcx/proxy/modify?id=77&localip=127.0.0.1&localport=9000&remoteip=127.0.0.1&remoteport=22"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["result"], 1);

    app.registry.shutdown().await;
}

#[tokio::test]
async fn test_save_writes_rule_file() {
    let app = test_app();
    app.registry
        .add(lcx_proxy::ProxyDefinition::new("127.0.0.1", 9000, "127.0.0.1", 22))
        .await
        .unwrap();

    let (status, body) = send(&app.router, get("/lcx?op=save")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&app.config_file).unwrap()).unwrap();
    assert_eq!(saved[0]["localPort"], 9000);
}

#[tokio::test]
async fn test_websocket_parameters_checked_before_upgrade() {
    let app = test_app();

    let (status, _) = send(&app.router, get("/ws?op=termconnect&id=42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, get("/ws?op=termconnect")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, get("/ws?op=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Not a websocket handshake
    let (status, _) = send(&app.router, get("/ws?op=wscomm")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
