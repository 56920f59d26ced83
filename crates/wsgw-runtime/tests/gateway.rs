//! End-to-end tests: a real gateway instance, a mock backend application
//! and a plain WebSocket client.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use wsgw_cluster::{ClusterRouter, InMemoryBus};
use wsgw_core::{
    CONNECTION_ID_HEADER, ConnectionId, ConnectionRegistry, IdMinter, Session,
};
use wsgw_runtime::{GatewayConfig, GatewayServer, RunningGateway};
use wsgw_transport::BackendClient;

/// Everything the mock backend observed, by endpoint.
#[derive(Default)]
struct BackendCalls {
    connects: Mutex<Vec<String>>,
    messages: Mutex<Vec<(String, String)>>,
    disconnects: Mutex<Vec<String>>,
}

fn connection_id_of(headers: &HeaderMap) -> String {
    headers
        .get(CONNECTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn backend_connect(
    State(calls): State<Arc<BackendCalls>>,
    headers: HeaderMap,
) -> StatusCode {
    if headers
        .get("authorization")
        .is_some_and(|v| v == "bad-credential")
    {
        return StatusCode::UNAUTHORIZED;
    }
    calls.connects.lock().unwrap().push(connection_id_of(&headers));
    StatusCode::OK
}

async fn backend_message(
    State(calls): State<Arc<BackendCalls>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    calls
        .messages
        .lock()
        .unwrap()
        .push((connection_id_of(&headers), body));
    StatusCode::OK
}

async fn backend_disconnected(
    State(calls): State<Arc<BackendCalls>>,
    headers: HeaderMap,
) -> StatusCode {
    calls
        .disconnects
        .lock()
        .unwrap()
        .push(connection_id_of(&headers));
    StatusCode::OK
}

/// Starts the mock backend on an ephemeral port.
async fn start_mock_backend() -> (String, Arc<BackendCalls>) {
    let calls = Arc::new(BackendCalls::default());
    let router = Router::new()
        .route("/ws/connect", get(backend_connect))
        .route("/ws/message", post(backend_message))
        .route("/ws/disconnected", post(backend_disconnected))
        .with_state(Arc::clone(&calls));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{addr}"), calls)
}

fn fixed_minter(id: &'static str) -> IdMinter {
    Arc::new(move || ConnectionId::from(id))
}

async fn start_gateway(
    backend_url: &str,
    registry: Arc<ConnectionRegistry>,
    cluster: Option<Arc<ClusterRouter>>,
    minter: IdMinter,
    configure: impl FnOnce(&mut GatewayConfig),
) -> RunningGateway {
    let _ = wsgw_runtime::logging::try_init();
    let mut config = GatewayConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        app_base_url: backend_url.to_string(),
        ..Default::default()
    };
    configure(&mut config);
    let backend = Arc::new(BackendClient::new(&config.app_base_url));
    GatewayServer::start(config, registry, backend, cluster, minter)
        .await
        .expect("gateway should start")
}

fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/connect")
}

fn push_url(addr: SocketAddr, id: &str) -> String {
    format!("http://{addr}/message/{id}")
}

/// Polls `check` until it holds or a deadline passes.
async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time: {what}");
}

#[tokio::test]
async fn relays_one_message_each_way() {
    let (backend_url, calls) = start_mock_backend().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let gateway = start_gateway(
        &backend_url,
        Arc::clone(&registry),
        None,
        fixed_minter("C1"),
        |_| {},
    )
    .await;

    let (mut client, _) = connect_async(ws_url(gateway.addr())).await.unwrap();
    eventually("backend saw the connect", || {
        *calls.connects.lock().unwrap() == vec!["C1".to_string()]
    })
    .await;

    client.send(Message::Text("hi".into())).await.unwrap();
    eventually("backend saw the client message", || {
        *calls.messages.lock().unwrap() == vec![("C1".to_string(), "hi".to_string())]
    })
    .await;

    let push = reqwest::Client::new()
        .post(push_url(gateway.addr(), "C1"))
        .body("bye")
        .send()
        .await
        .unwrap();
    assert_eq!(push.status(), reqwest::StatusCode::NO_CONTENT);

    let frame = client.next().await.unwrap().unwrap();
    assert_eq!(frame.into_text().unwrap().as_str(), "bye");

    client.close(None).await.unwrap();
    eventually("backend saw the disconnect", || {
        *calls.disconnects.lock().unwrap() == vec!["C1".to_string()]
    })
    .await;
    eventually("registry drained", || registry.is_empty()).await;

    gateway.shutdown().await;
}

#[tokio::test]
async fn denied_connect_never_creates_a_session() {
    let (backend_url, calls) = start_mock_backend().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let gateway = start_gateway(
        &backend_url,
        Arc::clone(&registry),
        None,
        fixed_minter("C2"),
        |_| {},
    )
    .await;

    let mut request = ws_url(gateway.addr()).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("authorization", "bad-credential".parse().unwrap());

    let error = connect_async(request).await.expect_err("upgrade must fail");
    match error {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected an HTTP 401, got {other:?}"),
    }

    assert!(registry.is_empty());
    assert!(calls.connects.lock().unwrap().is_empty());
    assert!(calls.disconnects.lock().unwrap().is_empty());

    gateway.shutdown().await;
}

#[tokio::test]
async fn ack_frame_carries_the_assigned_id() {
    let (backend_url, _calls) = start_mock_backend().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let gateway = start_gateway(
        &backend_url,
        registry,
        None,
        fixed_minter("C3"),
        |config| config.ack_new_conn_with_conn_id = true,
    )
    .await;

    let (mut client, _) = connect_async(ws_url(gateway.addr())).await.unwrap();
    let frame = client.next().await.unwrap().unwrap();
    assert_eq!(
        frame.into_text().unwrap().as_str(),
        r#"{"connectionId":"C3"}"#
    );

    client.close(None).await.unwrap();
    gateway.shutdown().await;
}

#[tokio::test]
async fn pushes_beyond_the_buffer_are_shed() {
    let (backend_url, _calls) = start_mock_backend().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let gateway = start_gateway(
        &backend_url,
        Arc::clone(&registry),
        None,
        fixed_minter("C4"),
        |_| {},
    )
    .await;

    // A registered session nobody is draining: the buffer fills for real.
    let session = Session::with_outbound_buffer(ConnectionId::from("C4"), Vec::new(), 4);
    registry.add(session.handle());

    let http = reqwest::Client::new();
    for n in 0..4 {
        let accepted = http
            .post(push_url(gateway.addr(), "C4"))
            .body(format!("msg-{n}"))
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), reqwest::StatusCode::NO_CONTENT);
    }

    let shed = http
        .post(push_url(gateway.addr(), "C4"))
        .body("msg-4")
        .send()
        .await
        .unwrap();
    assert_eq!(shed.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(shed.text().await.unwrap().contains("fromApp channel full"));

    drop(session);
    gateway.shutdown().await;
}

#[tokio::test]
async fn unknown_target_without_cluster_is_not_found() {
    let (backend_url, _calls) = start_mock_backend().await;
    let gateway = start_gateway(
        &backend_url,
        Arc::new(ConnectionRegistry::new()),
        None,
        fixed_minter("unused"),
        |_| {},
    )
    .await;

    let response = reqwest::Client::new()
        .post(push_url(gateway.addr(), "nobody"))
        .body("lost")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    gateway.shutdown().await;
}

#[tokio::test]
async fn push_to_the_non_owning_instance_is_relayed() {
    let (backend_url, calls) = start_mock_backend().await;
    let hub = InMemoryBus::new();

    let registry_a = Arc::new(ConnectionRegistry::new());
    let router_a = Arc::new(ClusterRouter::new(Arc::new(
        hub.connect(ClusterRouter::delivery_sink(Arc::clone(&registry_a))),
    )));
    let registry_b = Arc::new(ConnectionRegistry::new());
    let router_b = Arc::new(ClusterRouter::new(Arc::new(
        hub.connect(ClusterRouter::delivery_sink(Arc::clone(&registry_b))),
    )));

    let gateway_a = start_gateway(
        &backend_url,
        registry_a,
        Some(router_a),
        fixed_minter("C5"),
        |_| {},
    )
    .await;
    let gateway_b = start_gateway(
        &backend_url,
        registry_b,
        Some(router_b),
        fixed_minter("unused"),
        |_| {},
    )
    .await;

    let (mut client, _) = connect_async(ws_url(gateway_a.addr())).await.unwrap();

    // Once the relay loop has handled a client frame, registration and the
    // bus subscription for C5 are both in place on instance A.
    client.send(Message::Text("ping".into())).await.unwrap();
    eventually("instance A owns the session", || {
        *calls.messages.lock().unwrap() == vec![("C5".to_string(), "ping".to_string())]
    })
    .await;

    let response = reqwest::Client::new()
        .post(push_url(gateway_b.addr(), "C5"))
        .body("X")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let frame = client.next().await.unwrap().unwrap();
    assert_eq!(frame.into_text().unwrap().as_str(), "X");

    client.close(None).await.unwrap();
    gateway_a.shutdown().await;
    gateway_b.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_the_active_session() {
    let (backend_url, calls) = start_mock_backend().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let gateway = start_gateway(
        &backend_url,
        Arc::clone(&registry),
        None,
        fixed_minter("C6"),
        |_| {},
    )
    .await;
    let addr = gateway.addr();

    let (_client, _) = connect_async(ws_url(addr)).await.unwrap();
    eventually("session registered", || !registry.is_empty()).await;

    gateway.shutdown().await;

    assert_eq!(*calls.disconnects.lock().unwrap(), vec!["C6".to_string()]);
    assert!(registry.is_empty());
    assert!(
        connect_async(ws_url(addr)).await.is_err(),
        "listener should be gone after shutdown"
    );
}
