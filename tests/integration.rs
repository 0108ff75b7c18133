use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Query;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use shipper_sync::api::local::router;
use shipper_sync::api::rest::RestClient;
use shipper_sync::config::Config;
use shipper_sync::engine::controller::FetchOutcome;
use shipper_sync::engine::offer::LogNotifier;
use shipper_sync::error::ShipperError;
use shipper_sync::models::order::OrderStatus;
use shipper_sync::state::ClientState;
use shipper_sync::store::backend::MemoryBackend;
use shipper_sync::sync::frame::Frame;
use shipper_sync::sync::memory::{memory_transport, MemoryPeer};
use shipper_sync::sync::transport::WsConnector;

const TOKEN: &str = "jwt-shipper-42";

fn mock_backend() -> Router {
    Router::new()
        .route("/api/login_phone", post(login_phone))
        .route("/api/shipper/orders/:id", get(shipper_orders))
        .route("/api/wallet/balance/:id", get(wallet_balance))
        .route("/api/logout", post(|| async { Json(json!({ "EC": "0", "EM": "", "DT": "" })) }))
        .route("/socket", get(socket))
}

async fn login_phone(Json(body): Json<Value>) -> Json<Value> {
    if body["phone"] == "0901234567" && body["password"] == "secret123" {
        Json(json!({
            "EC": "0",
            "EM": "Login succeeded",
            "DT": {
                "access_token": TOKEN,
                "account": { "_id": "shipper-42", "phoneNumber": "0901234567", "fullName": "Minh" }
            }
        }))
    } else {
        Json(json!({ "EC": "1", "EM": "Wrong phone number or password", "DT": "" }))
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer jwt-shipper-42")
}

async fn shipper_orders(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "EC": "0",
        "EM": "",
        "DT": {
            "activeOrders": [{
                "_id": "ord-1",
                "orderStatus": "delivering",
                "shipperId": "shipper-42",
                "deliveryAddress": "12 Nguyễn Huệ, Quận 1"
            }],
            "completedOrders": []
        }
    }))
    .into_response()
}

async fn wallet_balance(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "EC": "0", "EM": "", "DT": { "balance": 100000 } })).into_response()
}

async fn socket(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = params.get("token").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| serve_socket(socket, token))
}

/// Pushes one offer on connect and confirms every accept.
async fn serve_socket(mut socket: WebSocket, token: String) {
    if token != TOKEN {
        let _ = socket.close().await;
        return;
    }

    let offer = Frame::new(
        "new_order_assigned",
        json!({ "_id": "ord-ws-1", "restaurant": { "name": "Phở 24" } }),
    );
    if socket
        .send(Message::Text(offer.encode().unwrap()))
        .await
        .is_err()
    {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = Frame::decode(&text) else {
            continue;
        };
        if frame.event == "accept_order" {
            let mut reply = Frame::new(
                "order_response",
                json!({
                    "EC": "0",
                    "EM": "",
                    "DT": { "orderId": frame.data["orderId"], "shipperId": "shipper-42" }
                }),
            );
            reply.cid = frame.cid;
            if socket
                .send(Message::Text(reply.encode().unwrap()))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

async fn spawn_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mock_backend()).await.unwrap();
    });
    format!("127.0.0.1:{}", addr.port())
}

async fn ws_client(addr: &str) -> Arc<ClientState> {
    let config = Config {
        api_base_url: format!("http://{addr}"),
        socket_url: format!("ws://{addr}/socket"),
        ..Config::default()
    };
    let api = Arc::new(RestClient::new(&config.api_base_url, Duration::from_secs(5)).unwrap());
    let connector = Arc::new(WsConnector::new(config.socket_url.clone()));

    let state = ClientState::new(
        config,
        Arc::new(MemoryBackend::new()),
        connector,
        api,
        Arc::new(LogNotifier),
    )
    .await
    .unwrap();
    Arc::new(state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn login_then_fetch_partitions_orders() {
    let addr = spawn_backend().await;
    let state = ws_client(&addr).await;

    let session = state.login("0901234567", "secret123").await.unwrap();
    assert_eq!(session.shipper_id(), "shipper-42");

    let outcome = state.orders.fetch_orders("shipper-42").await.unwrap();
    assert_eq!(
        outcome,
        FetchOutcome::Loaded {
            active: 1,
            completed: 0
        }
    );

    let active = state.store.active_orders();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].status, OrderStatus::Delivering);
    assert_eq!(
        active[0].delivery_address.as_ref().unwrap().full,
        "12 Nguyễn Huệ, Quận 1"
    );
    assert!(state.store.completed_orders().is_empty());

    state.shutdown().await;
}

#[tokio::test]
async fn wrong_password_is_reported_with_backend_message() {
    let addr = spawn_backend().await;
    let state = ws_client(&addr).await;
    let app = router(state.clone());

    let response = app
        .oneshot(json_request(
            "POST",
            "/session/login",
            json!({ "phone": "0901234567", "password": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Wrong phone number or password");
    assert!(state.store.session().is_none());
}

#[tokio::test]
async fn websocket_offer_is_accepted_through_local_api() {
    let addr = spawn_backend().await;
    let state = ws_client(&addr).await;
    let app = router(state.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/session/login",
            json!({ "phone": "0901234567", "password": "secret123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    eventually(|| state.orders.current_offer().is_some()).await;

    let response = app
        .clone()
        .oneshot(get_request("/offers/current"))
        .await
        .unwrap();
    let offer = body_json(response).await;
    assert_eq!(offer["order"]["id"], "ord-ws-1");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/offers/ord-ws-1/accept", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let order = body_json(response).await;
    assert_eq!(order["orderStatus"], "goingToRestaurant");
    assert_eq!(order["shipperId"], "shipper-42");

    let response = app.oneshot(get_request("/orders/current")).await.unwrap();
    assert_eq!(body_json(response).await["id"], "ord-ws-1");

    state.shutdown().await;
}

#[tokio::test]
async fn local_api_rejects_overdraft_and_unknown_offer() {
    let addr = spawn_backend().await;
    let state = ws_client(&addr).await;
    state.login("0901234567", "secret123").await.unwrap();
    let app = router(state.clone());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/wallet/withdraw", json!({ "amount": "200,000" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("100000"));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/offers/nope/accept", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders/ord-1/status",
            json!({ "status": "delivered" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["connection"]["state"], "connected");

    state.shutdown().await;
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let addr = spawn_backend().await;
    let state = ws_client(&addr).await;
    let app = router(state);

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}

async fn memory_client(addr: &str) -> (Arc<ClientState>, MemoryPeer) {
    let config = Config {
        api_base_url: format!("http://{addr}"),
        ..Config::default()
    };
    let api = Arc::new(RestClient::new(&config.api_base_url, Duration::from_secs(5)).unwrap());
    let (connector, mut server) = memory_transport();

    let state = Arc::new(
        ClientState::new(
            config,
            Arc::new(MemoryBackend::new()),
            Arc::new(connector),
            api,
            Arc::new(LogNotifier),
        )
        .await
        .unwrap(),
    );
    state.login("0901234567", "secret123").await.unwrap();
    let mut peer = server.accept().await.unwrap();
    let balance_request = peer.recv().await.unwrap();
    assert_eq!(balance_request.event, "getWalletBalance");
    (state, peer)
}

#[tokio::test]
async fn only_one_of_two_couriers_gets_the_order() {
    let addr = spawn_backend().await;
    let (first, mut first_peer) = memory_client(&addr).await;
    let (second, mut second_peer) = memory_client(&addr).await;

    let offer = json!({ "_id": "ord-race" });
    first_peer.push("new_order_assigned", offer.clone()).await.unwrap();
    second_peer.push("new_order_assigned", offer).await.unwrap();
    eventually(|| first.orders.current_offer().is_some()).await;
    eventually(|| second.orders.current_offer().is_some()).await;

    // The backend assigns the order to whichever accept it sees first.
    let arbiter = async {
        let first_request = first_peer.recv().await.unwrap();
        let second_request = second_peer.recv().await.unwrap();
        first_peer
            .reply(
                &first_request,
                "order_response",
                json!({ "EC": "0", "EM": "", "DT": { "orderId": "ord-race", "shipperId": "shipper-42" } }),
            )
            .await
            .unwrap();
        second_peer
            .reply(
                &second_request,
                "order_response",
                json!({ "EC": "3", "EM": "This order has already been assigned", "DT": null }),
            )
            .await
            .unwrap();
    };

    let (won, lost, _) = tokio::join!(
        first.orders.accept("ord-race"),
        second.orders.accept("ord-race"),
        arbiter
    );

    assert_eq!(won.unwrap().id, "ord-race");
    assert!(matches!(lost, Err(ShipperError::AlreadyAssigned(Some(_)))));
    assert!(first.orders.current_order().is_some());
    assert!(second.orders.current_order().is_none());
    assert!(second.orders.current_offer().is_none());
}
