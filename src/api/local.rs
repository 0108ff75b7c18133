//! Local control surface of the courier agent: read-only views of the store
//! plus the courier actions a UI would trigger.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::engine::controller::FetchOutcome;
use crate::engine::offer::PendingOffer;
use crate::error::ShipperError;
use crate::geo::GeoPoint;
use crate::models::order::{Order, OrderStatus};
use crate::models::session::Account;
use crate::models::wallet::{parse_amount, WalletBalance};
use crate::state::ClientState;
use crate::sync::ConnectionState;

pub fn router(state: Arc<ClientState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/session/login", post(login))
        .route("/session/logout", post(logout))
        .route("/orders/current", get(current_order))
        .route("/orders/active", get(active_orders))
        .route("/orders/completed", get(completed_orders))
        .route("/orders/refresh", post(refresh_orders))
        .route("/orders/:id/status", post(advance_status))
        .route("/offers/current", get(current_offer))
        .route("/offers/:id/accept", post(accept_offer))
        .route("/offers/:id/decline", post(decline_offer))
        .route("/online", post(set_online))
        .route("/location", post(report_location))
        .route("/wallet", get(wallet_balance))
        .route("/wallet/deposit", post(deposit))
        .route("/wallet/withdraw", post(withdraw))
        .route("/wallet/refresh", post(refresh_wallet))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    connection: ConnectionState,
    authenticated: bool,
    online: bool,
    active_orders: usize,
    completed_orders: usize,
    has_offer: bool,
}

async fn health(State(state): State<Arc<ClientState>>) -> Json<HealthResponse> {
    let orders = state.store.orders();
    Json(HealthResponse {
        status: "ok",
        connection: state.sync.state(),
        authenticated: state.store.session().is_some(),
        online: state.orders.is_online(),
        active_orders: orders.active.len(),
        completed_orders: orders.completed.len(),
        has_offer: state.orders.current_offer().is_some(),
    })
}

async fn metrics(State(state): State<Arc<ClientState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

async fn login(
    State(state): State<Arc<ClientState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Account>, ShipperError> {
    let session = state.login(&payload.phone, &payload.password).await?;
    Ok(Json(session.account))
}

async fn logout(State(state): State<Arc<ClientState>>) -> Result<StatusCode, ShipperError> {
    state.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_order(State(state): State<Arc<ClientState>>) -> Result<Json<Order>, ShipperError> {
    let order = state.orders.current_order().ok_or(ShipperError::NoCurrentOrder)?;
    Ok(Json(order))
}

async fn active_orders(State(state): State<Arc<ClientState>>) -> Json<Vec<Order>> {
    Json(state.store.active_orders())
}

async fn completed_orders(State(state): State<Arc<ClientState>>) -> Json<Vec<Order>> {
    Json(state.store.completed_orders())
}

async fn refresh_orders(
    State(state): State<Arc<ClientState>>,
) -> Result<Json<FetchOutcome>, ShipperError> {
    let shipper_id = state.shipper_id().ok_or(ShipperError::NotAuthenticated)?;
    let outcome = state.orders.fetch_orders(&shipper_id).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

async fn advance_status(
    State(state): State<Arc<ClientState>>,
    Path(id): Path<String>,
    Json(payload): Json<AdvanceStatusRequest>,
) -> Result<Json<Order>, ShipperError> {
    let order = state.orders.advance_status(&id, payload.status).await?;
    Ok(Json(order))
}

async fn current_offer(State(state): State<Arc<ClientState>>) -> Json<Option<PendingOffer>> {
    Json(state.orders.current_offer())
}

async fn accept_offer(
    State(state): State<Arc<ClientState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ShipperError> {
    let order = state.orders.accept(&id).await?;
    Ok(Json(order))
}

async fn decline_offer(
    State(state): State<Arc<ClientState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ShipperError> {
    state.orders.decline(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Serialize)]
pub struct OnlineRequest {
    pub online: bool,
}

async fn set_online(
    State(state): State<Arc<ClientState>>,
    Json(payload): Json<OnlineRequest>,
) -> Result<Json<OnlineRequest>, ShipperError> {
    let online = state.orders.set_online(payload.online).await?;
    Ok(Json(OnlineRequest { online }))
}

#[derive(Serialize)]
struct LocationResponse {
    reported: bool,
}

async fn report_location(
    State(state): State<Arc<ClientState>>,
    Json(point): Json<GeoPoint>,
) -> Result<Json<LocationResponse>, ShipperError> {
    let reported = state.orders.report_location(point).await?;
    Ok(Json(LocationResponse { reported }))
}

async fn wallet_balance(
    State(state): State<Arc<ClientState>>,
) -> Result<Json<WalletBalance>, ShipperError> {
    let balance = match state.wallet.balance() {
        Some(balance) => balance,
        None => state.wallet.fetch_balance().await?,
    };
    Ok(Json(balance))
}

async fn refresh_wallet(State(state): State<Arc<ClientState>>) -> Result<StatusCode, ShipperError> {
    state.wallet.request_balance_push().await?;
    Ok(StatusCode::ACCEPTED)
}

/// Amounts come from a text field as often as from a number input.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    fn resolve(self) -> Result<f64, ShipperError> {
        match self {
            AmountInput::Number(amount) => Ok(amount),
            AmountInput::Text(raw) => parse_amount(&raw),
        }
    }
}

#[derive(Deserialize)]
pub struct TransactionRequest {
    pub amount: AmountInput,
}

async fn deposit(
    State(state): State<Arc<ClientState>>,
    Json(payload): Json<TransactionRequest>,
) -> Result<Json<WalletBalance>, ShipperError> {
    let balance = state.wallet.deposit(payload.amount.resolve()?).await?;
    Ok(Json(balance))
}

async fn withdraw(
    State(state): State<Arc<ClientState>>,
    Json(payload): Json<TransactionRequest>,
) -> Result<Json<WalletBalance>, ShipperError> {
    let balance = state.wallet.withdraw(payload.amount.resolve()?).await?;
    Ok(Json(balance))
}
