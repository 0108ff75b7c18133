pub mod local;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ShipperError;
use crate::models::order::Order;
use crate::models::session::{PhoneCredentials, Registration, Session};

/// `DT` of `GET /api/shipper/orders/:shipperId`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipperOrders {
    #[serde(default)]
    pub active_orders: Vec<Order>,
    #[serde(default)]
    pub completed_orders: Vec<Order>,
}

/// The REST side of the backend. Every call after login carries the bearer
/// token set through [`BackendApi::set_token`].
#[async_trait]
pub trait BackendApi: Send + Sync + 'static {
    fn set_token(&self, token: Option<String>);

    async fn login_phone(&self, credentials: &PhoneCredentials) -> Result<Session, ShipperError>;

    async fn register_phone(&self, registration: &Registration) -> Result<Session, ShipperError>;

    async fn logout(&self) -> Result<(), ShipperError>;

    async fn fetch_orders(&self, shipper_id: &str) -> Result<ShipperOrders, ShipperError>;

    async fn wallet_balance(&self, shipper_id: &str) -> Result<f64, ShipperError>;

    /// Fires once per HTTP 401 seen on any call.
    fn subscribe_auth_failures(&self) -> broadcast::Receiver<()>;
}
