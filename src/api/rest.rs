use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::{BackendApi, ShipperOrders};
use crate::error::ShipperError;
use crate::models::envelope::Envelope;
use crate::models::session::{PhoneCredentials, Registration, Session};
use crate::models::wallet::BalancePayload;

const AUTH_FAILURE_BUFFER: usize = 8;

#[derive(Debug)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
    auth_failures: broadcast::Sender<()>,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ShipperError> {
        let client = Client::builder().timeout(timeout).build()?;
        let (auth_failures, _unused_rx) = broadcast::channel(AUTH_FAILURE_BUFFER);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            auth_failures,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        match token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ShipperError> {
        let request = self.authorize(self.client.get(self.url(path)));
        self.send(path, request).await
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ShipperError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let request = self.authorize(self.client.post(self.url(path)).json(body));
        self.send(path, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, ShipperError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(path, status = status.as_u16(), "rest response");

        if status == StatusCode::UNAUTHORIZED {
            warn!(path, "backend rejected the session token");
            let _ = self.auth_failures.send(());
            return Err(ShipperError::Unauthorized);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Error bodies usually still carry the envelope with a readable EM.
            if let Ok(envelope) = serde_json::from_str::<Envelope>(&text) {
                if !envelope.is_success() {
                    return envelope.into_result();
                }
            }
            return Err(ShipperError::Network(format!("{path} returned HTTP {status}")));
        }

        let envelope: Envelope = response.json().await?;
        envelope.into_result()
    }
}

#[async_trait]
impl BackendApi for RestClient {
    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    async fn login_phone(&self, credentials: &PhoneCredentials) -> Result<Session, ShipperError> {
        self.post("/api/login_phone", credentials).await
    }

    async fn register_phone(&self, registration: &Registration) -> Result<Session, ShipperError> {
        self.post("/api/register_phone", registration).await
    }

    async fn logout(&self) -> Result<(), ShipperError> {
        let _: Value = self.post("/api/logout", &Value::Null).await?;
        Ok(())
    }

    async fn fetch_orders(&self, shipper_id: &str) -> Result<ShipperOrders, ShipperError> {
        self.get(&format!("/api/shipper/orders/{shipper_id}")).await
    }

    async fn wallet_balance(&self, shipper_id: &str) -> Result<f64, ShipperError> {
        let payload: BalancePayload = self
            .get(&format!("/api/wallet/balance/{shipper_id}"))
            .await?;
        Ok(payload.balance)
    }

    fn subscribe_auth_failures(&self) -> broadcast::Receiver<()> {
        self.auth_failures.subscribe()
    }
}
