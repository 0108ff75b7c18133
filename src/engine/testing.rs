//! Shared fixtures for the controller tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use crate::api::{BackendApi, ShipperOrders};
use crate::config::Config;
use crate::error::ShipperError;
use crate::models::order::{Order, OrderStatus};
use crate::models::session::{Account, PhoneCredentials, Registration, Session};
use crate::observability::metrics::Metrics;
use crate::store::backend::MemoryBackend;
use crate::store::LocalStore;
use crate::sync::memory::{memory_transport, MemoryPeer, MemoryServer};
use crate::sync::{SyncConfig, Synchronizer};

pub(crate) const SHIPPER_ID: &str = "shipper-42";

pub(crate) struct StubApi {
    pub orders: Mutex<ShipperOrders>,
    pub balance: Mutex<f64>,
    pub token: Mutex<Option<String>>,
    pub fetch_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub fetch_gate: Mutex<Option<Arc<Notify>>>,
    auth_failures: broadcast::Sender<()>,
}

impl StubApi {
    pub fn new() -> Self {
        let (auth_failures, _unused_rx) = broadcast::channel(4);
        Self {
            orders: Mutex::new(ShipperOrders::default()),
            balance: Mutex::new(0.0),
            token: Mutex::new(None),
            fetch_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            fetch_gate: Mutex::new(None),
            auth_failures,
        }
    }

    pub fn fail_auth(&self) {
        let _ = self.auth_failures.send(());
    }
}

#[async_trait]
impl BackendApi for StubApi {
    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    async fn login_phone(&self, credentials: &PhoneCredentials) -> Result<Session, ShipperError> {
        if credentials.phone == "0901234567" && credentials.password == "secret123" {
            Ok(session(SHIPPER_ID))
        } else {
            Err(ShipperError::Application {
                code: "1".to_string(),
                message: "Wrong phone number or password".to_string(),
            })
        }
    }

    async fn register_phone(&self, registration: &Registration) -> Result<Session, ShipperError> {
        let mut session = session("shipper-new");
        session.account.phone = registration.phone.clone();
        session.account.name = registration.name.clone();
        Ok(session)
    }

    async fn logout(&self) -> Result<(), ShipperError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Err(ShipperError::Network("backend unreachable".to_string()))
    }

    async fn fetch_orders(&self, _shipper_id: &str) -> Result<ShipperOrders, ShipperError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.fetch_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn wallet_balance(&self, _shipper_id: &str) -> Result<f64, ShipperError> {
        Ok(*self.balance.lock().unwrap())
    }

    fn subscribe_auth_failures(&self) -> broadcast::Receiver<()> {
        self.auth_failures.subscribe()
    }
}

pub(crate) fn session(shipper_id: &str) -> Session {
    Session {
        token: format!("jwt-{shipper_id}"),
        account: Account {
            id: shipper_id.to_string(),
            phone: "0901234567".to_string(),
            name: "Minh".to_string(),
            email: None,
            avatar: None,
        },
    }
}

pub(crate) fn assigned_order(id: &str, status: OrderStatus) -> Order {
    Order::new(id).with_status(status).with_shipper(SHIPPER_ID)
}

pub(crate) struct Harness {
    pub store: Arc<LocalStore>,
    pub backend: MemoryBackend,
    pub sync: Arc<Synchronizer>,
    pub server: MemoryServer,
    pub peer: MemoryPeer,
    pub api: Arc<StubApi>,
    pub metrics: Metrics,
    pub config: Config,
}

/// A logged-in courier with a live in-memory socket.
pub(crate) async fn harness() -> Harness {
    let backend = MemoryBackend::new();
    let store = Arc::new(LocalStore::open(Arc::new(backend.clone())).await.unwrap());
    store.set_session(Some(session(SHIPPER_ID)));

    let metrics = Metrics::new();
    let (connector, mut server) = memory_transport();
    let sync = Arc::new(Synchronizer::new(
        Arc::new(connector),
        SyncConfig::default(),
        metrics.clone(),
    ));
    sync.connect("jwt-shipper-42").await.unwrap();
    let peer = server.accept().await.unwrap();

    Harness {
        store,
        backend,
        sync,
        server,
        peer,
        api: Arc::new(StubApi::new()),
        metrics,
        config: Config::default(),
    }
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
