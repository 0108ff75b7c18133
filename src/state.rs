use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::BackendApi;
use crate::config::Config;
use crate::engine::controller::OrderController;
use crate::engine::offer::OfferNotifier;
use crate::engine::session::SessionManager;
use crate::engine::wallet::WalletController;
use crate::error::ShipperError;
use crate::models::session::Session;
use crate::observability::metrics::Metrics;
use crate::store::backend::StorageBackend;
use crate::store::LocalStore;
use crate::sync::transport::Connector;
use crate::sync::Synchronizer;

/// Everything one courier client needs, wired together once at startup.
pub struct ClientState {
    pub config: Config,
    pub store: Arc<LocalStore>,
    pub sync: Arc<Synchronizer>,
    pub api: Arc<dyn BackendApi>,
    pub orders: OrderController,
    pub wallet: WalletController,
    pub session: SessionManager,
    pub metrics: Metrics,
    auth_watch: Mutex<Option<JoinHandle<()>>>,
}

impl ClientState {
    pub async fn new(
        config: Config,
        backend: Arc<dyn StorageBackend>,
        connector: Arc<dyn Connector>,
        api: Arc<dyn BackendApi>,
        notifier: Arc<dyn OfferNotifier>,
    ) -> Result<Self, ShipperError> {
        let metrics = Metrics::new();
        let store = Arc::new(LocalStore::open(backend).await?);
        let sync = Arc::new(Synchronizer::new(
            connector,
            config.sync_config(),
            metrics.clone(),
        ));

        let orders = OrderController::new(
            store.clone(),
            sync.clone(),
            api.clone(),
            notifier,
            config.clone(),
            metrics.clone(),
        );
        let wallet = WalletController::new(
            store.clone(),
            sync.clone(),
            api.clone(),
            config.clone(),
            metrics.clone(),
        );
        let session = SessionManager::new(store.clone(), sync.clone(), api.clone());

        let orders_snapshot = store.orders();
        metrics.set_order_partitions(orders_snapshot.active.len(), orders_snapshot.completed.len());

        Ok(Self {
            config,
            store,
            sync,
            api,
            orders,
            wallet,
            session,
            metrics,
            auth_watch: Mutex::new(None),
        })
    }

    /// Restores a persisted session and, if there is one, opens the socket.
    /// Returns whether a session is active.
    pub async fn start(self: &Arc<Self>) -> bool {
        self.watch_auth_failures();

        match self.session.restore() {
            Some(session) => {
                self.open_session(&session).await;
                true
            }
            None => {
                info!("no persisted session; waiting for login");
                false
            }
        }
    }

    pub async fn login(
        self: &Arc<Self>,
        phone: &str,
        password: &str,
    ) -> Result<Session, ShipperError> {
        let session = self.session.login_phone(phone, password).await?;
        self.watch_auth_failures();
        self.open_session(&session).await;
        Ok(session)
    }

    pub async fn logout(&self) -> Result<(), ShipperError> {
        self.orders.reset();
        self.wallet.reset();
        self.session.logout().await
    }

    pub fn shipper_id(&self) -> Option<String> {
        self.store.session().map(|session| session.account.id)
    }

    pub async fn shutdown(&self) {
        if let Some(watch) = self
            .auth_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watch.abort();
        }
        self.orders.detach();
        self.sync.disconnect();
        if let Err(err) = self.store.flush().await {
            error!(error = %err, "failed to flush local store on shutdown");
        }
        info!("client shut down");
    }

    async fn open_session(&self, session: &Session) {
        self.orders.attach();
        self.wallet.attach();

        // The store keeps serving cached data while offline; the driver
        // retries on its own once a link was established.
        if let Err(err) = self.sync.connect(&session.token).await {
            warn!(shipper_id = session.shipper_id(), error = %err, "socket connect failed");
            return;
        }
        if let Err(err) = self.wallet.request_balance_push().await {
            warn!(shipper_id = session.shipper_id(), error = %err, "wallet balance request failed");
        }
    }

    async fn expire_session(&self) {
        self.orders.reset();
        self.wallet.reset();
        if let Err(err) = self.session.expire().await {
            error!(error = %err, "failed to clear expired session");
        }
    }

    fn watch_auth_failures(self: &Arc<Self>) {
        let mut watch = self
            .auth_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if watch.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let mut failures = self.api.subscribe_auth_failures();
        let state: Weak<ClientState> = Arc::downgrade(self);
        *watch = Some(tokio::spawn(async move {
            loop {
                match failures.recv().await {
                    Ok(()) => {
                        let Some(state) = state.upgrade() else {
                            return;
                        };
                        if state.store.session().is_some() {
                            state.expire_session().await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth failure notifications lagged");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }));
    }
}
