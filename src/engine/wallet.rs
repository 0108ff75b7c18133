use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::api::BackendApi;
use crate::config::Config;
use crate::error::ShipperError;
use crate::models::envelope::decode_payload;
use crate::models::wallet::{
    validate_amount, validate_withdraw, BalancePayload, TransactionKind, WalletBalance,
};
use crate::observability::metrics::Metrics;
use crate::store::LocalStore;
use crate::sync::{events, Subscription, Synchronizer};

struct WalletInner {
    store: Arc<LocalStore>,
    sync: Arc<Synchronizer>,
    api: Arc<dyn BackendApi>,
    config: Config,
    metrics: Metrics,
    balance: Mutex<Option<WalletBalance>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Wallet balance cache for the logged-in courier plus deposit and withdraw.
#[derive(Clone)]
pub struct WalletController {
    inner: Arc<WalletInner>,
}

impl WalletController {
    pub fn new(
        store: Arc<LocalStore>,
        sync: Arc<Synchronizer>,
        api: Arc<dyn BackendApi>,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner: Arc::new(WalletInner {
                store,
                sync,
                api,
                config,
                metrics,
                balance: Mutex::new(None),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn attach(&self) {
        let subscriptions: Vec<Subscription> = [
            events::WALLET_BALANCE,
            events::WALLET_DEPOSIT_RESPONSE,
            events::WALLET_WITHDRAW_RESPONSE,
        ]
        .into_iter()
        .map(|event| {
            let weak: Weak<WalletInner> = Arc::downgrade(&self.inner);
            self.inner.sync.subscribe(event, move |data| {
                if let Some(inner) = weak.upgrade() {
                    WalletController { inner }.apply_push(data);
                }
            })
        })
        .collect();

        *self.subscriptions() = subscriptions;
    }

    /// Forgets the cached balance and the push handlers.
    pub fn reset(&self) {
        self.subscriptions().clear();
        *self.cached() = None;
    }

    pub fn balance(&self) -> Option<WalletBalance> {
        self.cached().clone()
    }

    pub async fn fetch_balance(&self) -> Result<WalletBalance, ShipperError> {
        let shipper_id = self.shipper_id()?;
        let amount = self.inner.api.wallet_balance(&shipper_id).await?;
        let balance = WalletBalance::new(shipper_id, amount)?;

        self.store_balance(balance.clone());
        Ok(balance)
    }

    /// Asks the backend to push `walletBalance`.
    pub async fn request_balance_push(&self) -> Result<(), ShipperError> {
        let shipper_id = self.shipper_id()?;
        self.inner
            .sync
            .emit(events::GET_WALLET_BALANCE, json!({ "shipperId": shipper_id }))
            .await
    }

    pub async fn deposit(&self, amount: f64) -> Result<WalletBalance, ShipperError> {
        let amount = validate_amount(amount)?;
        self.transact(TransactionKind::Deposit, amount).await
    }

    /// Rejects amounts above the known balance before anything is sent.
    pub async fn withdraw(&self, amount: f64) -> Result<WalletBalance, ShipperError> {
        let current = match self.balance() {
            Some(balance) => balance,
            None => self.fetch_balance().await?,
        };
        let amount = validate_withdraw(amount, current.balance)?;
        self.transact(TransactionKind::Withdraw, amount).await
    }

    async fn transact(
        &self,
        kind: TransactionKind,
        amount: f64,
    ) -> Result<WalletBalance, ShipperError> {
        let shipper_id = self.shipper_id()?;
        let (event, response_event) = match kind {
            TransactionKind::Deposit => (events::WALLET_DEPOSIT, events::WALLET_DEPOSIT_RESPONSE),
            TransactionKind::Withdraw => {
                (events::WALLET_WITHDRAW, events::WALLET_WITHDRAW_RESPONSE)
            }
        };

        let data = self
            .inner
            .sync
            .request(
                event,
                json!({ "shipperId": shipper_id, "amount": amount }),
                response_event,
                self.inner.config.request_timeout(),
            )
            .await?;
        let payload: BalancePayload = decode_payload(data)?;
        let balance = WalletBalance::new(shipper_id, payload.balance)?;

        info!(
            kind = kind.as_str(),
            amount,
            balance = balance.balance,
            "wallet transaction confirmed"
        );
        self.store_balance(balance.clone());
        Ok(balance)
    }

    fn apply_push(&self, data: Value) {
        let Ok(shipper_id) = self.shipper_id() else {
            debug!("wallet push without a session ignored");
            return;
        };
        let payload: BalancePayload = match decode_payload(data) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "undecodable wallet push");
                return;
            }
        };
        if payload
            .shipper_id
            .as_deref()
            .is_some_and(|pushed| pushed != shipper_id)
        {
            debug!("wallet push for another courier ignored");
            return;
        }

        match WalletBalance::new(shipper_id, payload.balance) {
            Ok(balance) => self.store_balance(balance),
            Err(err) => warn!(error = %err, "wallet push rejected"),
        }
    }

    fn store_balance(&self, balance: WalletBalance) {
        self.inner.metrics.wallet_balance.set(balance.balance);
        debug!(balance = balance.balance, "wallet balance updated");
        *self.cached() = Some(balance);
    }

    fn shipper_id(&self) -> Result<String, ShipperError> {
        self.inner
            .store
            .session()
            .map(|session| session.account.id)
            .ok_or(ShipperError::NotAuthenticated)
    }

    fn cached(&self) -> MutexGuard<'_, Option<WalletBalance>> {
        self.inner.balance.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
