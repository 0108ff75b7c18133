//! Durable snapshot of orders and session state.
//!
//! Every write updates the in-memory snapshot before returning and queues the
//! serialized namespace to a background writer; the returned [`PersistTicket`]
//! resolves once the bytes reached the backend.

pub mod backend;
pub mod writer;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::error::ShipperError;
use crate::models::order::{Order, OrderStatus};
use crate::models::session::Session;
use crate::store::backend::{Namespace, StorageBackend};
use crate::store::writer::{run_persistence_writer, PersistCommand};

pub use crate::store::writer::PersistTicket;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrdersSnapshot {
    pub all: Vec<Order>,
    pub active: Vec<Order>,
    pub completed: Vec<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Order>,
}

impl OrdersSnapshot {
    fn upsert(&mut self, order: &Order) {
        sync_entry(&mut self.all, order, true);
        sync_entry(&mut self.active, order, order.status.is_active());
        sync_entry(
            &mut self.completed,
            order,
            order.status == OrderStatus::Delivered,
        );

        if self.current.as_ref().is_some_and(|current| current.id == order.id) {
            self.current = order.status.is_active().then(|| order.clone());
        }
    }
}

fn sync_entry(list: &mut Vec<Order>, order: &Order, belongs: bool) {
    match list.iter().position(|entry| entry.id == order.id) {
        Some(index) if belongs => list[index] = order.clone(),
        Some(index) => {
            list.remove(index);
        }
        None if belongs => list.push(order.clone()),
        None => {}
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthSnapshot {
    session: Option<Session>,
}

pub struct LocalStore {
    orders: RwLock<OrdersSnapshot>,
    session: RwLock<Option<Session>>,
    commands: mpsc::UnboundedSender<PersistCommand>,
}

impl LocalStore {
    /// Restores both namespaces from `backend` and starts the writer task.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, ShipperError> {
        let orders: OrdersSnapshot = load_namespace(backend.as_ref(), Namespace::Orders).await?;
        let auth: AuthSnapshot = load_namespace(backend.as_ref(), Namespace::Auth).await?;

        info!(
            active = orders.active.len(),
            completed = orders.completed.len(),
            has_current = orders.current.is_some(),
            has_session = auth.session.is_some(),
            "local store restored"
        );

        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_persistence_writer(backend, rx));

        Ok(Self {
            orders: RwLock::new(orders),
            session: RwLock::new(auth.session),
            commands,
        })
    }

    pub fn orders(&self) -> OrdersSnapshot {
        self.read_orders().clone()
    }

    pub fn all_orders(&self) -> Vec<Order> {
        self.read_orders().all.clone()
    }

    pub fn active_orders(&self) -> Vec<Order> {
        self.read_orders().active.clone()
    }

    pub fn completed_orders(&self) -> Vec<Order> {
        self.read_orders().completed.clone()
    }

    pub fn current_order(&self) -> Option<Order> {
        self.read_orders().current.clone()
    }

    pub fn find_order(&self, order_id: &str) -> Option<Order> {
        let orders = self.read_orders();
        orders
            .current
            .iter()
            .chain(orders.all.iter())
            .find(|order| order.id == order_id)
            .cloned()
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.session().map(|session| session.token)
    }

    /// Replaces all three collections. A current order present in `all` is
    /// refreshed from it (and dropped if it is no longer active).
    pub fn replace_orders(
        &self,
        all: Vec<Order>,
        active: Vec<Order>,
        completed: Vec<Order>,
    ) -> PersistTicket {
        let mut orders = self.write_orders();

        let current = orders.current.take().and_then(|current| {
            match all.iter().find(|order| order.id == current.id) {
                Some(fresh) if fresh.status.is_active() => Some(fresh.clone()),
                Some(_) => None,
                None => Some(current),
            }
        });

        *orders = OrdersSnapshot {
            all,
            active,
            completed,
            current,
        };
        self.persist(Namespace::Orders, &*orders)
    }

    /// Point update keyed by order id across every collection.
    pub fn upsert_order(&self, order: Order) -> PersistTicket {
        let mut orders = self.write_orders();
        orders.upsert(&order);
        self.persist(Namespace::Orders, &*orders)
    }

    pub fn set_current_order(&self, order: Option<Order>) -> PersistTicket {
        let mut orders = self.write_orders();
        if let Some(order) = &order {
            orders.upsert(order);
        }
        orders.current = order;
        self.persist(Namespace::Orders, &*orders)
    }

    pub fn set_session(&self, session: Option<Session>) -> PersistTicket {
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        *guard = session;
        let snapshot = AuthSnapshot {
            session: guard.clone(),
        };
        self.persist(Namespace::Auth, &snapshot)
    }

    /// Drops every order and the session, in memory and on disk.
    pub fn clear(&self) -> PersistTicket {
        let mut orders = self.write_orders();
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        *orders = OrdersSnapshot::default();
        *session = None;

        self.submit(|done| PersistCommand::Remove {
            namespace: Namespace::Auth,
            done,
        });
        self.submit(|done| PersistCommand::Remove {
            namespace: Namespace::Orders,
            done,
        })
    }

    /// Waits until every write queued so far has completed.
    pub async fn flush(&self) -> Result<(), ShipperError> {
        self.submit(|done| PersistCommand::Flush { done })
            .persisted()
            .await
    }

    fn persist<T: Serialize>(&self, namespace: Namespace, snapshot: &T) -> PersistTicket {
        match serde_json::to_vec(snapshot) {
            Ok(bytes) => self.submit(|done| PersistCommand::Save {
                namespace,
                bytes,
                done,
            }),
            Err(err) => PersistTicket::failed(ShipperError::Storage(format!(
                "failed to encode {}: {err}",
                namespace.storage_key()
            ))),
        }
    }

    fn submit(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), ShipperError>>) -> PersistCommand,
    ) -> PersistTicket {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(command(tx)).is_err() {
            return PersistTicket::failed(ShipperError::Storage(
                "persistence writer stopped".to_string(),
            ));
        }
        PersistTicket::new(rx)
    }

    fn read_orders(&self) -> RwLockReadGuard<'_, OrdersSnapshot> {
        self.orders.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_orders(&self) -> RwLockWriteGuard<'_, OrdersSnapshot> {
        self.orders.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn load_namespace<T>(backend: &dyn StorageBackend, namespace: Namespace) -> Result<T, ShipperError>
where
    T: DeserializeOwned + Default,
{
    let Some(bytes) = backend.load(namespace).await? else {
        return Ok(T::default());
    };

    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Ok(snapshot),
        Err(err) => {
            warn!(
                namespace = namespace.storage_key(),
                error = %err,
                "discarding unreadable snapshot"
            );
            Ok(T::default())
        }
    }
}
