//! Client-side order lifecycle: offers, acceptance, status advancement and
//! the order collections fetched from the backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::api::{BackendApi, ShipperOrders};
use crate::config::Config;
use crate::engine::offer::{OfferNotifier, OfferOutcome, PendingOffer};
use crate::error::ShipperError;
use crate::geo::{haversine_km, GeoPoint, LocationThrottle};
use crate::models::envelope::unwrap_payload;
use crate::models::order::{Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::store::{LocalStore, PersistTicket};
use crate::sync::{events, Subscription, Synchronizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Loaded { active: usize, completed: usize },
    /// Another fetch was already running; nothing was requested.
    AlreadyLoading,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPartition {
    pub all: Vec<Order>,
    pub active: Vec<Order>,
    pub completed: Vec<Order>,
}

/// Merges both backend lists into one list without duplicate ids (later
/// entries win) and splits it by status. Canceled orders stay in `all` only.
pub fn partition_orders(orders: ShipperOrders) -> OrderPartition {
    let mut all: Vec<Order> = Vec::new();
    for order in orders
        .active_orders
        .into_iter()
        .chain(orders.completed_orders)
    {
        match all.iter().position(|existing| existing.id == order.id) {
            Some(index) => all[index] = order,
            None => all.push(order),
        }
    }

    let active = all
        .iter()
        .filter(|order| order.status.is_active())
        .cloned()
        .collect();
    let completed = all
        .iter()
        .filter(|order| order.status == OrderStatus::Delivered)
        .cloned()
        .collect();

    OrderPartition {
        all,
        active,
        completed,
    }
}

/// Order documents arrive either bare or as `{ "order": {...} }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrderDocument {
    Wrapped { order: Order },
    Bare(Order),
}

impl OrderDocument {
    fn decode(data: Value) -> Result<Option<Order>, ShipperError> {
        let data = unwrap_payload(data)?;
        if data.is_null() {
            return Ok(None);
        }
        let document: OrderDocument = serde_json::from_value(data)?;
        Ok(Some(match document {
            OrderDocument::Wrapped { order } | OrderDocument::Bare(order) => order,
        }))
    }

    /// Decodes a status document. Documents without an order id decode to
    /// `None`; `has_status` is false when the document omits the status.
    fn decode_update(data: Value) -> Result<Option<OrderUpdate>, ShipperError> {
        let data = unwrap_payload(data)?;
        let body = document_body(&data);
        if document_order_id(body).is_none() {
            return Ok(None);
        }
        let has_status = STATUS_KEYS
            .iter()
            .any(|key| body.get(key).is_some_and(|status| !status.is_null()));

        Ok(Self::decode(data)?.map(|order| OrderUpdate { order, has_status }))
    }
}

struct OrderUpdate {
    order: Order,
    has_status: bool,
}

const ORDER_ID_KEYS: [&str; 3] = ["_id", "id", "orderId"];
const STATUS_KEYS: [&str; 2] = ["orderStatus", "status"];

fn document_body(data: &Value) -> &Value {
    data.get("order")
        .filter(|order| order.is_object())
        .unwrap_or(data)
}

fn document_order_id(body: &Value) -> Option<&str> {
    ORDER_ID_KEYS
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
}

/// Whether an uncorrelated `status_update_response` answers an update of
/// `order_id`. Documents naming another order are pushes.
fn answers_status_update(data: &Value, order_id: &str) -> bool {
    match unwrap_payload(data.clone()) {
        Ok(document) => {
            document_order_id(document_body(&document)).is_none_or(|id| id == order_id)
        }
        Err(_) => true,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptConfirmation {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    shipper_id: Option<String>,
    #[serde(default)]
    order: Option<Order>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnlineStatus {
    #[serde(default)]
    shipper_id: Option<String>,
    #[serde(alias = "online", alias = "status")]
    is_online: bool,
}

struct OfferSlot {
    seq: u64,
    offer: PendingOffer,
    accepting: bool,
    countdown: Option<JoinHandle<()>>,
}

impl OfferSlot {
    fn stop_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.abort();
        }
    }
}

struct ControllerInner {
    store: Arc<LocalStore>,
    sync: Arc<Synchronizer>,
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn OfferNotifier>,
    config: Config,
    metrics: Metrics,
    offer: Mutex<Option<OfferSlot>>,
    next_offer_seq: AtomicU64,
    loading: AtomicBool,
    online: AtomicBool,
    throttle: Mutex<LocationThrottle>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(slot) = self
            .offer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            slot.stop_countdown();
        }
    }
}

/// Clears the single-flight flag when the fetch ends, however it ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct OrderController {
    inner: Arc<ControllerInner>,
}

impl OrderController {
    pub fn new(
        store: Arc<LocalStore>,
        sync: Arc<Synchronizer>,
        api: Arc<dyn BackendApi>,
        notifier: Arc<dyn OfferNotifier>,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        let throttle = LocationThrottle::new(
            config.location_min_distance_m,
            config.location_min_interval(),
        );

        Self {
            inner: Arc::new(ControllerInner {
                store,
                sync,
                api,
                notifier,
                config,
                metrics,
                offer: Mutex::new(None),
                next_offer_seq: AtomicU64::new(1),
                loading: AtomicBool::new(false),
                online: AtomicBool::new(false),
                throttle: Mutex::new(throttle),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers the push handlers this controller owns. Calling it again
    /// replaces the previous registration.
    pub fn attach(&self) {
        let handlers = vec![
            self.handler(events::NEW_ORDER_ASSIGNED, |controller, data| {
                match OrderDocument::decode(data) {
                    Ok(Some(order)) => {
                        controller.present_offer(order);
                    }
                    Ok(None) => warn!("new_order_assigned without an order"),
                    Err(err) => warn!(error = %err, "undecodable new_order_assigned payload"),
                }
            }),
            self.handler(events::STATUS_UPDATE_RESPONSE, |controller, data| {
                controller.apply_server_push(data);
            }),
            self.handler(events::ONLINE_STATUS_RESPONSE, |controller, data| {
                controller.apply_online_echo(data);
            }),
            self.handler(events::SHIPPER_STATUS_UPDATED, |controller, data| {
                controller.apply_online_echo(data);
            }),
        ];

        *self.subscriptions() = handlers;
        debug!("order controller attached");
    }

    pub fn detach(&self) {
        self.subscriptions().clear();
    }

    /// Drops the pending offer without telling the backend. Used when the
    /// session ends and the socket is already gone.
    pub fn reset(&self) {
        self.detach();
        if let Some(mut slot) = self.offer_slot().take() {
            slot.stop_countdown();
        }
        self.inner.online.store(false, Ordering::Release);
        self.throttle().reset();
    }

    pub fn current_offer(&self) -> Option<PendingOffer> {
        self.offer_slot().as_ref().map(|slot| slot.offer.clone())
    }

    pub fn current_order(&self) -> Option<Order> {
        self.inner.store.current_order()
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::Acquire)
    }

    /// Shows `order` to the courier and starts the acceptance countdown.
    /// Expiry declines the offer. An offer still pending is superseded and
    /// declined; while an accept is in flight the new offer is declined instead.
    pub fn present_offer(&self, order: Order) -> Option<PendingOffer> {
        if let Some(pending) = self
            .offer_slot()
            .as_ref()
            .filter(|slot| slot.offer.order.id == order.id)
        {
            debug!(order_id = %order.id, "duplicate offer ignored");
            return Some(pending.offer.clone());
        }
        if self
            .inner
            .store
            .current_order()
            .is_some_and(|current| current.id == order.id)
        {
            debug!(order_id = %order.id, "offer for the current order ignored");
            return None;
        }

        let now = Utc::now();
        let window = self.inner.config.offer_window();
        let distance_km = self.throttle().last_seen().and_then(|courier| {
            order
                .restaurant
                .as_ref()
                .and_then(|restaurant| restaurant.position())
                .map(|restaurant| haversine_km(&courier, &restaurant))
        });
        let offer = PendingOffer {
            received_at: now,
            expires_at: now
                + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero()),
            distance_km,
            order,
        };

        let seq = self.inner.next_offer_seq.fetch_add(1, Ordering::Relaxed);
        let superseded = {
            let mut slot = self.offer_slot();
            if slot.as_ref().is_some_and(|slot| slot.accepting) {
                drop(slot);
                warn!(order_id = %offer.order.id, "accept in flight; declining new offer");
                self.record_offer(&offer.order.id, OfferOutcome::Superseded);
                self.spawn_decline(offer.order.id.clone());
                return None;
            }

            let weak = Arc::downgrade(&self.inner);
            let countdown = tokio::spawn(async move {
                sleep(window).await;
                if let Some(inner) = weak.upgrade() {
                    OrderController { inner }.expire(seq);
                }
            });

            slot.replace(OfferSlot {
                seq,
                offer: offer.clone(),
                accepting: false,
                countdown: Some(countdown),
            })
        };

        if let Some(mut previous) = superseded {
            previous.stop_countdown();
            let previous_id = previous.offer.order.id;
            info!(order_id = %previous_id, "pending offer superseded");
            self.record_offer(&previous_id, OfferOutcome::Superseded);
            self.spawn_decline(previous_id);
        }

        self.inner.notifier.offer_presented(&offer);
        Some(offer)
    }

    /// Claims the pending offer for this courier.
    pub async fn accept(&self, order_id: &str) -> Result<Order, ShipperError> {
        let shipper_id = self.shipper_id()?;

        let seq = {
            let mut slot = self.offer_slot();
            match slot.as_mut() {
                Some(slot) if slot.offer.order.id != order_id => {
                    return Err(ShipperError::OfferNotFound(order_id.to_string()));
                }
                Some(slot) if slot.accepting => return Err(ShipperError::AlreadyAssigned(None)),
                Some(slot) => {
                    slot.accepting = true;
                    slot.stop_countdown();
                    slot.seq
                }
                None => return Err(ShipperError::OfferNotFound(order_id.to_string())),
            }
        };

        let response = self
            .inner
            .sync
            .request(
                events::ACCEPT_ORDER,
                json!({ "orderId": order_id, "shipperId": shipper_id }),
                events::ORDER_RESPONSE,
                self.inner.config.request_timeout(),
            )
            .await;

        let slot = {
            let mut slot = self.offer_slot();
            if slot.as_ref().is_some_and(|slot| slot.seq == seq) {
                slot.take()
            } else {
                None
            }
        };
        let Some(slot) = slot else {
            warn!(order_id, "offer disappeared while accepting");
            return Err(ShipperError::OfferNotFound(order_id.to_string()));
        };

        let confirmation = response.and_then(|data| {
            let data = unwrap_payload(data)?;
            if data.is_null() {
                return Ok(AcceptConfirmation::default());
            }
            Ok(serde_json::from_value::<AcceptConfirmation>(data)?)
        });
        let confirmation = match confirmation {
            Ok(confirmation) => confirmation,
            Err(err) => {
                warn!(order_id, error = %err, "accept rejected");
                self.record_offer(order_id, OfferOutcome::Rejected);
                return Err(match err {
                    ShipperError::Application { message, .. } => {
                        ShipperError::AlreadyAssigned(Some(message))
                    }
                    other => other,
                });
            }
        };

        let confirmed_id = confirmation
            .order_id
            .as_deref()
            .or(confirmation.order.as_ref().map(|order| order.id.as_str()));
        if let Some(confirmed_id) = confirmed_id.filter(|id| *id != order_id) {
            warn!(order_id, confirmed_id, "ignoring accept confirmation for another order");
            self.record_offer(order_id, OfferOutcome::Rejected);
            return Err(ShipperError::OrderMismatch {
                requested: order_id.to_string(),
                current: confirmed_id.to_string(),
            });
        }

        let mut order = confirmation.order.unwrap_or(slot.offer.order);
        order.status = OrderStatus::GoingToRestaurant;
        order.shipper_id = Some(confirmation.shipper_id.unwrap_or(shipper_id));
        order.updated_at = Some(Utc::now());

        let ticket = self.inner.store.set_current_order(Some(order.clone()));
        self.refresh_partition_gauges();
        self.record_offer(order_id, OfferOutcome::Accepted);
        self.inner.notifier.order_accepted(&order);
        info!(order_id, "order accepted");

        await_persisted(ticket, order_id).await;
        Ok(order)
    }

    /// Drops the pending offer and tells the backend. Emission failures are
    /// logged only; the offer is gone either way.
    pub async fn decline(&self, order_id: &str) -> Result<(), ShipperError> {
        let mut slot = {
            let mut guard = self.offer_slot();
            let Some(pending) = guard.as_ref().filter(|pending| pending.offer.order.id == order_id)
            else {
                return Err(ShipperError::OfferNotFound(order_id.to_string()));
            };
            if pending.accepting {
                return Err(ShipperError::AlreadyAssigned(None));
            }
            guard.take()
        }
        .ok_or_else(|| ShipperError::OfferNotFound(order_id.to_string()))?;

        slot.stop_countdown();
        self.record_offer(order_id, OfferOutcome::Declined);
        self.notify_decline(order_id).await;
        Ok(())
    }

    /// Moves the current order to `next`, which must be its direct successor.
    /// Nothing changes locally unless the backend confirms.
    pub async fn advance_status(
        &self,
        order_id: &str,
        next: OrderStatus,
    ) -> Result<Order, ShipperError> {
        let current = self
            .inner
            .store
            .current_order()
            .ok_or(ShipperError::NoCurrentOrder)?;
        if current.id != order_id {
            return Err(ShipperError::OrderMismatch {
                requested: order_id.to_string(),
                current: current.id,
            });
        }
        let Some(shipper_id) = current.shipper_id.clone().filter(|_| current.is_assigned()) else {
            return Err(ShipperError::NoShipperAssigned);
        };
        if !current.status.can_advance_to(next) {
            return Err(ShipperError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let expected = order_id.to_string();
        let data = self
            .inner
            .sync
            .request_matching(
                events::ORDER_STATUS_UPDATE,
                json!({ "orderId": order_id, "shipperId": shipper_id, "status": next }),
                events::STATUS_UPDATE_RESPONSE,
                self.inner.config.request_timeout(),
                move |data| answers_status_update(data, &expected),
            )
            .await
            .inspect_err(|err| warn!(order_id, status = %next, error = %err, "status update failed"))?;

        let mut confirmed = match OrderDocument::decode_update(data)? {
            Some(update) if update.order.id != order_id => {
                warn!(order_id, confirmed_id = %update.order.id, "ignoring status confirmation for another order");
                return Err(ShipperError::OrderMismatch {
                    requested: order_id.to_string(),
                    current: update.order.id,
                });
            }
            Some(OrderUpdate {
                order,
                has_status: true,
            }) => order,
            _ => current.clone().with_status(next),
        };
        if !confirmed.is_assigned() {
            confirmed.shipper_id = Some(shipper_id);
        }

        let ticket = self.inner.store.upsert_order(confirmed.clone());
        self.refresh_partition_gauges();
        info!(order_id, from = %current.status, to = %confirmed.status, "order status advanced");

        await_persisted(ticket, order_id).await;
        Ok(confirmed)
    }

    /// Loads this courier's orders over REST and replaces the local
    /// collections. A call made while another is running returns
    /// [`FetchOutcome::AlreadyLoading`] without a request.
    pub async fn fetch_orders(&self, shipper_id: &str) -> Result<FetchOutcome, ShipperError> {
        let Some(_loading) = LoadingGuard::acquire(&self.inner.loading) else {
            debug!(shipper_id, "orders fetch already in flight");
            return Ok(FetchOutcome::AlreadyLoading);
        };

        let orders = self.inner.api.fetch_orders(shipper_id).await?;
        if self.shipper_id().ok().as_deref() != Some(shipper_id) {
            warn!(shipper_id, "session changed during orders fetch; discarding result");
            return Err(ShipperError::NotAuthenticated);
        }
        let partition = partition_orders(orders);
        let active = partition.active.len();
        let completed = partition.completed.len();

        let ticket =
            self.inner
                .store
                .replace_orders(partition.all, partition.active, partition.completed);
        self.inner.metrics.set_order_partitions(active, completed);
        info!(shipper_id, active, completed, "orders loaded");

        if let Err(err) = ticket.persisted().await {
            error!(shipper_id, error = %err, "failed to persist fetched orders");
        }
        Ok(FetchOutcome::Loaded { active, completed })
    }

    /// Applies an order update the backend sent without being asked, such as
    /// a cancellation.
    pub fn apply_server_push(&self, data: Value) {
        let pushed = match OrderDocument::decode_update(data) {
            Ok(Some(OrderUpdate {
                order,
                has_status: true,
            })) => order,
            Ok(_) => {
                debug!("status push without an order status ignored");
                return;
            }
            Err(err) => {
                warn!(error = %err, "undecodable status push");
                return;
            }
        };

        let store = &self.inner.store;
        let known = store.find_order(&pushed.id);
        let ours = self
            .shipper_id()
            .is_ok_and(|shipper_id| pushed.shipper_id.as_deref() == Some(shipper_id.as_str()));
        let Some(known) = known.or_else(|| ours.then(|| pushed.clone())) else {
            debug!(order_id = %pushed.id, "status push for an unknown order ignored");
            return;
        };

        let mut order = pushed;
        if !order.is_assigned() {
            order.shipper_id = known.shipper_id.clone();
        }
        let was_current = store
            .current_order()
            .is_some_and(|current| current.id == order.id);
        if was_current && order.status == OrderStatus::Canceled {
            warn!(order_id = %order.id, "current order canceled by backend");
        } else {
            info!(order_id = %order.id, status = %order.status, "order updated by backend");
        }

        let order_id = order.id.clone();
        let ticket = store.upsert_order(order);
        self.refresh_partition_gauges();
        tokio::spawn(async move { await_persisted(ticket, &order_id).await });
    }

    /// Toggles availability for new offers. Returns the state confirmed by
    /// the backend.
    pub async fn set_online(&self, online: bool) -> Result<bool, ShipperError> {
        let shipper_id = self.shipper_id()?;

        let data = self
            .inner
            .sync
            .request(
                events::UPDATE_ONLINE_STATUS,
                json!({ "shipperId": shipper_id, "isOnline": online }),
                events::ONLINE_STATUS_RESPONSE,
                self.inner.config.request_timeout(),
            )
            .await?;

        let data = unwrap_payload(data)?;
        let confirmed = if data.is_null() {
            online
        } else {
            serde_json::from_value::<OnlineStatus>(data)
                .map(|status| status.is_online)
                .unwrap_or(online)
        };

        self.inner.online.store(confirmed, Ordering::Release);
        info!(shipper_id, online = confirmed, "online status updated");
        Ok(confirmed)
    }

    /// Sends `current_location` when the courier moved far enough or enough
    /// time passed since the last report. Returns whether a frame was sent.
    pub async fn report_location(&self, point: GeoPoint) -> Result<bool, ShipperError> {
        if !point.is_valid() {
            return Err(ShipperError::Validation(format!(
                "invalid coordinates ({}, {})",
                point.lat, point.lng
            )));
        }
        let shipper_id = self.shipper_id()?;

        if !self.throttle().should_report(point, Instant::now()) {
            return Ok(false);
        }

        self.inner
            .sync
            .emit(
                events::CURRENT_LOCATION,
                json!({ "shipperId": shipper_id, "latitude": point.lat, "longitude": point.lng }),
            )
            .await?;
        Ok(true)
    }

    fn apply_online_echo(&self, data: Value) {
        let status = match unwrap_payload(data)
            .and_then(|data| Ok(serde_json::from_value::<OnlineStatus>(data)?))
        {
            Ok(status) => status,
            Err(err) => {
                debug!(error = %err, "ignoring online status echo");
                return;
            }
        };

        let mine = match (&status.shipper_id, self.shipper_id()) {
            (Some(pushed), Ok(mine)) => *pushed == mine,
            (None, Ok(_)) => true,
            (_, Err(_)) => false,
        };
        if mine {
            self.inner.online.store(status.is_online, Ordering::Release);
            debug!(online = status.is_online, "online status echo applied");
        }
    }

    fn expire(&self, seq: u64) {
        let expired = {
            let mut slot = self.offer_slot();
            if slot
                .as_ref()
                .is_some_and(|slot| slot.seq == seq && !slot.accepting)
            {
                slot.take()
            } else {
                None
            }
        };

        if let Some(slot) = expired {
            let order_id = slot.offer.order.id;
            info!(order_id = %order_id, "offer expired");
            self.record_offer(&order_id, OfferOutcome::Expired);
            self.spawn_decline(order_id);
        }
    }

    async fn notify_decline(&self, order_id: &str) {
        let shipper_id = self.shipper_id().ok();
        let payload = json!({ "orderId": order_id, "shipperId": shipper_id });
        if let Err(err) = self.inner.sync.emit(events::DECLINE_ORDER, payload).await {
            warn!(order_id, error = %err, "failed to notify backend of decline");
        }
    }

    fn spawn_decline(&self, order_id: String) {
        let controller = self.clone();
        tokio::spawn(async move { controller.notify_decline(&order_id).await });
    }

    fn record_offer(&self, order_id: &str, outcome: OfferOutcome) {
        self.inner
            .metrics
            .offers_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.inner.notifier.offer_cleared(order_id, outcome);
    }

    fn refresh_partition_gauges(&self) {
        let orders = self.inner.store.orders();
        self.inner
            .metrics
            .set_order_partitions(orders.active.len(), orders.completed.len());
    }

    fn shipper_id(&self) -> Result<String, ShipperError> {
        self.inner
            .store
            .session()
            .map(|session| session.account.id)
            .ok_or(ShipperError::NotAuthenticated)
    }

    fn handler<F>(&self, event: &str, on_event: F) -> Subscription
    where
        F: Fn(&OrderController, Value) + Send + Sync + 'static,
    {
        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
        self.inner.sync.subscribe(event, move |data| {
            if let Some(inner) = weak.upgrade() {
                on_event(&OrderController { inner }, data);
            }
        })
    }

    fn offer_slot(&self) -> MutexGuard<'_, Option<OfferSlot>> {
        self.inner.offer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn throttle(&self) -> MutexGuard<'_, LocationThrottle> {
        self.inner.throttle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn await_persisted(ticket: PersistTicket, order_id: &str) {
    if let Err(err) = ticket.persisted().await {
        error!(order_id, error = %err, "failed to persist order change");
    }
}
