//! The single long-lived socket connection.
//!
//! [`Synchronizer`] owns the link and is the only component that touches raw
//! frames. Everything else goes through three primitives: fire-and-forget
//! [`Synchronizer::emit`], correlated [`Synchronizer::request`], and durable
//! [`Synchronizer::subscribe`].

pub mod events;
pub mod frame;
pub mod memory;
pub mod transport;

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ShipperError;
use crate::observability::metrics::Metrics;
use crate::sync::frame::Frame;
use crate::sync::transport::{Connector, Link};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Decides whether a response without a correlation id answers a request.
pub type ResponseFilter = Box<dyn Fn(&Value) -> bool + Send + Sync>;

struct HandlerSlot {
    id: u64,
    handler: Handler,
}

struct PendingRequest {
    cid: Uuid,
    reply: oneshot::Sender<Value>,
    filter: Option<ResponseFilter>,
}

impl PendingRequest {
    fn answered_by(&self, cid: Option<Uuid>, data: &Value) -> bool {
        match cid {
            Some(cid) => cid == self.cid,
            None => self.filter.as_ref().is_none_or(|filter| filter(data)),
        }
    }
}

struct Shared {
    subscriptions: DashMap<String, HandlerSlot>,
    // Keyed by response event: at most one correlated request in flight per event.
    pending: DashMap<String, PendingRequest>,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    state: watch::Sender<ConnectionState>,
    next_handler_id: AtomicU64,
    metrics: Metrics,
}

impl Shared {
    fn outbound(&self) -> Option<mpsc::Sender<Frame>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn attach(&self, outbound: mpsc::Sender<Frame>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(outbound);
        self.set_state(ConnectionState::Connected);
    }

    /// Forgets the current link. In-flight requests fail with `NotConnected`.
    fn detach(&self) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.pending.clear();
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn dispatch(&self, frame: Frame) {
        let Frame { event, data, cid } = frame;

        let claimed = self
            .pending
            .remove_if(&event, |_, pending| pending.answered_by(cid, &data));
        if let Some((_, pending)) = claimed {
            if pending.reply.send(data).is_err() {
                debug!(event = %event, "correlated requester went away before the response");
            }
            return;
        }

        if let Some(cid) = cid {
            debug!(event = %event, %cid, "dropping stale correlated response");
            return;
        }

        let handler = self
            .subscriptions
            .get(&event)
            .map(|slot| slot.handler.clone());
        match handler {
            Some(handler) => (handler.as_ref())(data),
            None => debug!(event = %event, "no subscriber for inbound event"),
        }
    }
}

/// Removes the one-shot listener when the request settles, times out, or is
/// cancelled by dropping its future.
struct PendingGuard<'a> {
    shared: &'a Shared,
    response_event: &'a str,
    cid: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared
            .pending
            .remove_if(self.response_event, |_, pending| pending.cid == self.cid);
    }
}

pub struct Synchronizer {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: SyncConfig,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    pub fn new(connector: Arc<dyn Connector>, config: SyncConfig, metrics: Metrics) -> Self {
        let (state, _unused_rx) = watch::channel(ConnectionState::Disconnected);

        Self {
            shared: Arc::new(Shared {
                subscriptions: DashMap::new(),
                pending: DashMap::new(),
                outbound: Mutex::new(None),
                state,
                next_handler_id: AtomicU64::new(1),
                metrics,
            }),
            connector,
            config,
            driver: Mutex::new(None),
        }
    }

    /// Opens the connection for `token`, replacing any previous one, and keeps
    /// it alive with bounded fixed-delay reconnects.
    pub async fn connect(&self, token: &str) -> Result<(), ShipperError> {
        self.stop_driver();
        self.shared.detach();

        let established = establish(
            &self.shared,
            self.connector.as_ref(),
            &self.config,
            token,
            false,
        )
        .await;
        let link = match established {
            Ok(link) => link,
            Err(err) => {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(err);
            }
        };

        self.shared.attach(link.outbound);
        let driver = tokio::spawn(drive(
            self.shared.clone(),
            self.connector.clone(),
            self.config.clone(),
            token.to_string(),
            link.inbound,
        ));
        *self.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(driver);

        info!("socket session established");
        Ok(())
    }

    /// Closes the link. Subscriptions survive and are served again after the
    /// next `connect`.
    pub fn disconnect(&self) {
        self.stop_driver();
        self.shared.detach();
        self.shared.set_state(ConnectionState::Disconnected);
        info!("socket disconnected");
    }

    /// Logout path: closes the link and drops every subscription, so nothing
    /// registered for the previous courier survives into the next session.
    pub fn reset(&self) {
        self.disconnect();
        let dropped = self.shared.subscriptions.len();
        self.shared.subscriptions.clear();
        info!(dropped_subscriptions = dropped, "synchronizer reset");
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.len()
    }

    pub fn has_pending(&self, response_event: &str) -> bool {
        self.shared.pending.contains_key(response_event)
    }

    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), ShipperError> {
        let outbound = self.shared.outbound().ok_or(ShipperError::NotConnected)?;
        outbound
            .send(Frame::new(event, payload))
            .await
            .map_err(|_| ShipperError::NotConnected)?;

        debug!(event, "event emitted");
        Ok(())
    }

    /// Emits `event` and waits for the first `response_event` that answers it.
    ///
    /// Responses are matched by correlation id when the backend echoes one and
    /// otherwise by event name, which is why a second request awaiting the same
    /// `response_event` is refused with [`ShipperError::Busy`].
    pub async fn request(
        &self,
        event: &str,
        payload: Value,
        response_event: &str,
        timeout: Duration,
    ) -> Result<Value, ShipperError> {
        self.send_request(event, payload, response_event, timeout, None)
            .await
    }

    /// Like [`Synchronizer::request`], but a `response_event` frame without a
    /// correlation id only answers the request when `filter` accepts it. Frames
    /// it rejects go to the subscribed handler as pushes.
    pub async fn request_matching<F>(
        &self,
        event: &str,
        payload: Value,
        response_event: &str,
        timeout: Duration,
        filter: F,
    ) -> Result<Value, ShipperError>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.send_request(event, payload, response_event, timeout, Some(Box::new(filter)))
            .await
    }

    async fn send_request(
        &self,
        event: &str,
        payload: Value,
        response_event: &str,
        timeout: Duration,
        filter: Option<ResponseFilter>,
    ) -> Result<Value, ShipperError> {
        let outbound = self.shared.outbound().ok_or(ShipperError::NotConnected)?;
        let cid = Uuid::new_v4();
        let (reply, response) = oneshot::channel();

        match self.shared.pending.entry(response_event.to_string()) {
            Entry::Occupied(_) => {
                self.observe_request(event, "busy", None);
                return Err(ShipperError::Busy(response_event.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest { cid, reply, filter });
            }
        }
        let _listener = PendingGuard {
            shared: &self.shared,
            response_event,
            cid,
        };

        let started = Instant::now();
        outbound
            .send(Frame::new(event, payload).with_cid(cid))
            .await
            .map_err(|_| ShipperError::NotConnected)?;
        debug!(event, response_event, %cid, "correlated request sent");

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(data)) => {
                self.observe_request(event, "ok", Some(started));
                Ok(data)
            }
            Ok(Err(_)) => {
                self.observe_request(event, "disconnected", Some(started));
                Err(ShipperError::NotConnected)
            }
            Err(_) => {
                self.observe_request(event, "timeout", Some(started));
                warn!(
                    event,
                    response_event,
                    timeout_ms = timeout.as_millis() as u64,
                    "correlated request timed out"
                );
                Err(ShipperError::Timeout {
                    event: response_event.to_string(),
                })
            }
        }
    }

    /// Registers the handler for `event`, replacing any previous one. The
    /// handler stays registered until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = self.shared.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.shared.subscriptions.insert(
            event.to_string(),
            HandlerSlot {
                id,
                handler: Arc::new(handler),
            },
        );
        if previous.is_some() {
            debug!(event, "replaced existing subscription");
        }

        Subscription {
            shared: Arc::downgrade(&self.shared),
            event: event.to_string(),
            id,
        }
    }

    pub fn subscribe_stream(&self, event: &str) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(event, move |data| {
            let _ = tx.send(data);
        });

        EventStream {
            _subscription: subscription,
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    fn observe_request(&self, event: &str, outcome: &str, started: Option<Instant>) {
        let metrics = &self.shared.metrics;
        metrics
            .correlated_requests_total
            .with_label_values(&[event, outcome])
            .inc();
        if let Some(started) = started {
            metrics
                .correlated_request_latency_seconds
                .with_label_values(&[event])
                .observe(started.elapsed().as_secs_f64());
        }
    }

    fn stop_driver(&self) {
        if let Some(driver) = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            driver.abort();
        }
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.stop_driver();
    }
}

#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    shared: Weak<Shared>,
    event: String,
    id: u64,
}

impl Subscription {
    /// False once the handler was replaced or the synchronizer was reset.
    pub fn is_active(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| {
            shared
                .subscriptions
                .get(&self.event)
                .is_some_and(|slot| slot.id == self.id)
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared
            .subscriptions
            .remove_if(&self.event, |_, slot| slot.id == self.id)
            .is_some()
        {
            debug!(event = %self.event, "subscription released");
        }
    }
}

/// A subscription delivered as an async stream of payloads. The stream ends
/// when the subscription is replaced or the synchronizer is reset.
pub struct EventStream {
    _subscription: Subscription,
    inner: UnboundedReceiverStream<Value>,
}

impl Stream for EventStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn establish(
    shared: &Shared,
    connector: &dyn Connector,
    config: &SyncConfig,
    token: &str,
    reconnecting: bool,
) -> Result<Link, ShipperError> {
    let attempts = config.reconnect_attempts.max(1);
    let mut last_error = ShipperError::NotConnected;

    for attempt in 1..=attempts {
        if reconnecting {
            shared.set_state(ConnectionState::Reconnecting { attempt });
        } else {
            shared.set_state(ConnectionState::Connecting);
        }
        if reconnecting || attempt > 1 {
            sleep(config.reconnect_delay).await;
        }

        match connector.connect(token).await {
            Ok(link) => return Ok(link),
            Err(err) => {
                warn!(attempt, max_attempts = attempts, error = %err, "socket connect attempt failed");
                last_error = err;
            }
        }
    }

    Err(last_error)
}

async fn drive(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: SyncConfig,
    token: String,
    mut inbound: mpsc::Receiver<Frame>,
) {
    loop {
        while let Some(frame) = inbound.recv().await {
            shared.dispatch(frame);
        }

        shared.detach();
        warn!("socket link lost; reconnecting");

        match establish(&shared, connector.as_ref(), &config, &token, true).await {
            Ok(link) => {
                shared.metrics.socket_reconnects_total.inc();
                shared.attach(link.outbound);
                inbound = link.inbound;
                info!("socket reconnected");
            }
            Err(err) => {
                shared.set_state(ConnectionState::Failed);
                error!(
                    error = %err,
                    attempts = config.reconnect_attempts,
                    "giving up on socket reconnect"
                );
                return;
            }
        }
    }
}
