//! In-process transport. The connector hands every new connection to a
//! [`MemoryServer`], which plays the backend's side of the socket.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ShipperError;
use crate::sync::frame::Frame;
use crate::sync::transport::{Connector, Link, LINK_BUFFER};

pub fn memory_transport() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let refusals = Arc::new(AtomicU32::new(0));

    (
        MemoryConnector {
            accept_tx,
            refusals: refusals.clone(),
        },
        MemoryServer {
            accept_rx,
            refusals,
        },
    )
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicU32>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, token: &str) -> Result<Link, ShipperError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ShipperError::Network("connection refused".to_string()));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(LINK_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(LINK_BUFFER);

        let peer = MemoryPeer {
            token: token.to_string(),
            from_client: outbound_rx,
            to_client: inbound_tx,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| ShipperError::Network("memory server is gone".to_string()))?;

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
    refusals: Arc<AtomicU32>,
}

impl MemoryServer {
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Makes the next `attempts` connection attempts fail.
    pub fn refuse_next(&self, attempts: u32) {
        self.refusals.store(attempts, Ordering::SeqCst);
    }
}

/// Server side of one connection. Dropping it closes the connection.
#[derive(Debug)]
pub struct MemoryPeer {
    token: String,
    from_client: mpsc::Receiver<Frame>,
    to_client: mpsc::Sender<Frame>,
}

impl MemoryPeer {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    pub async fn send(&self, frame: Frame) -> Result<(), ShipperError> {
        self.to_client
            .send(frame)
            .await
            .map_err(|_| ShipperError::NotConnected)
    }

    pub async fn push(&self, event: &str, data: Value) -> Result<(), ShipperError> {
        self.send(Frame::new(event, data)).await
    }

    /// Answers `request` on `event`, echoing its correlation id.
    pub async fn reply(&self, request: &Frame, event: &str, data: Value) -> Result<(), ShipperError> {
        let mut frame = Frame::new(event, data);
        frame.cid = request.cid;
        self.send(frame).await
    }
}
