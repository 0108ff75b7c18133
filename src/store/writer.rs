use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::ShipperError;
use crate::store::backend::{Namespace, StorageBackend};

pub(crate) type Completion = oneshot::Sender<Result<(), ShipperError>>;

pub(crate) enum PersistCommand {
    Save {
        namespace: Namespace,
        bytes: Vec<u8>,
        done: Completion,
    },
    Remove {
        namespace: Namespace,
        done: Completion,
    },
    Flush {
        done: Completion,
    },
}

/// Resolves once the write it was issued for reached the durable medium.
#[derive(Debug)]
pub struct PersistTicket {
    rx: oneshot::Receiver<Result<(), ShipperError>>,
}

impl PersistTicket {
    pub(crate) fn new(rx: oneshot::Receiver<Result<(), ShipperError>>) -> Self {
        Self { rx }
    }

    pub(crate) fn failed(err: ShipperError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }

    pub async fn persisted(self) -> Result<(), ShipperError> {
        self.rx
            .await
            .map_err(|_| ShipperError::Storage("persistence writer stopped".to_string()))?
    }
}

/// Applies persistence commands strictly in submission order, so the last
/// write per namespace is the one left on disk.
pub(crate) async fn run_persistence_writer(
    backend: Arc<dyn StorageBackend>,
    mut commands: mpsc::UnboundedReceiver<PersistCommand>,
) {
    info!("persistence writer started");

    while let Some(command) = commands.recv().await {
        match command {
            PersistCommand::Save {
                namespace,
                bytes,
                done,
            } => {
                let size = bytes.len();
                let result = backend.save(namespace, bytes).await;
                match &result {
                    Ok(()) => debug!(namespace = namespace.storage_key(), size, "snapshot persisted"),
                    Err(err) => error!(
                        namespace = namespace.storage_key(),
                        error = %err,
                        "failed to persist snapshot"
                    ),
                }
                let _ = done.send(result);
            }
            PersistCommand::Remove { namespace, done } => {
                let result = backend.remove(namespace).await;
                if let Err(err) = &result {
                    error!(namespace = namespace.storage_key(), error = %err, "failed to remove snapshot");
                }
                let _ = done.send(result);
            }
            PersistCommand::Flush { done } => {
                let _ = done.send(Ok(()));
            }
        }
    }

    warn!("persistence writer stopped: command channel closed");
}
