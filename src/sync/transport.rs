use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::ShipperError;
use crate::sync::frame::Frame;

pub const LINK_BUFFER: usize = 64;

/// A live connection as seen by the synchronizer: frames go out through
/// `outbound`, and `inbound` yields `None` once the connection is gone.
pub struct Link {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a connection authenticated as the holder of `token`.
    async fn connect(&self, token: &str) -> Result<Link, ShipperError>;
}

/// WebSocket connector; the bearer token travels as the `token` query parameter.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    buffer: usize,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            buffer: LINK_BUFFER,
        }
    }

    fn endpoint(&self, token: &str) -> Result<reqwest::Url, ShipperError> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|err| ShipperError::Internal(format!("invalid socket url {}: {err}", self.url)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, token: &str) -> Result<Link, ShipperError> {
        let endpoint = self.endpoint(token)?;
        let (stream, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|err| ShipperError::Network(format!("socket connect failed: {err}")))?;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(self.buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(self.buffer);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(event = %frame.event, error = %err, "dropping unencodable frame");
                        continue;
                    }
                };

                if let Err(err) = sink.send(Message::Text(text)).await {
                    warn!(error = %err, "socket write failed");
                    break;
                }
            }

            let _ = sink.close().await;
            debug!("socket writer finished");
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match Frame::decode(&text) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "ignoring malformed socket frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "socket read failed");
                        break;
                    }
                }
            }

            debug!("socket reader finished");
        });

        info!(url = %self.url, "socket connected");

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::WsConnector;

    #[test]
    fn token_is_appended_as_query_parameter() {
        let connector = WsConnector::new("ws://localhost:8080/socket?transport=websocket");
        let url = connector.endpoint("a b+c").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8080/socket?transport=websocket&token=a+b%2Bc"
        );
    }

    #[test]
    fn invalid_url_is_reported() {
        assert!(WsConnector::new("not a url").endpoint("t").is_err());
    }
}
