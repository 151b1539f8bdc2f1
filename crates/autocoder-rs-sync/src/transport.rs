//! Transport seam between the subscription driver and the network.

use crate::error::SyncError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Event raised by an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),
    /// The transport closed. Always the last event.
    Closed,
    /// The transport failed; a `Closed` follows.
    Error(String),
}

/// Both directions of an open transport. Dropping the link closes it.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn send(&self, text: String) -> Result<(), SyncError> {
        self.outbound
            .send(text)
            .map_err(|_| SyncError::NotConnected)
    }

    /// Next inbound event. A vanished writer reads as `Closed`.
    pub async fn next_event(&mut self) -> TransportEvent {
        self.inbound.recv().await.unwrap_or(TransportEvent::Closed)
    }
}

/// Opens transports for a socket URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<TransportLink, SyncError>;
}

/// WebSocket transport backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, SyncError> {
        debug!("opening websocket (url={url})");
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                SyncError::TransportOpenFailure(format!(
                    "handshake timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|err| SyncError::TransportOpenFailure(err.to_string()))?;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = sink.send(Message::Text(text)).await {
                    debug!("websocket write failed: {err}");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Frame(text),
                        Err(_) => {
                            warn!("dropping non-utf8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        let _ = inbound_tx.send(TransportEvent::Error(err.to_string()));
                        break;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed);
        });

        Ok(TransportLink::new(outbound_tx, inbound_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn dropped_writer_reads_as_closed() {
        let (outbound, _outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let mut link = TransportLink::new(outbound, inbound);

        inbound_tx
            .send(TransportEvent::Frame("{}".to_string()))
            .expect("send");
        drop(inbound_tx);
        assert_eq!(link.next_event().await, TransportEvent::Frame("{}".to_string()));
        assert_eq!(link.next_event().await, TransportEvent::Closed);
    }

    #[tokio::test]
    async fn send_after_peer_gone_is_not_connected() {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (_inbound_tx, inbound) = mpsc::unbounded_channel();
        let link = TransportLink::new(outbound, inbound);
        drop(outbound_rx);
        assert!(matches!(
            link.send("x".to_string()),
            Err(SyncError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn refused_handshake_is_open_failure() {
        let connector = WebSocketConnector::new(Duration::from_secs(2));
        let result = connector.connect("ws://127.0.0.1:9/ws/projects/none").await;
        assert!(matches!(result, Err(SyncError::TransportOpenFailure(_))));
    }
}
