use async_trait::async_trait;
use autocoder_rs_sync::{Connector, SyncError, TransportEvent, TransportLink};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};

/// How the next connection attempt behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectPlan {
    /// Open immediately.
    Accept,
    /// Fail the handshake with the given reason.
    Refuse(String),
    /// Never finish the handshake.
    Hang,
}

#[derive(Debug)]
struct ScriptState {
    urls: Vec<String>,
    plans: VecDeque<ConnectPlan>,
    fallback: ConnectPlan,
    accepted: VecDeque<ServerEnd>,
}

/// In-memory connector whose attempts are scripted by the test.
///
/// Every accepted attempt yields a [`ServerEnd`] the test uses to play the
/// server side of that connection.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
    accepted: Arc<Notify>,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                urls: Vec::new(),
                plans: VecDeque::new(),
                fallback: ConnectPlan::Accept,
                accepted: VecDeque::new(),
            })),
            accepted: Arc::new(Notify::new()),
        }
    }

    /// Queue the behavior of the next unscripted attempt.
    pub fn then(&self, plan: ConnectPlan) -> &Self {
        self.state.lock().plans.push_back(plan);
        self
    }

    /// Behavior once the queued plans run out.
    pub fn otherwise(&self, plan: ConnectPlan) -> &Self {
        self.state.lock().fallback = plan;
        self
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().urls.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    /// Oldest accepted connection not yet handed to the test.
    pub fn take_server(&self) -> Option<ServerEnd> {
        self.state.lock().accepted.pop_front()
    }

    /// Wait for the next accepted connection.
    pub async fn accepted(&self) -> ServerEnd {
        loop {
            if let Some(server) = self.take_server() {
                return server;
            }
            self.accepted.notified().await;
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, SyncError> {
        let plan = {
            let mut state = self.state.lock();
            state.urls.push(url.to_string());
            let fallback = state.fallback.clone();
            state.plans.pop_front().unwrap_or(fallback)
        };
        match plan {
            ConnectPlan::Accept => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                self.state.lock().accepted.push_back(ServerEnd {
                    url: url.to_string(),
                    to_client: inbound_tx,
                    from_client: outbound_rx,
                });
                self.accepted.notify_one();
                Ok(TransportLink::new(outbound_tx, inbound_rx))
            }
            ConnectPlan::Refuse(reason) => Err(SyncError::TransportOpenFailure(reason)),
            ConnectPlan::Hang => std::future::pending().await,
        }
    }
}

/// Server side of one scripted connection.
#[derive(Debug)]
pub struct ServerEnd {
    url: String,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Frame(text.into()));
    }

    pub fn push(&self, frame: Value) {
        self.push_text(frame.to_string());
    }

    /// Close from the server side.
    pub fn close(&self) {
        let _ = self.to_client.send(TransportEvent::Closed);
    }

    /// Fail the connection: an error followed by a close.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Error(message.into()));
        let _ = self.to_client.send(TransportEvent::Closed);
    }

    /// True once the client dropped its end of the link.
    pub fn client_dropped(&self) -> bool {
        self.to_client.is_closed()
    }

    /// Next frame the client sent, parsed as JSON.
    pub async fn next_sent(&mut self) -> Option<Value> {
        let text = self.from_client.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Everything the client has sent so far.
    pub fn drain_sent(&mut self) -> Vec<Value> {
        let mut sent = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            if let Ok(value) = serde_json::from_str(&text) {
                sent.push(value);
            }
        }
        sent
    }
}
