//! One driver task per subscription key.
//!
//! The task owns the connection machine, the transport link and every timer.
//! Handles talk to it over a command channel and read state from a watch
//! channel, so no state is shared behind locks.

use crate::backoff::ReconnectPolicy;
use crate::connection::{ConnectionAction, ConnectionMachine, ConnectionStatus, PendingTimers};
use crate::encoder::{AttachmentPolicy, ClientCommand, CommandEncoder};
use crate::endpoint::SubscriptionKey;
use crate::error::SyncError;
use crate::event_bus::{EventSink, SyncEvent, SyncEventBus};
use crate::state::{Routed, SyncSnapshot, SyncState};
use crate::transport::{Connector, TransportEvent, TransportLink};
use autocoder_rs_protocol::{
    Answers, ConversationId, ImageAttachment, ServerFrame, decode_server_frame,
};
use log::{debug, info, warn};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep};

/// Everything a driver needs besides its connector.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionSettings {
    pub(crate) url: String,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) keepalive_interval: Duration,
    pub(crate) start_timeout: Duration,
    pub(crate) log_capacity: usize,
    pub(crate) attachments: AttachmentPolicy,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Connect,
    Start {
        resume: Option<ConversationId>,
        reply: Reply<Result<(), SyncError>>,
    },
    Send {
        command: ClientCommand,
        reply: Reply<Result<(), SyncError>>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    ClearMessages,
    ClearLogs,
    PendingTimers {
        reply: Reply<PendingTimers>,
    },
    Dispose {
        reply: Reply<()>,
    },
}

enum OpenOutcome {
    Opened { generation: u64, link: TransportLink },
    Failed { generation: u64, error: SyncError },
}

struct PendingStart {
    resume: Option<ConversationId>,
    reply: Reply<Result<(), SyncError>>,
    deadline: Pin<Box<Sleep>>,
}

/// Cloneable handle to a running subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    key: SubscriptionKey,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SyncSnapshot>,
    events: SyncEventBus,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Connect => "Connect",
            Command::Start { .. } => "Start",
            Command::Send { .. } => "Send",
            Command::Disconnect { .. } => "Disconnect",
            Command::ClearMessages => "ClearMessages",
            Command::ClearLogs => "ClearLogs",
            Command::PendingTimers { .. } => "PendingTimers",
            Command::Dispose { .. } => "Dispose",
        };
        f.write_str(name)
    }
}

impl SubscriptionHandle {
    /// Spawn the driver task for `key`. Must be called inside a tokio runtime.
    pub(crate) fn spawn(
        key: SubscriptionKey,
        settings: SubscriptionSettings,
        connector: Arc<dyn Connector>,
        events: SyncEventBus,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let state = SyncState::new(settings.log_capacity);
        let (publisher, snapshots) = watch::channel(state.snapshot());
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();

        let driver = SubscriptionDriver {
            key: key.clone(),
            machine: ConnectionMachine::new(settings.policy, settings.keepalive_interval),
            encoder: CommandEncoder::new(settings.attachments.clone()),
            settings,
            connector,
            state,
            publisher,
            events: events.clone(),
            opened_tx,
            opened_rx,
            opening: None,
            link: None,
            keepalive: None,
            reconnect: None,
            pending_start: None,
        };
        tokio::spawn(driver.run(command_rx));

        Self {
            key,
            commands,
            state: snapshots,
            events,
        }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Open the transport if it is not already opening or open.
    pub fn connect(&self) -> Result<(), SyncError> {
        self.post(Command::Connect)
    }

    /// Connect if needed, wait for the transport to open, then send `start`.
    ///
    /// Fails with [`SyncError::StartAborted`] when the connection ends up
    /// disconnected or failed first, and with [`SyncError::StartTimedOut`]
    /// when it stays connecting past the configured timeout.
    pub async fn start(&self, resume: Option<ConversationId>) -> Result<(), SyncError> {
        self.request(|reply| Command::Start { resume, reply })
            .await?
    }

    /// Send a chat message. Rejected without queueing when not connected.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        attachments: Vec<ImageAttachment>,
    ) -> Result<(), SyncError> {
        let command = ClientCommand::Message {
            content: content.into(),
            attachments,
        };
        self.request(|reply| Command::Send { command, reply })
            .await?
    }

    /// Answer the pending question set.
    pub async fn send_answer(&self, answers: Answers) -> Result<(), SyncError> {
        let command = ClientCommand::Answer { answers };
        self.request(|reply| Command::Send { command, reply })
            .await?
    }

    /// Close the transport and cancel every timer. Idempotent.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub fn clear_messages(&self) -> Result<(), SyncError> {
        self.post(Command::ClearMessages)
    }

    pub fn clear_logs(&self) -> Result<(), SyncError> {
        self.post(Command::ClearLogs)
    }

    /// Timers the driver currently has armed.
    pub async fn pending_timers(&self) -> Result<PendingTimers, SyncError> {
        self.request(|reply| Command::PendingTimers { reply }).await
    }

    /// Disconnect and stop the driver task. Later commands fail with
    /// [`SyncError::SubscriptionClosed`].
    pub async fn dispose(&self) {
        if let Err(err) = self.request(|reply| Command::Dispose { reply }).await {
            debug!("dispose after driver exit (key={}): {}", self.key, err);
        }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SyncSnapshot> {
        self.state.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SyncSnapshot) -> bool,
    ) -> Result<SyncSnapshot, SyncError> {
        let mut receiver = self.state.clone();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| SyncError::SubscriptionClosed)?;
        Ok(SyncSnapshot::clone(&snapshot))
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn post(&self, command: Command) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::SubscriptionClosed)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, SyncError> {
        let (reply, response) = oneshot::channel();
        self.post(command(reply))?;
        response.await.map_err(|_| SyncError::SubscriptionClosed)
    }
}

struct SubscriptionDriver {
    key: SubscriptionKey,
    settings: SubscriptionSettings,
    connector: Arc<dyn Connector>,
    machine: ConnectionMachine,
    encoder: CommandEncoder,
    state: SyncState,
    publisher: watch::Sender<SyncSnapshot>,
    events: SyncEventBus,
    opened_tx: mpsc::UnboundedSender<OpenOutcome>,
    opened_rx: mpsc::UnboundedReceiver<OpenOutcome>,
    opening: Option<JoinHandle<()>>,
    link: Option<TransportLink>,
    keepalive: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    pending_start: Option<PendingStart>,
}

impl SubscriptionDriver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("subscription started (key={}, url={})", self.key, self.settings.url);
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        self.teardown();
                        break;
                    }
                },
                Some(outcome) = self.opened_rx.recv() => self.handle_open_outcome(outcome),
                event = next_link_event(&mut self.link) => self.handle_transport_event(event),
                _ = next_tick(&mut self.keepalive) => {
                    let actions = self.machine.on_keepalive_tick();
                    self.execute(actions);
                }
                _ = fire(&mut self.reconnect) => {
                    self.reconnect = None;
                    let actions = self.machine.on_reconnect_due();
                    self.execute(actions);
                }
                _ = start_deadline(&mut self.pending_start) => {
                    if let Some(pending) = self.pending_start.take() {
                        warn!("start timed out waiting for transport (key={})", self.key);
                        let _ = pending
                            .reply
                            .send(Err(SyncError::StartTimedOut(self.settings.start_timeout)));
                    }
                }
            }
        }
        info!("subscription stopped (key={})", self.key);
    }

    /// Returns false once the driver should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        debug!("subscription command (key={}, command={:?})", self.key, command);
        match command {
            Command::Connect => {
                let actions = self.machine.connect();
                self.execute(actions);
            }
            Command::Start { resume, reply } => self.start(resume, reply),
            Command::Send { command, reply } => {
                let result = self.send(command);
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                let actions = self.machine.disconnect();
                self.execute(actions);
                let _ = reply.send(());
            }
            Command::ClearMessages => {
                self.state.assembler.clear();
                self.publish();
            }
            Command::ClearLogs => {
                self.state.clear_logs();
                self.publish();
            }
            Command::PendingTimers { reply } => {
                let _ = reply.send(self.machine.pending_timers());
            }
            Command::Dispose { reply } => {
                self.teardown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self, resume: Option<ConversationId>, reply: Reply<Result<(), SyncError>>) {
        if let Some(previous) = self.pending_start.take() {
            let _ = previous
                .reply
                .send(Err(SyncError::StartAborted(self.machine.status())));
        }

        let actions = self.machine.connect();
        self.execute(actions);

        match self.machine.status() {
            ConnectionStatus::Connected => {
                let _ = reply.send(self.send_start(resume));
            }
            ConnectionStatus::Connecting => {
                debug!("start waiting for transport (key={})", self.key);
                self.pending_start = Some(PendingStart {
                    resume,
                    reply,
                    deadline: Box::pin(sleep(self.settings.start_timeout)),
                });
            }
            status => {
                let _ = reply.send(Err(SyncError::StartAborted(status)));
            }
        }
    }

    fn send_start(&mut self, resume: Option<ConversationId>) -> Result<(), SyncError> {
        let text = self
            .encoder
            .encode(self.machine.status(), &ClientCommand::Start { resume })?;
        self.state.assembler.begin_start(resume);
        let result = self.transmit(text);
        if result.is_err() {
            self.state.assembler.abandon_turn();
        }
        self.publish();
        result
    }

    fn send(&mut self, command: ClientCommand) -> Result<(), SyncError> {
        let text = self.encoder.encode(self.machine.status(), &command)?;
        match command {
            ClientCommand::Message {
                content,
                attachments,
            } => self
                .state
                .assembler
                .push_user_message(content.trim().to_string(), attachments),
            ClientCommand::Answer { .. } => self.state.assembler.begin_answer(),
            ClientCommand::Start { resume } => self.state.assembler.begin_start(resume),
            ClientCommand::Ping => {}
        }
        let result = self.transmit(text);
        if result.is_err() {
            self.state.assembler.abandon_turn();
        }
        self.publish();
        result
    }

    fn transmit(&self, text: String) -> Result<(), SyncError> {
        match &self.link {
            Some(link) => link.send(text),
            None => Err(SyncError::NotConnected),
        }
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::OpenTransport { generation } => self.open_transport(generation),
                ConnectionAction::CloseTransport => {
                    if let Some(task) = self.opening.take() {
                        task.abort();
                    }
                    self.link = None;
                }
                ConnectionAction::StartKeepalive { interval } => {
                    let mut ticker = interval_at(Instant::now() + interval, interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.keepalive = Some(ticker);
                }
                ConnectionAction::StopKeepalive => self.keepalive = None,
                ConnectionAction::ScheduleReconnect { delay, .. } => {
                    self.reconnect = Some(Box::pin(sleep(delay)));
                }
                ConnectionAction::CancelReconnect => self.reconnect = None,
                ConnectionAction::SendPing => {
                    let sent = self
                        .encoder
                        .encode(self.machine.status(), &ClientCommand::Ping)
                        .and_then(|text| self.transmit(text));
                    if let Err(err) = sent {
                        debug!("keepalive ping skipped (key={}): {}", self.key, err);
                    }
                }
                ConnectionAction::NotifyError(message) => {
                    warn!("transport error (key={}): {}", self.key, message);
                    self.events.emit(SyncEvent::TransportError {
                        key: self.key.clone(),
                        message,
                    });
                }
                ConnectionAction::StatusChanged(status) => {
                    self.state.status = status;
                    self.publish();
                    self.events.emit(SyncEvent::StatusChanged {
                        key: self.key.clone(),
                        status,
                    });
                    self.resolve_pending_start(status);
                }
            }
        }
    }

    fn resolve_pending_start(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connecting => {}
            ConnectionStatus::Connected => {
                if let Some(pending) = self.pending_start.take() {
                    let result = self.send_start(pending.resume);
                    let _ = pending.reply.send(result);
                }
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                if let Some(pending) = self.pending_start.take() {
                    let _ = pending.reply.send(Err(SyncError::StartAborted(status)));
                }
            }
        }
    }

    fn open_transport(&mut self, generation: u64) {
        if let Some(task) = self.opening.take() {
            task.abort();
        }
        let connector = Arc::clone(&self.connector);
        let url = self.settings.url.clone();
        let outcomes = self.opened_tx.clone();
        debug!(
            "opening transport (key={}, generation={})",
            self.key, generation
        );
        self.opening = Some(tokio::spawn(async move {
            let outcome = match connector.connect(&url).await {
                Ok(link) => OpenOutcome::Opened { generation, link },
                Err(error) => OpenOutcome::Failed { generation, error },
            };
            let _ = outcomes.send(outcome);
        }));
    }

    fn handle_open_outcome(&mut self, outcome: OpenOutcome) {
        match outcome {
            OpenOutcome::Opened { generation, link } => {
                if generation != self.machine.generation() {
                    debug!("dropping stale transport (key={})", self.key);
                    return;
                }
                self.opening = None;
                info!("transport open (key={})", self.key);
                self.link = Some(link);
                let actions = self.machine.on_open(generation);
                self.execute(actions);
            }
            OpenOutcome::Failed { generation, error } => {
                if generation == self.machine.generation() {
                    self.opening = None;
                }
                let actions = self.machine.on_error(generation, error.to_string());
                self.execute(actions);
                let actions = self.machine.on_close(generation);
                self.execute(actions);
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let generation = self.machine.generation();
        match event {
            TransportEvent::Frame(text) => self.handle_frame(&text),
            TransportEvent::Error(message) => {
                let actions = self.machine.on_error(generation, message);
                self.execute(actions);
            }
            TransportEvent::Closed => {
                info!("transport closed (key={})", self.key);
                self.link = None;
                let actions = self.machine.on_close(generation);
                self.execute(actions);
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("ignoring unknown frame type (key={})", self.key);
                return;
            }
            Err(err) => {
                warn!("dropping malformed frame (key={}): {}", self.key, err);
                return;
            }
        };
        debug!("frame received (key={}, type={})", self.key, frame.kind());
        match self.state.route(frame) {
            Routed::Changed => self.publish(),
            Routed::Unchanged => {}
            Routed::ServerError(message) => {
                self.publish();
                self.events.emit(SyncEvent::ServerError {
                    key: self.key.clone(),
                    message,
                });
            }
            Routed::FeatureUpdated { feature_id, passes } => {
                self.events.emit(SyncEvent::FeatureUpdated {
                    key: self.key.clone(),
                    feature_id,
                    passes,
                });
            }
        }
    }

    fn teardown(&mut self) {
        let actions = self.machine.disconnect();
        self.execute(actions);
        if let Some(task) = self.opening.take() {
            task.abort();
        }
        if let Some(pending) = self.pending_start.take() {
            let _ = pending.reply.send(Err(SyncError::SubscriptionClosed));
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.snapshot());
    }
}

fn decode_frame(text: &str) -> Result<Option<ServerFrame>, SyncError> {
    Ok(decode_server_frame(text)?)
}

async fn next_link_event(link: &mut Option<TransportLink>) -> TransportEvent {
    match link {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn start_deadline(pending: &mut Option<PendingStart>) {
    match pending {
        Some(pending) => pending.deadline.as_mut().await,
        None => std::future::pending().await,
    }
}
