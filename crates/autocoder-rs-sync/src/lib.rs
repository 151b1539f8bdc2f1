//! Real-time synchronization client for autocoder project and assistant
//! channels.
//!
//! [`SyncClient`] keeps one [`SubscriptionHandle`] per channel and key. Each
//! subscription runs a driver task that owns its socket, reconnects with
//! capped exponential backoff and publishes a [`SyncSnapshot`] after every
//! change.

pub mod assembler;
pub mod backoff;
pub mod client;
pub mod connection;
pub mod effects;
pub mod encoder;
pub mod endpoint;
pub mod error;
pub mod event_bus;
pub mod event_log;
mod state;
pub mod subscription;
pub mod transport;

pub use assembler::{Message, Role, StreamAssembler};
pub use backoff::ReconnectPolicy;
pub use client::SyncClient;
pub use connection::{ConnectionAction, ConnectionMachine, ConnectionStatus, PendingTimers};
pub use effects::{Effect, EffectDispatcher, EffectKind, EntitySnapshot};
pub use encoder::{AttachmentPolicy, ClientCommand, CommandEncoder, PendingAttachments};
pub use endpoint::{Channel, Endpoint, SubscriptionKey};
pub use error::{SyncError, ValidationError};
pub use event_bus::{EventSink, SyncEvent, SyncEventBus};
pub use event_log::{BoundedLog, LogRecord};
pub use state::SyncSnapshot;
pub use subscription::SubscriptionHandle;
pub use transport::{Connector, TransportEvent, TransportLink, WebSocketConnector};
