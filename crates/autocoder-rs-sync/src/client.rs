//! Registry of live subscriptions plus the effect dispatcher.

use crate::backoff::ReconnectPolicy;
use crate::effects::{Effect, EffectDispatcher, EntitySnapshot};
use crate::encoder::AttachmentPolicy;
use crate::endpoint::{Channel, Endpoint, SubscriptionKey};
use crate::error::SyncError;
use crate::event_bus::{SyncEvent, SyncEventBus};
use crate::subscription::{SubscriptionHandle, SubscriptionSettings};
use crate::transport::{Connector, WebSocketConnector};
use autocoder_rs_config::SyncConfig;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_BUS_BUFFER: usize = 256;

/// Entry point of the sync layer. Owns at most one subscription per key.
pub struct SyncClient {
    config: SyncConfig,
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    events: SyncEventBus,
    subscriptions: HashMap<SubscriptionKey, SubscriptionHandle>,
    effects: EffectDispatcher,
}

impl SyncClient {
    /// Client that talks WebSocket to the configured server.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let connector = WebSocketConnector::new(Duration::from_millis(config.connect_timeout_ms));
        Self::with_connector(config, Arc::new(connector))
    }

    /// Fails when `config` does not validate or its host is not addressable.
    pub fn with_connector(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let endpoint = Endpoint::from_config(&config.server)?;
        info!(
            "sync client ready (host={}, secure={})",
            config.server.host, config.server.secure
        );
        Ok(Self {
            config,
            endpoint,
            connector,
            events: SyncEventBus::new(EVENT_BUS_BUFFER),
            subscriptions: HashMap::new(),
            effects: EffectDispatcher::new(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Events from every subscription of this client.
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Handle for `(channel, name)`, spawning its driver on first use.
    /// Repeated calls share one connection.
    pub fn subscribe(&mut self, channel: Channel, name: &str) -> SubscriptionHandle {
        let key = SubscriptionKey::new(channel, name);
        if let Some(handle) = self.subscriptions.get(&key) {
            debug!("reusing subscription (key={})", key);
            return handle.clone();
        }
        let settings = self.settings_for(&key);
        let handle = SubscriptionHandle::spawn(
            key.clone(),
            settings,
            Arc::clone(&self.connector),
            self.events.clone(),
        );
        self.subscriptions.insert(key, handle.clone());
        handle
    }

    pub fn subscription(&self, key: &SubscriptionKey) -> Option<&SubscriptionHandle> {
        self.subscriptions.get(key)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Tear down the subscription for `key`. Returns false when none existed.
    pub async fn release(&mut self, key: &SubscriptionKey) -> bool {
        let Some(handle) = self.subscriptions.remove(key) else {
            return false;
        };
        handle.dispose().await;
        if key.channel == Channel::Project {
            self.effects.release(&key.name);
        }
        info!("subscription released (key={})", key);
        true
    }

    /// Feed a fresh feature snapshot for a project into the effect dispatcher.
    pub fn observe_features(&mut self, project: &str, snapshot: EntitySnapshot) -> Vec<Effect> {
        self.effects.observe(project, snapshot)
    }

    pub fn effects(&self) -> &EffectDispatcher {
        &self.effects
    }

    /// Release every subscription.
    pub async fn shutdown(&mut self) {
        let keys: Vec<SubscriptionKey> = self.subscriptions.keys().cloned().collect();
        for key in keys {
            self.release(&key).await;
        }
    }

    fn settings_for(&self, key: &SubscriptionKey) -> SubscriptionSettings {
        let reconnect = match key.channel {
            Channel::Project => self.config.channels.project_settings(),
            Channel::Assistant => self.config.channels.assistant_settings(),
        };
        SubscriptionSettings {
            url: self.endpoint.socket_url(key).into(),
            policy: ReconnectPolicy::from(reconnect),
            keepalive_interval: Duration::from_millis(self.config.keepalive_interval_ms),
            start_timeout: Duration::from_millis(self.config.start_timeout_ms),
            log_capacity: self.config.log_capacity,
            attachments: AttachmentPolicy::from_config(&self.config.attachments),
        }
    }
}
