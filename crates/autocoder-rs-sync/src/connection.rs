//! Connection lifecycle state machine.
//!
//! The machine performs no I/O. Every input returns the list of
//! [`ConnectionAction`]s the caller must carry out, so the lifecycle can be
//! driven by a socket task or stepped by hand.

use crate::backoff::ReconnectPolicy;
use log::{debug, info};
use std::fmt;
use std::time::Duration;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Side effect requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new transport tagged with `generation`.
    OpenTransport { generation: u64 },
    /// Drop the current transport.
    CloseTransport,
    StartKeepalive { interval: Duration },
    StopKeepalive,
    /// Arm the single reconnect timer.
    ScheduleReconnect { delay: Duration, attempt: u32 },
    CancelReconnect,
    /// Send one keepalive probe.
    SendPing,
    /// Surface a transport error to listeners.
    NotifyError(String),
    StatusChanged(ConnectionStatus),
}

/// Timers the machine currently expects to be armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingTimers {
    pub keepalive: bool,
    pub reconnect: Option<Duration>,
}

impl PendingTimers {
    pub fn is_empty(&self) -> bool {
        !self.keepalive && self.reconnect.is_none()
    }
}

/// Lifecycle of one logical connection.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    policy: ReconnectPolicy,
    keepalive_interval: Duration,
    status: ConnectionStatus,
    retries: u32,
    generation: u64,
    transport_live: bool,
    timers: PendingTimers,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy, keepalive_interval: Duration) -> Self {
        Self {
            policy,
            keepalive_interval,
            status: ConnectionStatus::Disconnected,
            retries: 0,
            generation: 0,
            transport_live: false,
            timers: PendingTimers::default(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Reconnects consumed since the last successful open.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Tag of the most recently requested transport. Events carrying any
    /// other generation are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_timers(&self) -> PendingTimers {
        self.timers
    }

    /// Request a transport. No-op while one is opening or open.
    pub fn connect(&mut self) -> Vec<ConnectionAction> {
        if matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            debug!("connect ignored (status={})", self.status);
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.timers.reconnect.take().is_some() {
            actions.push(ConnectionAction::CancelReconnect);
        }
        if self.transport_live {
            actions.push(ConnectionAction::CloseTransport);
        }
        self.stop_keepalive(&mut actions);

        self.generation = self.generation.wrapping_add(1);
        self.transport_live = true;
        self.set_status(ConnectionStatus::Connecting, &mut actions);
        actions.push(ConnectionAction::OpenTransport {
            generation: self.generation,
        });
        actions
    }

    /// The transport for `generation` finished its handshake.
    pub fn on_open(&mut self, generation: u64) -> Vec<ConnectionAction> {
        if self.is_stale(generation) {
            return Vec::new();
        }
        let mut actions = Vec::new();
        self.retries = 0;
        self.set_status(ConnectionStatus::Connected, &mut actions);
        self.timers.keepalive = true;
        actions.push(ConnectionAction::StartKeepalive {
            interval: self.keepalive_interval,
        });
        actions
    }

    /// The transport reported an error. A close normally follows.
    pub fn on_error(&mut self, generation: u64, message: String) -> Vec<ConnectionAction> {
        if self.is_stale(generation) {
            return Vec::new();
        }
        let mut actions = Vec::new();
        self.set_status(ConnectionStatus::Error, &mut actions);
        actions.push(ConnectionAction::NotifyError(message));
        actions
    }

    /// The transport closed, either remotely or after a failed open.
    pub fn on_close(&mut self, generation: u64) -> Vec<ConnectionAction> {
        if self.is_stale(generation) {
            return Vec::new();
        }
        let mut actions = Vec::new();
        self.transport_live = false;
        self.stop_keepalive(&mut actions);
        self.set_status(ConnectionStatus::Disconnected, &mut actions);

        if self.retries < self.policy.max_attempts {
            let delay = self.policy.delay_for(self.retries);
            self.retries += 1;
            self.timers.reconnect = Some(delay);
            info!(
                "scheduling reconnect (attempt={}/{}, delay_ms={})",
                self.retries,
                self.policy.max_attempts,
                delay.as_millis()
            );
            actions.push(ConnectionAction::ScheduleReconnect {
                delay,
                attempt: self.retries,
            });
        } else {
            info!(
                "reconnect attempts exhausted (max_attempts={})",
                self.policy.max_attempts
            );
        }
        actions
    }

    /// The reconnect timer fired.
    pub fn on_reconnect_due(&mut self) -> Vec<ConnectionAction> {
        if self.timers.reconnect.take().is_none() {
            debug!("reconnect timer fired after cancellation");
            return Vec::new();
        }
        self.connect()
    }

    pub fn on_keepalive_tick(&mut self) -> Vec<ConnectionAction> {
        if self.timers.keepalive && self.is_open() {
            vec![ConnectionAction::SendPing]
        } else {
            Vec::new()
        }
    }

    /// Tear down and suppress automatic reconnection. Idempotent.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        self.retries = self.policy.max_attempts;
        let mut actions = Vec::new();
        if self.timers.reconnect.take().is_some() {
            actions.push(ConnectionAction::CancelReconnect);
        }
        self.stop_keepalive(&mut actions);
        if self.transport_live {
            self.transport_live = false;
            self.generation = self.generation.wrapping_add(1);
            actions.push(ConnectionAction::CloseTransport);
        }
        self.set_status(ConnectionStatus::Disconnected, &mut actions);
        actions
    }

    fn is_stale(&self, generation: u64) -> bool {
        let stale = generation != self.generation || !self.transport_live;
        if stale {
            debug!(
                "ignoring stale transport event (generation={}, current={})",
                generation, self.generation
            );
        }
        stale
    }

    fn stop_keepalive(&mut self, actions: &mut Vec<ConnectionAction>) {
        if self.timers.keepalive {
            self.timers.keepalive = false;
            actions.push(ConnectionAction::StopKeepalive);
        }
    }

    fn set_status(&mut self, status: ConnectionStatus, actions: &mut Vec<ConnectionAction>) {
        if self.status != status {
            debug!("connection status {} -> {}", self.status, status);
            self.status = status;
            actions.push(ConnectionAction::StatusChanged(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(
            ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 3),
            Duration::from_secs(30),
        )
    }

    fn opened(actions: &[ConnectionAction]) -> Option<u64> {
        actions.iter().find_map(|action| match action {
            ConnectionAction::OpenTransport { generation } => Some(*generation),
            _ => None,
        })
    }

    #[test]
    fn connect_while_connecting_opens_one_transport() {
        let mut machine = machine();
        let first = machine.connect();
        assert_eq!(
            first,
            vec![
                ConnectionAction::StatusChanged(ConnectionStatus::Connecting),
                ConnectionAction::OpenTransport { generation: 1 },
            ]
        );
        assert!(machine.connect().is_empty());

        machine.on_open(1);
        assert!(machine.connect().is_empty());
        assert_eq!(machine.generation(), 1);
    }

    #[test]
    fn open_resets_retries_and_starts_keepalive() {
        let mut machine = machine();
        machine.connect();
        machine.on_close(1);
        machine.on_reconnect_due();
        assert_eq!(machine.retries(), 1);

        let actions = machine.on_open(2);
        assert_eq!(machine.retries(), 0);
        assert_eq!(
            actions,
            vec![
                ConnectionAction::StatusChanged(ConnectionStatus::Connected),
                ConnectionAction::StartKeepalive {
                    interval: Duration::from_secs(30)
                },
            ]
        );
        assert_eq!(machine.on_keepalive_tick(), vec![ConnectionAction::SendPing]);
    }

    #[test]
    fn reconnects_are_bounded_and_delays_grow() {
        let mut machine = machine();
        let mut generation = opened(&machine.connect()).expect("first open");
        let mut delays = Vec::new();

        for _ in 0..5 {
            let actions = machine.on_close(generation);
            let scheduled = actions.iter().find_map(|action| match action {
                ConnectionAction::ScheduleReconnect { delay, .. } => Some(*delay),
                _ => None,
            });
            let Some(delay) = scheduled else { break };
            delays.push(delay);
            generation = opened(&machine.on_reconnect_due()).expect("reconnect opens");
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        assert!(machine.pending_timers().is_empty());
    }

    #[test]
    fn error_then_close_reaches_disconnected() {
        let mut machine = machine();
        machine.connect();
        machine.on_open(1);

        let actions = machine.on_error(1, "reset by peer".to_string());
        assert_eq!(
            actions,
            vec![
                ConnectionAction::StatusChanged(ConnectionStatus::Error),
                ConnectionAction::NotifyError("reset by peer".to_string()),
            ]
        );
        assert!(machine.pending_timers().keepalive);

        let actions = machine.on_close(1);
        assert!(actions.contains(&ConnectionAction::StopKeepalive));
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        assert_eq!(
            machine.pending_timers().reconnect,
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn disconnect_is_idempotent_and_clears_timers() {
        let mut machine = machine();
        machine.connect();
        machine.on_open(1);

        let actions = machine.disconnect();
        assert_eq!(
            actions,
            vec![
                ConnectionAction::StopKeepalive,
                ConnectionAction::CloseTransport,
                ConnectionAction::StatusChanged(ConnectionStatus::Disconnected),
            ]
        );
        assert!(machine.disconnect().is_empty());
        assert!(machine.pending_timers().is_empty());

        // the close raised by tearing down the old socket must not reconnect
        assert!(machine.on_close(1).is_empty());
        assert!(machine.pending_timers().is_empty());
    }

    #[test]
    fn disconnect_cancels_scheduled_reconnect() {
        let mut machine = machine();
        machine.connect();
        machine.on_close(1);
        assert!(machine.pending_timers().reconnect.is_some());

        let actions = machine.disconnect();
        assert_eq!(actions, vec![ConnectionAction::CancelReconnect]);
        assert!(machine.on_reconnect_due().is_empty());
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn stale_open_after_disconnect_is_ignored() {
        let mut machine = machine();
        machine.connect();
        machine.disconnect();
        assert!(machine.on_open(1).is_empty());
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn manual_connect_after_exhaustion_opens_again() {
        let mut machine = machine();
        machine.connect();
        machine.disconnect();
        assert_eq!(opened(&machine.connect()), Some(3));
        assert_eq!(machine.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn connect_from_error_replaces_live_transport() {
        let mut machine = machine();
        machine.connect();
        machine.on_error(1, "boom".to_string());
        let actions = machine.connect();
        assert_eq!(
            actions,
            vec![
                ConnectionAction::CloseTransport,
                ConnectionAction::StatusChanged(ConnectionStatus::Connecting),
                ConnectionAction::OpenTransport { generation: 2 },
            ]
        );
        assert!(machine.on_close(1).is_empty());
    }
}
