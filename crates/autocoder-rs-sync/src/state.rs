//! Per-subscription state and frame routing.

use crate::assembler::{Assembled, Message, StreamAssembler};
use crate::connection::ConnectionStatus;
use crate::event_log::{BoundedLog, LogRecord};
use autocoder_rs_protocol::{AgentStatus, ConversationId, ProgressSnapshot, ServerFrame, SpecQuestion};

/// Point-in-time view of one subscription, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
    pub status: ConnectionStatus,
    pub messages: Vec<Message>,
    pub loading: bool,
    pub conversation_id: Option<ConversationId>,
    pub questions: Option<Vec<SpecQuestion>>,
    pub logs: Vec<LogRecord>,
    pub progress: ProgressSnapshot,
    pub agent_status: AgentStatus,
}

/// What routing one frame did.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Routed {
    Changed,
    Unchanged,
    ServerError(String),
    FeatureUpdated {
        feature_id: Option<i64>,
        passes: Option<bool>,
    },
}

#[derive(Debug)]
pub(crate) struct SyncState {
    pub(crate) status: ConnectionStatus,
    pub(crate) assembler: StreamAssembler,
    log: BoundedLog<LogRecord>,
    progress: ProgressSnapshot,
    agent_status: AgentStatus,
}

impl SyncState {
    pub(crate) fn new(log_capacity: usize) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            assembler: StreamAssembler::new(),
            log: BoundedLog::new(log_capacity),
            progress: ProgressSnapshot::default(),
            agent_status: AgentStatus::default(),
        }
    }

    /// Send project-channel frames to their slots and everything else to
    /// the transcript.
    pub(crate) fn route(&mut self, frame: ServerFrame) -> Routed {
        match frame {
            ServerFrame::Log { line, timestamp } => {
                self.log.append(LogRecord { line, timestamp });
                Routed::Changed
            }
            ServerFrame::Progress(progress) => {
                self.progress = progress;
                Routed::Changed
            }
            ServerFrame::AgentStatus { status } => {
                self.agent_status = status;
                Routed::Changed
            }
            ServerFrame::FeatureUpdate { feature_id, passes } => {
                Routed::FeatureUpdated { feature_id, passes }
            }
            ServerFrame::Pong => Routed::Unchanged,
            frame => match self.assembler.apply(&frame) {
                Assembled::Changed => Routed::Changed,
                Assembled::Unchanged => Routed::Unchanged,
                Assembled::ServerError(message) => Routed::ServerError(message),
            },
        }
    }

    pub(crate) fn clear_logs(&mut self) {
        self.log.clear();
    }

    pub(crate) fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            status: self.status,
            messages: self.assembler.messages().to_vec(),
            loading: self.assembler.loading(),
            conversation_id: self.assembler.conversation_id(),
            questions: self.assembler.questions().map(<[_]>::to_vec),
            logs: self.log.to_vec(),
            progress: self.progress,
            agent_status: self.agent_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn project_frames_fill_their_slots() {
        let mut state = SyncState::new(2);
        for n in 0..3 {
            state.route(ServerFrame::Log {
                line: format!("line {n}"),
                timestamp: format!("t{n}"),
            });
        }
        state.route(ServerFrame::AgentStatus {
            status: AgentStatus::Running,
        });
        state.route(ServerFrame::Progress(ProgressSnapshot {
            passing: 4,
            in_progress: 1,
            total: 8,
            percentage: 50.0,
        }));

        let snapshot = state.snapshot();
        let lines: Vec<&str> = snapshot.logs.iter().map(|r| r.line.as_str()).collect();
        assert_eq!(lines, vec!["line 1", "line 2"]);
        assert_eq!(snapshot.agent_status, AgentStatus::Running);
        assert_eq!(snapshot.progress.passing, 4);
        assert!(snapshot.messages.is_empty());
    }

    #[test]
    fn feature_updates_pass_through() {
        let mut state = SyncState::new(10);
        let routed = state.route(ServerFrame::FeatureUpdate {
            feature_id: Some(9),
            passes: Some(true),
        });
        assert_eq!(
            routed,
            Routed::FeatureUpdated {
                feature_id: Some(9),
                passes: Some(true)
            }
        );
        assert_eq!(state.snapshot(), SyncSnapshot::default());
    }

    #[test]
    fn chat_frames_reach_the_transcript() {
        let mut state = SyncState::new(10);
        state.route(ServerFrame::Text {
            content: "hi".to_string(),
        });
        state.clear_logs();
        assert_eq!(state.snapshot().messages.len(), 1);
    }
}
