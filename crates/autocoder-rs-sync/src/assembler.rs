//! Folds streamed assistant frames into an ordered transcript.

use autocoder_rs_protocol::{ConversationId, ImageAttachment, ServerFrame, SpecQuestion};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ImageAttachment>,
    pub timestamp: DateTime<Utc>,
    /// True while more text may still be appended.
    pub streaming: bool,
}

impl Message {
    fn new(role: Role, content: String, streaming: bool) -> Self {
        Self {
            id: generate_id(),
            role,
            content,
            attachments: Vec::new(),
            timestamp: Utc::now(),
            streaming,
        }
    }
}

/// `{epoch millis}-{7 base36 chars}`; unique within a session.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let mut rng = rand::rng();
    let suffix: String = (0..7)
        .map(|_| char::from_digit(rng.random_range(0..36), 36).unwrap_or('0'))
        .collect();
    format!("{millis}-{suffix}")
}

/// Result of applying one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Changed,
    Unchanged,
    /// The frame was a server error; the transcript changed too.
    ServerError(String),
}

/// Transcript plus per-turn session fields.
#[derive(Debug, Clone, Default)]
pub struct StreamAssembler {
    messages: Vec<Message>,
    loading: bool,
    conversation_id: Option<ConversationId>,
    questions: Option<Vec<SpecQuestion>>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    /// Questions awaiting an answer, if the assistant asked any.
    pub fn questions(&self) -> Option<&[SpecQuestion]> {
        self.questions.as_deref()
    }

    pub fn apply(&mut self, frame: &ServerFrame) -> Assembled {
        match frame {
            ServerFrame::Text { content } => {
                self.append_delta(content);
                Assembled::Changed
            }
            ServerFrame::ToolCall { tool, .. } => {
                self.push(Message::new(Role::System, format!("Using tool: {tool}"), false));
                Assembled::Changed
            }
            ServerFrame::ConversationCreated { conversation_id } => {
                self.conversation_id = Some(*conversation_id);
                Assembled::Changed
            }
            ServerFrame::ResponseDone => {
                self.loading = false;
                self.finalize_streaming();
                Assembled::Changed
            }
            ServerFrame::Error { content } => {
                self.loading = false;
                self.finalize_streaming();
                self.push(Message::new(Role::System, format!("Error: {content}"), false));
                Assembled::ServerError(content.clone())
            }
            ServerFrame::Question { questions } => {
                self.loading = false;
                self.questions = Some(questions.clone());
                Assembled::Changed
            }
            ServerFrame::Progress(_)
            | ServerFrame::AgentStatus { .. }
            | ServerFrame::Log { .. }
            | ServerFrame::FeatureUpdate { .. }
            | ServerFrame::Pong => Assembled::Unchanged,
        }
    }

    /// Record a session start; a resumed id is adopted immediately.
    pub fn begin_start(&mut self, resume: Option<ConversationId>) {
        self.loading = true;
        if resume.is_some() {
            self.conversation_id = resume;
        }
    }

    /// Append a finalized user message and wait for the reply.
    pub fn push_user_message(&mut self, content: String, attachments: Vec<ImageAttachment>) {
        let mut message = Message::new(Role::User, content, false);
        message.attachments = attachments;
        self.push(message);
        self.loading = true;
    }

    /// Answers were submitted; the pending questions are consumed.
    pub fn begin_answer(&mut self) {
        self.questions = None;
        self.loading = true;
    }

    /// The outbound frame never left; stop waiting for a reply.
    pub fn abandon_turn(&mut self) {
        self.loading = false;
    }

    /// Drop the transcript and forget the conversation id.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.conversation_id = None;
        self.questions = None;
    }

    fn append_delta(&mut self, delta: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant && last.streaming => {
                last.content.push_str(delta);
            }
            _ => self.push(Message::new(Role::Assistant, delta.to_string(), true)),
        }
    }

    // Tool events may interleave with streamed text, so more than one
    // assistant message can still be open when the turn ends.
    fn finalize_streaming(&mut self) {
        for message in self.messages.iter_mut().rev() {
            if message.role == Role::Assistant && message.streaming {
                message.streaming = false;
            }
        }
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}
