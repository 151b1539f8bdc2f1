//! Wire protocol types for the autocoder realtime channels.

mod attachment;
mod feature;

pub use attachment::{AttachmentPayload, ImageAttachment};
pub use feature::{AgentStatus, AnswerValue, Answers, ProgressSnapshot, QuestionOption, SpecQuestion};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Server-assigned conversation identifier.
pub type ConversationId = i64;

/// `type` discriminants understood by [`decode_server_frame`].
const SERVER_FRAME_TYPES: &[&str] = &[
    "text",
    "tool_call",
    "conversation_created",
    "response_done",
    "error",
    "question",
    "progress",
    "agent_status",
    "log",
    "feature_update",
    "pong",
];

/// Errors raised while decoding or encoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound text could not be turned into a frame.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Frames pushed by the server on a project or assistant channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ServerFrame {
    /// Streaming assistant text fragment.
    Text { content: String },
    /// Assistant invoked a tool.
    ToolCall {
        tool: String,
        #[serde(default)]
        input: Value,
    },
    /// Server created (or resumed) a conversation.
    ConversationCreated { conversation_id: ConversationId },
    /// Assistant finished the current turn.
    ResponseDone,
    /// Server-reported failure.
    Error { content: String },
    /// Assistant is waiting on structured answers.
    Question { questions: Vec<SpecQuestion> },
    /// Feature completion counters.
    Progress(ProgressSnapshot),
    /// Agent lifecycle change.
    AgentStatus { status: AgentStatus },
    /// Agent output line.
    Log { line: String, timestamp: String },
    /// A feature changed server-side; listeners should refetch.
    FeatureUpdate {
        #[serde(default)]
        feature_id: Option<i64>,
        #[serde(default)]
        passes: Option<bool>,
    },
    /// Keepalive acknowledgement.
    Pong,
}

impl ServerFrame {
    /// Wire discriminant of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Text { .. } => "text",
            ServerFrame::ToolCall { .. } => "tool_call",
            ServerFrame::ConversationCreated { .. } => "conversation_created",
            ServerFrame::ResponseDone => "response_done",
            ServerFrame::Error { .. } => "error",
            ServerFrame::Question { .. } => "question",
            ServerFrame::Progress(_) => "progress",
            ServerFrame::AgentStatus { .. } => "agent_status",
            ServerFrame::Log { .. } => "log",
            ServerFrame::FeatureUpdate { .. } => "feature_update",
            ServerFrame::Pong => "pong",
        }
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ClientFrame {
    /// Begin (or resume) an assistant session.
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
    /// User chat message.
    Message {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<AttachmentPayload>,
    },
    /// Answers to a pending question set.
    Answer { answers: Answers },
    /// Keepalive probe.
    Ping,
}

/// Decode one inbound text frame.
///
/// Returns `Ok(None)` for a well-formed envelope whose `type` is not known to
/// this client, so that newer servers never break older clients.
pub fn decode_server_frame(text: &str) -> Result<Option<ServerFrame>, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => {
            return Err(ProtocolError::Malformed(
                "missing string `type` discriminant".to_string(),
            ));
        }
    };
    if !SERVER_FRAME_TYPES.contains(&kind.as_str()) {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| ProtocolError::Malformed(format!("{kind}: {err}")))
}

/// Encode one outbound frame as JSON text.
pub fn encode_client_frame(frame: &ClientFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_streaming_text_frame() {
        let frame = decode_server_frame(r#"{"type":"text","content":"Hel"}"#).expect("decode");
        assert_eq!(
            frame,
            Some(ServerFrame::Text {
                content: "Hel".to_string()
            })
        );
    }

    #[test]
    fn decodes_progress_and_unit_frames() {
        let frame = decode_server_frame(
            r#"{"type":"progress","passing":3,"in_progress":1,"total":10,"percentage":30.0}"#,
        )
        .expect("decode");
        assert_eq!(
            frame,
            Some(ServerFrame::Progress(ProgressSnapshot {
                passing: 3,
                in_progress: 1,
                total: 10,
                percentage: 30.0,
            }))
        );
        let done = decode_server_frame(r#"{"type":"response_done"}"#).expect("decode");
        assert_eq!(done, Some(ServerFrame::ResponseDone));
    }

    #[test]
    fn unknown_frame_types_are_ignored() {
        let frame = decode_server_frame(r#"{"type":"spec_complete","path":"x"}"#).expect("decode");
        assert_eq!(frame, None);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        for text in [
            "not json",
            "[1,2,3]",
            r#"{"content":"no type"}"#,
            r#"{"type":42}"#,
            r#"{"type":"log","line":7}"#,
        ] {
            let err = decode_server_frame(text).unwrap_err();
            assert!(matches!(err, ProtocolError::Malformed(_)), "{text}: {err}");
        }
    }

    #[test]
    fn start_frame_omits_missing_conversation_id() {
        let fresh = encode_client_frame(&ClientFrame::Start {
            conversation_id: None,
        })
        .expect("encode");
        assert_eq!(fresh, r#"{"type":"start"}"#);

        let resumed = serde_json::to_value(ClientFrame::Start {
            conversation_id: Some(7),
        })
        .expect("encode");
        assert_eq!(resumed, json!({ "type": "start", "conversation_id": 7 }));
    }

    #[test]
    fn message_frame_carries_attachments_only_when_present() {
        let plain = serde_json::to_value(ClientFrame::Message {
            content: "hi".to_string(),
            attachments: Vec::new(),
        })
        .expect("encode");
        assert_eq!(plain, json!({ "type": "message", "content": "hi" }));

        let with_image = serde_json::to_value(ClientFrame::Message {
            content: String::new(),
            attachments: vec![AttachmentPayload {
                filename: "a.png".to_string(),
                mime_type: "image/png".to_string(),
                base64_data: "AAAA".to_string(),
            }],
        })
        .expect("encode");
        assert_eq!(with_image["attachments"][0]["mime_type"], json!("image/png"));
    }

    #[test]
    fn answer_frame_uses_string_question_keys() {
        let mut answers = Answers::new();
        answers.insert(0, AnswerValue::One("Rust".to_string()));
        answers.insert(
            1,
            AnswerValue::Many(vec!["cli".to_string(), "tui".to_string()]),
        );
        let encoded = serde_json::to_value(ClientFrame::Answer { answers }).expect("encode");
        assert_eq!(
            encoded,
            json!({
                "type": "answer",
                "answers": { "0": "Rust", "1": ["cli", "tui"] }
            })
        );
    }

    #[test]
    fn question_frame_accepts_camel_case_multi_select() {
        let frame = decode_server_frame(
            r#"{"type":"question","questions":[{"question":"Stack?","options":[{"label":"Rust"}],"multiSelect":true}]}"#,
        )
        .expect("decode");
        let Some(ServerFrame::Question { questions }) = frame else {
            panic!("expected question frame");
        };
        assert!(questions[0].multi_select);
        assert_eq!(questions[0].options[0].label, "Rust");
    }
}
