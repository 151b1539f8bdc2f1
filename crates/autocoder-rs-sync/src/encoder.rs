//! Outbound command validation and encoding.

use crate::assembler::generate_id;
use crate::connection::ConnectionStatus;
use crate::error::{SyncError, ValidationError};
use autocoder_rs_config::AttachmentsConfig;
use autocoder_rs_protocol::{
    AttachmentPayload, Answers, ClientFrame, ConversationId, ImageAttachment, encode_client_frame,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;

/// Allow-list and size limit for image attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPolicy {
    max_bytes: u64,
    allowed_mime_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self::from_config(&AttachmentsConfig::default())
    }
}

impl AttachmentPolicy {
    pub fn new(max_bytes: u64, allowed_mime_types: Vec<String>) -> Self {
        Self {
            max_bytes,
            allowed_mime_types,
        }
    }

    pub fn from_config(config: &AttachmentsConfig) -> Self {
        Self::new(config.max_bytes, config.allowed_mime_types.clone())
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn check(&self, filename: &str, mime_type: &str, size: u64) -> Result<(), ValidationError> {
        if !self
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
        {
            return Err(ValidationError::UnsupportedType {
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
            });
        }
        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                filename: filename.to_string(),
                size,
                max_bytes: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Validate raw bytes and build an attachment with a `data:` preview.
    pub fn prepare(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<ImageAttachment, ValidationError> {
        let size = bytes.len() as u64;
        self.check(filename, mime_type, size)?;
        let base64_data = STANDARD.encode(bytes);
        Ok(ImageAttachment {
            id: generate_id(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            preview_url: format!("data:{mime_type};base64,{base64_data}"),
            base64_data,
            size,
        })
    }

    /// Like [`prepare`](Self::prepare), guessing the MIME type from the
    /// file extension.
    pub fn prepare_named(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<ImageAttachment, ValidationError> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        self.prepare(filename, mime.essence_str(), bytes)
    }

    /// Re-check an attachment built elsewhere.
    pub fn validate(&self, attachment: &ImageAttachment) -> Result<(), ValidationError> {
        self.check(
            &attachment.filename,
            &attachment.mime_type,
            attachment.size,
        )
    }
}

/// Attachments staged for the next outgoing message. Rejected files never
/// enter the list.
#[derive(Debug, Clone, Default)]
pub struct PendingAttachments {
    items: Vec<ImageAttachment>,
}

impl PendingAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        policy: &AttachmentPolicy,
        filename: &str,
        bytes: &[u8],
    ) -> Result<&ImageAttachment, ValidationError> {
        let attachment = policy.prepare_named(filename, bytes)?;
        self.items.push(attachment);
        Ok(&self.items[self.items.len() - 1])
    }

    pub fn remove(&mut self, id: &str) -> Option<ImageAttachment> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn as_slice(&self) -> &[ImageAttachment] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Hand over everything staged, leaving the list empty.
    pub fn take(&mut self) -> Vec<ImageAttachment> {
        std::mem::take(&mut self.items)
    }
}

/// Commands accepted by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Start {
        resume: Option<ConversationId>,
    },
    Message {
        content: String,
        attachments: Vec<ImageAttachment>,
    },
    Answer {
        answers: Answers,
    },
    Ping,
}

impl ClientCommand {
    fn kind(&self) -> &'static str {
        match self {
            ClientCommand::Start { .. } => "start",
            ClientCommand::Message { .. } => "message",
            ClientCommand::Answer { .. } => "answer",
            ClientCommand::Ping => "ping",
        }
    }
}

/// Turns commands into wire text, refusing anything that cannot be sent.
#[derive(Debug, Clone, Default)]
pub struct CommandEncoder {
    policy: AttachmentPolicy,
}

impl CommandEncoder {
    pub fn new(policy: AttachmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AttachmentPolicy {
        &self.policy
    }

    /// Validate `command`, then encode it if the connection is open.
    ///
    /// Validation runs first so an invalid message is reported the same way
    /// whether or not the transport is up.
    pub fn encode(
        &self,
        status: ConnectionStatus,
        command: &ClientCommand,
    ) -> Result<String, SyncError> {
        let frame = self.to_frame(command)?;
        if status != ConnectionStatus::Connected {
            debug!("refusing {} while {}", command.kind(), status);
            return Err(SyncError::NotConnected);
        }
        Ok(encode_client_frame(&frame)?)
    }

    fn to_frame(&self, command: &ClientCommand) -> Result<ClientFrame, ValidationError> {
        let frame = match command {
            ClientCommand::Start { resume } => ClientFrame::Start {
                conversation_id: *resume,
            },
            ClientCommand::Message {
                content,
                attachments,
            } => {
                if content.trim().is_empty() && attachments.is_empty() {
                    return Err(ValidationError::EmptyMessage);
                }
                for attachment in attachments {
                    self.policy.validate(attachment)?;
                }
                ClientFrame::Message {
                    content: content.trim().to_string(),
                    attachments: attachments.iter().map(AttachmentPayload::from).collect(),
                }
            }
            ClientCommand::Answer { answers } => ClientFrame::Answer {
                answers: answers.clone(),
            },
            ClientCommand::Ping => ClientFrame::Ping,
        };
        Ok(frame)
    }
}
