use serde::{Deserialize, Serialize};

/// Image attached to an outgoing chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Client-generated identifier.
    pub id: String,
    /// Original file name.
    pub filename: String,
    /// MIME type, checked against the attachment allow-list before use.
    pub mime_type: String,
    /// Payload encoded as standard base64.
    pub base64_data: String,
    /// `data:` URL usable as a preview reference.
    pub preview_url: String,
    /// Decoded payload size in bytes.
    pub size: u64,
}

/// Subset of an attachment that travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub filename: String,
    pub mime_type: String,
    pub base64_data: String,
}

impl From<&ImageAttachment> for AttachmentPayload {
    fn from(attachment: &ImageAttachment) -> Self {
        Self {
            filename: attachment.filename.clone(),
            mime_type: attachment.mime_type.clone(),
            base64_data: attachment.base64_data.clone(),
        }
    }
}
