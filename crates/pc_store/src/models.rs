//! Conversation message record, serialised as JSON inside each sealed file.

use chrono::Utc;
use pc_crypto::ContentKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    /// "text" / "image"
    pub content_type: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// true = sent by the local user, false = received.
    pub is_sent: bool,
}

impl StoredMessage {
    fn new(
        sender: &str,
        recipient: &str,
        content: String,
        kind: ContentKind,
        is_sent: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content,
            content_type: kind.as_str().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            is_sent,
        }
    }

    pub fn new_outgoing(local: &str, peer: &str, content: String, kind: ContentKind) -> Self {
        Self::new(local, peer, content, kind, true)
    }

    pub fn new_incoming(peer: &str, local: &str, content: String, kind: ContentKind) -> Self {
        Self::new(peer, local, content, kind, false)
    }

    /// The other party of the conversation, seen from the local user.
    pub fn peer(&self) -> &str {
        if self.is_sent {
            &self.recipient
        } else {
            &self.sender
        }
    }
}
