use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::SenderInfo;

/// Body substituted for a message deleted for everyone.
pub const DELETED_MESSAGE_TEXT: &str = "This message was deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    Contact,
    VideoCall,
    AudioCall,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Contact => "contact",
            Self::VideoCall => "video_call",
            Self::AudioCall => "audio_call",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "document" => Some(Self::Document),
            "contact" => Some(Self::Contact),
            "video_call" => Some(Self::VideoCall),
            "audio_call" => Some(Self::AudioCall),
            _ => None,
        }
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

/// Descriptor of one uploaded file attached to a message. The gateway never
/// touches the bytes; uploads go through the object store out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub storage_id: Option<String>,
    pub file_name: String,
    pub file_type: String,
    #[serde(default)]
    pub file_size: i64,
}

/// A shared contact card. Display fields left unset by the client are
/// inlined from the referenced user when resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCard {
    #[serde(with = "crate::id")]
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Missed,
    Declined,
    Completed,
}

/// Metadata block used only by call-record message kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_status: Option<CallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Wire-formatted message pushed to clients and returned from history
/// fetches. Body/attachments/contact are suppressed when the message has
/// been deleted for everyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(with = "crate::id")]
    pub id: i64,
    pub room_key: String,
    pub text: String,
    pub message_type: MessageKind,
    pub attachments: Vec<Attachment>,
    pub contact_data: Option<ContactCard>,
    pub sender: SenderInfo,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::id::vec")]
    pub read_by: Vec<i64>,
    #[serde(with = "crate::id::vec")]
    pub delivered_to: Vec<i64>,
    pub is_deleted: bool,
    #[serde(with = "crate::id::vec")]
    pub deleted_by: Vec<i64>,
    pub is_encrypted: bool,
    pub meta: Option<CallMeta>,
}
