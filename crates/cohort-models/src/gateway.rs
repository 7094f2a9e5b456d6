use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Attachment, CallMeta, ContactCard, MessageKind};

// Client -> server events
pub const EVENT_SEND: &str = "chat:send";
pub const EVENT_MARK_DELIVERED: &str = "chat:mark-delivered";
pub const EVENT_MARK_READ: &str = "chat:mark-read";
pub const EVENT_DELETE: &str = "chat:delete";
pub const EVENT_HISTORY: &str = "chat:history";
pub const EVENT_REFRESH: &str = "chat:refresh";
pub const EVENT_RING: &str = "rtc:ring";
pub const EVENT_RING_ACCEPT: &str = "rtc:ring:accept";
pub const EVENT_RING_DECLINE: &str = "rtc:ring:decline";
pub const EVENT_OFFER: &str = "rtc:offer";
pub const EVENT_ANSWER: &str = "rtc:answer";
pub const EVENT_CANDIDATE: &str = "rtc:candidate";
pub const EVENT_END: &str = "rtc:end";
pub const EVENT_SCREEN_SHARE: &str = "rtc:screen-share";

// Server -> client events
pub const EVENT_ACK: &str = "ack";
pub const EVENT_ROOMS: &str = "chat:rooms";
pub const EVENT_NEW_MESSAGE: &str = "chat:new-message";
pub const EVENT_MESSAGE_DELIVERED: &str = "chat:message-delivered";
pub const EVENT_MESSAGES_READ: &str = "chat:messages-read";
pub const EVENT_MESSAGE_DELETED: &str = "chat:message-deleted";
pub const EVENT_USER_STATUS: &str = "chat:user-status";
pub const EVENT_ERROR: &str = "chat:error";
pub const EVENT_SCREEN_SHARE_UPDATE: &str = "rtc:screen-share-update";

/// One JSON text frame received from a client. `ack`, when present, asks
/// for an acknowledgement frame carrying the same correlation number.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

/// One JSON text frame pushed to a client.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl ServerFrame {
    pub fn event(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
            ack: None,
        }
    }

    pub fn ack(ack: u64, data: Value) -> Self {
        Self {
            event: EVENT_ACK.to_string(),
            data,
            ack: Some(ack),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    #[serde(default)]
    pub room_key: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub contact_data: Option<ContactCard>,
    #[serde(default)]
    pub message_type: Option<MessageKind>,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub meta: Option<CallMeta>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPayload {
    #[serde(default)]
    pub room_key: String,
    #[serde(with = "crate::id::vec", default)]
    pub message_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload {
    #[serde(with = "crate::id::opt", default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub delete_for_everyone: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPayload {
    #[serde(default)]
    pub room_key: String,
    #[serde(with = "crate::id::opt", default)]
    pub before: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Common shape of every rtc:* event addressed at a peer. Event-specific
/// extras (offer, answer, candidate, peers, isAudioOnly) ride along in
/// `extra` and are relayed opaquely.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    #[serde(with = "crate::id::opt", default)]
    pub to: Option<i64>,
    #[serde(default)]
    pub room_key: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenSharePayload {
    #[serde(default)]
    pub room_key: String,
    #[serde(default)]
    pub is_sharing: bool,
}
