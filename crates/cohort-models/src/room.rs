use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Direct,
    Group,
    Broadcast,
}

impl RoomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Broadcast => "broadcast",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            "broadcast" => Some(Self::Broadcast),
            _ => None,
        }
    }
}

/// One authorized participant of a room, with live presence merged in at
/// hydration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipant {
    #[serde(with = "crate::id")]
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: String,
    #[serde(default)]
    pub is_online: bool,
}

/// Immutable authorization snapshot for one room, as returned by the room
/// directory. Re-fetched wholesale on refresh or reconnect; the gateway
/// never patches it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDescriptor {
    #[serde(rename = "id")]
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    #[serde(with = "crate::id::opt", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub participants: Vec<RoomParticipant>,
}

impl RoomDescriptor {
    pub fn participant_ids(&self) -> Vec<i64> {
        self.participants.iter().map(|p| p.id).collect()
    }

    pub fn has_participant(&self, user_id: i64) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    pub fn participant(&self, user_id: i64) -> Option<&RoomParticipant> {
        self.participants.iter().find(|p| p.id == user_id)
    }
}
