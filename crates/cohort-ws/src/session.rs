use cohort_db::users::UserRow;
use cohort_models::room::RoomDescriptor;
use cohort_models::user::SenderInfo;

/// Per-connection state. `rooms` is the authorization snapshot taken at
/// hydration; it goes stale until the next refresh or reconnect, which
/// is the accepted tradeoff for lock-free dispatch.
pub struct Session {
    pub connection_id: String,
    pub user_id: i64,
    pub role: String,
    pub profile: SenderInfo,
    pub rooms: Vec<RoomDescriptor>,
}

impl Session {
    pub fn new(user: &UserRow) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id,
            role: user.role.clone(),
            profile: SenderInfo {
                id: user.id,
                username: user.username.clone(),
                avatar_url: user.avatar_url.clone(),
                role: user.role.clone(),
            },
            rooms: Vec::new(),
        }
    }

    pub fn room_keys(&self) -> Vec<String> {
        self.rooms.iter().map(|room| room.key.clone()).collect()
    }
}
