pub mod auth;
pub mod calls;
pub mod chat;
pub mod error;
pub mod events;
pub mod presence;
pub mod rooms;
pub mod signaling;
pub mod snowflake;

use std::sync::Arc;

use cohort_db::DbPool;
use cohort_models::gateway::ServerFrame;

use crate::calls::CallEngine;
use crate::events::EventBus;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomDirectory;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub worker_id: u16,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub bus: EventBus,
    pub presence: Arc<PresenceRegistry>,
    pub calls: Arc<CallEngine>,
    pub rooms: RoomDirectory,
    pub config: CoreConfig,
}

impl AppState {
    pub fn new(db: DbPool, config: CoreConfig) -> Self {
        Self {
            rooms: RoomDirectory::new(db.clone()),
            db,
            bus: EventBus::new(),
            presence: Arc::new(PresenceRegistry::new()),
            calls: Arc::new(CallEngine::new()),
            config,
        }
    }

    /// Sends a frame to every live connection of one user.
    pub fn notify_user(&self, user_id: i64, frame: &ServerFrame) {
        let connections = self.presence.connections_of(user_id);
        self.bus.emit_to_connections(&connections, frame);
    }
}
