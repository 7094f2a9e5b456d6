//! In-process fanout. Each websocket connection registers an unbounded
//! sender keyed by connection id; room membership is a second index so
//! broadcasts touch only the relevant connections. Sends to a closed
//! channel are dropped silently; the owning task unregisters on exit.

use std::collections::HashSet;
use std::sync::Arc;

use cohort_models::gateway::ServerFrame;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Default)]
struct BusInner {
    senders: DashMap<String, UnboundedSender<ServerFrame>>,
    rooms: DashMap<String, HashSet<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: &str) -> UnboundedReceiver<ServerFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.senders.insert(connection_id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, connection_id: &str) {
        self.inner.senders.remove(connection_id);
        self.inner.rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    /// Replaces the connection's room memberships wholesale. Used on
    /// hydration and re-hydration.
    pub fn set_rooms(&self, connection_id: &str, room_keys: &[String]) {
        let keep: HashSet<&String> = room_keys.iter().collect();
        self.inner.rooms.retain(|key, members| {
            if !keep.contains(key) {
                members.remove(connection_id);
            }
            !members.is_empty()
        });
        for key in room_keys {
            self.inner
                .rooms
                .entry(key.clone())
                .or_default()
                .insert(connection_id.to_string());
        }
    }

    pub fn emit_to_connection(&self, connection_id: &str, frame: ServerFrame) {
        if let Some(tx) = self.inner.senders.get(connection_id) {
            let _ = tx.send(frame);
        }
    }

    pub fn emit_to_connections(&self, connection_ids: &[String], frame: &ServerFrame) {
        for id in connection_ids {
            self.emit_to_connection(id, frame.clone());
        }
    }

    pub fn emit_to_room(&self, room_key: &str, frame: &ServerFrame) {
        let members: Vec<String> = match self.inner.rooms.get(room_key) {
            Some(set) => set.iter().cloned().collect(),
            None => return,
        };
        self.emit_to_connections(&members, frame);
    }

    /// Broadcast across several rooms; a connection in more than one of
    /// them receives the frame once.
    pub fn emit_to_rooms(&self, room_keys: &[String], frame: &ServerFrame) {
        let mut seen: HashSet<String> = HashSet::new();
        for key in room_keys {
            if let Some(set) = self.inner.rooms.get(key) {
                for id in set.iter() {
                    seen.insert(id.clone());
                }
            }
        }
        for id in seen {
            self.emit_to_connection(&id, frame.clone());
        }
    }

    pub fn room_connections(&self, room_key: &str) -> Vec<String> {
        self.inner
            .rooms
            .get(room_key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str) -> ServerFrame {
        ServerFrame::event(event, serde_json::json!({}))
    }

    #[tokio::test]
    async fn room_broadcast_reaches_members_only() {
        let bus = EventBus::new();
        let mut rx_a = bus.register("a");
        let mut rx_b = bus.register("b");

        bus.set_rooms("a", &["dm_1_2".into()]);
        bus.set_rooms("b", &["grp_9".into()]);

        bus.emit_to_room("dm_1_2", &frame("chat:new-message"));

        assert_eq!(rx_a.recv().await.expect("frame").event, "chat:new-message");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn multi_room_broadcast_is_deduplicated() {
        let bus = EventBus::new();
        let mut rx = bus.register("a");
        bus.set_rooms("a", &["dm_1_2".into(), "grp_9".into()]);

        bus.emit_to_rooms(&["dm_1_2".into(), "grp_9".into()], &frame("chat:user-status"));

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_rooms_replaces_memberships() {
        let bus = EventBus::new();
        let mut rx = bus.register("a");
        bus.set_rooms("a", &["dm_1_2".into()]);
        bus.set_rooms("a", &["grp_9".into()]);

        bus.emit_to_room("dm_1_2", &frame("x"));
        bus.emit_to_room("grp_9", &frame("y"));

        assert_eq!(rx.recv().await.expect("frame").event, "y");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_sweeps_room_index() {
        let bus = EventBus::new();
        let _rx = bus.register("a");
        bus.set_rooms("a", &["dm_1_2".into()]);
        bus.unregister("a");

        assert!(bus.room_connections("dm_1_2").is_empty());
        // Emitting to a gone connection is a no-op.
        bus.emit_to_connection("a", frame("late"));
    }
}
