//! Maps users to their live connections. A user is online while at
//! least one connection is registered; multiple devices share one
//! presence entry.

use std::collections::HashSet;

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: DashMap<i64, HashSet<String>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Returns true when this was the user's
    /// offline to online transition.
    pub fn add(&self, user_id: i64, connection_id: &str) -> bool {
        let mut entry = self.connections.entry(user_id).or_default();
        let was_offline = entry.is_empty();
        entry.insert(connection_id.to_string());
        was_offline
    }

    /// Removes a connection. Returns true when this was the user's last
    /// connection, i.e. the online to offline transition.
    pub fn remove(&self, user_id: i64, connection_id: &str) -> bool {
        let mut went_offline = false;
        self.connections.remove_if_mut(&user_id, |_, set| {
            set.remove(connection_id);
            went_offline = set.is_empty();
            went_offline
        });
        went_offline
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.connections
            .get(&user_id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    pub fn connections_of(&self, user_id: i64) -> Vec<String> {
        self.connections
            .get(&user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn online_users(&self) -> Vec<i64> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_fire_only_at_edges() {
        let presence = PresenceRegistry::new();

        assert!(presence.add(1, "conn-a"));
        assert!(!presence.add(1, "conn-b"));
        assert!(presence.is_online(1));

        assert!(!presence.remove(1, "conn-a"));
        assert!(presence.is_online(1));
        assert!(presence.remove(1, "conn-b"));
        assert!(!presence.is_online(1));
        assert!(presence.connections_of(1).is_empty());
    }

    #[test]
    fn duplicate_connection_ids_collapse() {
        let presence = PresenceRegistry::new();
        assert!(presence.add(7, "conn"));
        assert!(!presence.add(7, "conn"));
        assert_eq!(presence.connections_of(7).len(), 1);
        assert!(presence.remove(7, "conn"));
    }

    #[test]
    fn removing_unknown_connection_is_harmless() {
        let presence = PresenceRegistry::new();
        assert!(!presence.remove(9, "ghost"));

        presence.add(9, "real");
        assert!(!presence.remove(9, "ghost"));
        assert!(presence.is_online(9));
    }

    #[test]
    fn online_users_reflects_live_entries() {
        let presence = PresenceRegistry::new();
        presence.add(1, "a");
        presence.add(2, "b");
        presence.remove(1, "a");

        let online = presence.online_users();
        assert_eq!(online, vec![2]);
    }

    #[test]
    fn rapid_reconnect_interleaving() {
        // Second device connects before the first disconnects; the user
        // never reads as offline in between.
        let presence = PresenceRegistry::new();
        assert!(presence.add(5, "old"));
        assert!(!presence.add(5, "new"));
        assert!(!presence.remove(5, "old"));
        assert!(presence.is_online(5));
        assert!(presence.remove(5, "new"));
    }
}
