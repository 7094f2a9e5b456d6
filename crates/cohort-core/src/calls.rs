//! Live call membership and screen-share state, keyed by room. All
//! state is memory-only: a restart drops active calls, and clients
//! re-ring. Every mutation happens under the room's map entry, so
//! concurrent signaling on one call serializes here.

use std::collections::HashSet;

use dashmap::DashMap;

#[derive(Debug, Default)]
struct CallRoom {
    participants: HashSet<i64>,
    screen_sharer: Option<i64>,
}

fn sorted_members(room: &CallRoom) -> Vec<i64> {
    let mut members: Vec<i64> = room.participants.iter().copied().collect();
    members.sort_unstable();
    members
}

/// Snapshot handed back by [`CallEngine::join_pair`].
#[derive(Debug, Clone)]
pub struct AcceptSnapshot {
    /// Members after the join, including both joined users.
    pub members: Vec<i64>,
    pub screen_sharer: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub was_member: bool,
    pub session_ended: bool,
    pub share_cleared: bool,
    pub remaining: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct RoomCleanup {
    pub room_key: String,
    pub session_ended: bool,
    pub share_cleared: bool,
    pub remaining: Vec<i64>,
}

#[derive(Debug, Default)]
pub struct CallEngine {
    rooms: DashMap<String, CallRoom>,
}

impl CallEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds both sides of an accepted ring to the call, creating the
    /// session on first accept.
    pub fn join_pair(&self, room_key: &str, caller: i64, acceptor: i64) -> AcceptSnapshot {
        let mut room = self.rooms.entry(room_key.to_string()).or_default();
        room.participants.insert(caller);
        room.participants.insert(acceptor);
        AcceptSnapshot {
            members: sorted_members(&room),
            screen_sharer: room.screen_sharer,
        }
    }

    pub fn leave(&self, room_key: &str, user_id: i64) -> LeaveOutcome {
        let mut outcome = LeaveOutcome {
            was_member: false,
            session_ended: false,
            share_cleared: false,
            remaining: Vec::new(),
        };
        self.rooms.remove_if_mut(room_key, |_, room| {
            outcome.was_member = room.participants.remove(&user_id);
            if room.screen_sharer == Some(user_id) {
                room.screen_sharer = None;
                outcome.share_cleared = true;
            }
            outcome.session_ended = room.participants.is_empty();
            outcome.remaining = room.participants.iter().copied().collect();
            outcome.remaining.sort_unstable();
            outcome.session_ended
        });
        outcome
    }

    /// Updates the screen-share holder. Setting overwrites any current
    /// holder and may precede the session itself, so a caller can start
    /// sharing before the first accept. Clearing succeeds only for the
    /// holder themselves. Returns the member list to notify.
    pub fn set_screen_share(&self, room_key: &str, user_id: i64, sharing: bool) -> Vec<i64> {
        if sharing {
            let mut room = self.rooms.entry(room_key.to_string()).or_default();
            room.screen_sharer = Some(user_id);
            sorted_members(&room)
        } else {
            let Some(mut room) = self.rooms.get_mut(room_key) else {
                return Vec::new();
            };
            if room.screen_sharer == Some(user_id) {
                room.screen_sharer = None;
            }
            sorted_members(&room)
        }
    }

    pub fn screen_sharer(&self, room_key: &str) -> Option<i64> {
        self.rooms.get(room_key).and_then(|room| room.screen_sharer)
    }

    pub fn members(&self, room_key: &str) -> Vec<i64> {
        self.rooms
            .get(room_key)
            .map(|room| sorted_members(&room))
            .unwrap_or_default()
    }

    /// Disconnect sweep: removes the user from every call they are in,
    /// including rooms where they only hold the screen share.
    pub fn remove_user_everywhere(&self, user_id: i64) -> Vec<RoomCleanup> {
        let keys: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| {
                entry.value().participants.contains(&user_id)
                    || entry.value().screen_sharer == Some(user_id)
            })
            .map(|entry| entry.key().clone())
            .collect();

        keys.into_iter()
            .map(|room_key| {
                let outcome = self.leave(&room_key, user_id);
                RoomCleanup {
                    room_key,
                    session_ended: outcome.session_ended,
                    share_cleared: outcome.share_cleared,
                    remaining: outcome.remaining,
                }
            })
            .collect()
    }
}
