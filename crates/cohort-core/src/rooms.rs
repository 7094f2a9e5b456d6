//! Builds the per-user room list from the relational store. Direct
//! rooms come from contact edges, group rooms from memberships, and
//! broadcast rooms from the role-filtered broadcast table. The result
//! is the connection's authorization snapshot until the next refresh.

use cohort_db::rooms as db_rooms;
use cohort_db::users::UserRow;
use cohort_db::DbPool;
use cohort_models::room::{RoomDescriptor, RoomKind, RoomParticipant};
use cohort_models::user::SenderInfo;

use crate::error::GatewayError;
use crate::presence::PresenceRegistry;

pub fn direct_room_key(a: i64, b: i64) -> String {
    format!("dm_{}_{}", a.min(b), a.max(b))
}

pub fn group_room_key(group_id: i64) -> String {
    format!("grp_{group_id}")
}

fn participant_from_user(user: &UserRow) -> RoomParticipant {
    RoomParticipant {
        id: user.id,
        username: user.username.clone(),
        avatar_url: user.avatar_url.clone(),
        role: user.role.clone(),
        is_online: false,
    }
}

pub fn sender_info_from_user(user: &UserRow) -> SenderInfo {
    SenderInfo {
        id: user.id,
        username: user.username.clone(),
        avatar_url: user.avatar_url.clone(),
        role: user.role.clone(),
    }
}

#[derive(Clone)]
pub struct RoomDirectory {
    db: DbPool,
}

impl RoomDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Every room the user belongs to, with participant rosters but
    /// without presence flags.
    pub async fn rooms_for_user(&self, user: &UserRow) -> Result<Vec<RoomDescriptor>, GatewayError> {
        let mut rooms = Vec::new();

        for peer in db_rooms::get_contact_peers(&self.db, user.id).await? {
            rooms.push(RoomDescriptor {
                key: direct_room_key(user.id, peer.id),
                name: peer.username.clone(),
                kind: RoomKind::Direct,
                group_id: None,
                participants: vec![participant_from_user(user), participant_from_user(&peer)],
            });
        }

        for group in db_rooms::get_user_groups(&self.db, user.id).await? {
            let members = db_rooms::get_group_members(&self.db, group.id).await?;
            rooms.push(RoomDescriptor {
                key: group_room_key(group.id),
                name: group.name,
                kind: RoomKind::Group,
                group_id: Some(group.id),
                participants: members.iter().map(participant_from_user).collect(),
            });
        }

        for broadcast in db_rooms::get_broadcast_rooms(&self.db, &user.role).await? {
            rooms.push(RoomDescriptor {
                key: broadcast.room_key,
                name: broadcast.name,
                kind: RoomKind::Broadcast,
                group_id: None,
                participants: Vec::new(),
            });
        }

        Ok(rooms)
    }

    /// Room list with live presence merged into each roster.
    pub async fn hydrate(
        &self,
        user: &UserRow,
        presence: &PresenceRegistry,
    ) -> Result<Vec<RoomDescriptor>, GatewayError> {
        let mut rooms = self.rooms_for_user(user).await?;
        for room in &mut rooms {
            for participant in &mut room.participants {
                participant.is_online = presence.is_online(participant.id);
            }
        }
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_db::users::get_user;

    async fn seeded_pool() -> DbPool {
        let pool = cohort_db::create_pool("sqlite::memory:", 1).await.expect("pool");
        cohort_db::run_migrations(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO users (id, username, role) VALUES
             (1, 'ada', 'student'), (2, 'grace', 'supervisor'), (3, 'linus', 'student')",
        )
        .execute(&pool)
        .await
        .expect("users");
        sqlx::query("INSERT INTO contacts (user_a, user_b) VALUES (1, 2)")
            .execute(&pool)
            .await
            .expect("contacts");
        sqlx::query("INSERT INTO groups (id, name) VALUES (10, 'capstone-a')")
            .execute(&pool)
            .await
            .expect("group");
        sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES (10, 1), (10, 3)")
            .execute(&pool)
            .await
            .expect("members");
        sqlx::query(
            "INSERT INTO broadcast_rooms (room_key, name, audience_role)
             VALUES ('announcements', 'Announcements', NULL)",
        )
        .execute(&pool)
        .await
        .expect("broadcast");
        pool
    }

    #[tokio::test]
    async fn builds_all_three_room_kinds() {
        let pool = seeded_pool().await;
        let directory = RoomDirectory::new(pool.clone());
        let user = get_user(&pool, 1).await.expect("query").expect("user");

        let rooms = directory.rooms_for_user(&user).await.expect("rooms");
        let keys: Vec<&str> = rooms.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["dm_1_2", "grp_10", "announcements"]);

        let dm = &rooms[0];
        assert_eq!(dm.kind, RoomKind::Direct);
        assert_eq!(dm.name, "grace");
        assert!(dm.has_participant(1) && dm.has_participant(2));

        let grp = &rooms[1];
        assert_eq!(grp.group_id, Some(10));
        assert_eq!(grp.participant_ids(), vec![1, 3]);

        assert!(rooms[2].participants.is_empty());
    }

    #[tokio::test]
    async fn direct_room_key_is_order_independent() {
        assert_eq!(direct_room_key(2, 1), "dm_1_2");
        assert_eq!(direct_room_key(1, 2), "dm_1_2");
    }

    #[tokio::test]
    async fn hydration_merges_presence() {
        let pool = seeded_pool().await;
        let directory = RoomDirectory::new(pool.clone());
        let user = get_user(&pool, 1).await.expect("query").expect("user");

        let presence = PresenceRegistry::new();
        presence.add(2, "conn-grace");

        let rooms = directory.hydrate(&user, &presence).await.expect("rooms");
        let dm = rooms.iter().find(|r| r.key == "dm_1_2").expect("dm room");
        let grace = dm.participant(2).expect("grace");
        assert!(grace.is_online);
        let ada = dm.participant(1).expect("ada");
        assert!(!ada.is_online);
    }
}
