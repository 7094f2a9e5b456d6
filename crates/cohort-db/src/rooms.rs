//! Queries backing the room directory: who a user may chat with and
//! through which rooms. The gateway treats these as the source of truth
//! and re-reads them wholesale on every hydration.

use crate::users::UserRow;
use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BroadcastRoomRow {
    pub room_key: String,
    pub name: String,
    pub audience_role: Option<String>,
}

/// Users the given user has a direct-chat edge with.
pub async fn get_contact_peers(pool: &DbPool, user_id: i64) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT u.id, u.username, u.email, u.phone, u.avatar_url, u.role
         FROM contacts c
         JOIN users u
           ON u.id = CASE WHEN c.user_a = $1 THEN c.user_b ELSE c.user_a END
         WHERE c.user_a = $1 OR c.user_b = $1
         ORDER BY u.id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_user_groups(pool: &DbPool, user_id: i64) -> Result<Vec<GroupRow>, DbError> {
    let rows = sqlx::query_as::<_, GroupRow>(
        "SELECT g.id, g.name
         FROM group_members gm
         JOIN groups g ON g.id = gm.group_id
         WHERE gm.user_id = $1
         ORDER BY g.id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_group_members(pool: &DbPool, group_id: i64) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT u.id, u.username, u.email, u.phone, u.avatar_url, u.role
         FROM group_members gm
         JOIN users u ON u.id = gm.user_id
         WHERE gm.group_id = $1
         ORDER BY u.id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Broadcast rooms visible to the given role (or to everyone).
pub async fn get_broadcast_rooms(pool: &DbPool, role: &str) -> Result<Vec<BroadcastRoomRow>, DbError> {
    let rows = sqlx::query_as::<_, BroadcastRoomRow>(
        "SELECT room_key, name, audience_role
         FROM broadcast_rooms
         WHERE audience_role IS NULL OR audience_role = $1
         ORDER BY room_key",
    )
    .bind(role)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;
    use crate::users::insert_user;

    async fn seed(pool: &DbPool) {
        insert_user(pool, 1, "ada", "student").await.expect("user");
        insert_user(pool, 2, "grace", "supervisor").await.expect("user");
        insert_user(pool, 3, "linus", "student").await.expect("user");

        sqlx::query("INSERT INTO contacts (user_a, user_b) VALUES (1, 2)")
            .execute(pool)
            .await
            .expect("contact");
        sqlx::query("INSERT INTO groups (id, name) VALUES (10, 'capstone-a')")
            .execute(pool)
            .await
            .expect("group");
        for uid in [1_i64, 3] {
            sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES (10, $1)")
                .bind(uid)
                .execute(pool)
                .await
                .expect("member");
        }
        sqlx::query(
            "INSERT INTO broadcast_rooms (room_key, name, audience_role)
             VALUES ('announcements', 'Announcements', NULL),
                    ('supervisors', 'Supervisors', 'supervisor')",
        )
        .execute(pool)
        .await
        .expect("broadcasts");
    }

    #[tokio::test]
    async fn contact_edges_resolve_from_either_side() {
        let pool = test_pool().await;
        seed(&pool).await;

        let peers_of_1 = get_contact_peers(&pool, 1).await.expect("peers");
        assert_eq!(peers_of_1.len(), 1);
        assert_eq!(peers_of_1[0].id, 2);

        let peers_of_2 = get_contact_peers(&pool, 2).await.expect("peers");
        assert_eq!(peers_of_2[0].id, 1);
    }

    #[tokio::test]
    async fn group_membership_queries() {
        let pool = test_pool().await;
        seed(&pool).await;

        let groups = get_user_groups(&pool, 3).await.expect("groups");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "capstone-a");

        let members = get_group_members(&pool, 10).await.expect("members");
        let ids: Vec<i64> = members.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn broadcast_rooms_filter_by_role() {
        let pool = test_pool().await;
        seed(&pool).await;

        let student = get_broadcast_rooms(&pool, "student").await.expect("rooms");
        assert_eq!(student.len(), 1);
        assert_eq!(student[0].room_key, "announcements");

        let supervisor = get_broadcast_rooms(&pool, "supervisor").await.expect("rooms");
        assert_eq!(supervisor.len(), 2);
    }
}
