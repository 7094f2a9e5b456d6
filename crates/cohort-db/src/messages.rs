//! Chat message persistence. Rows carry the participant snapshot taken
//! at send time so history formatting never depends on later roster
//! changes. JSON-ish columns (participants, attachments, contact, meta,
//! deleted_for) are stored as TEXT and decoded here.

use chrono::{DateTime, Utc};
use cohort_models::message::DELETED_MESSAGE_TEXT;
use serde_json::Value;
use sqlx::Row;

use crate::{
    bool_from_any_row, datetime_from_db_text, datetime_to_db_text, id_list_from_db_text,
    json_from_db_text, DbError, DbPool,
};

#[derive(Debug, Clone)]
pub struct ChatMessageRow {
    pub id: i64,
    pub room_key: String,
    pub room_kind: String,
    pub group_id: Option<i64>,
    pub sender_id: i64,
    pub participants: Vec<i64>,
    pub body: String,
    pub message_kind: String,
    pub attachments: Value,
    pub contact: Option<Value>,
    pub deleted_for: Vec<i64>,
    pub is_deleted: bool,
    pub is_encrypted: bool,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ChatMessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let participants: String = row.try_get("participants")?;
        let attachments: String = row.try_get("attachments")?;
        let contact: Option<String> = row.try_get("contact")?;
        let deleted_for: String = row.try_get("deleted_for")?;
        let meta: Option<String> = row.try_get("meta")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            room_key: row.try_get("room_key")?,
            room_kind: row.try_get("room_kind")?,
            group_id: row.try_get("group_id")?,
            sender_id: row.try_get("sender_id")?,
            participants: id_list_from_db_text(&participants)?,
            body: row.try_get("body")?,
            message_kind: row.try_get("message_kind")?,
            attachments: json_from_db_text(&attachments)?,
            contact: contact.as_deref().map(json_from_db_text).transpose()?,
            deleted_for: id_list_from_db_text(&deleted_for)?,
            is_deleted: bool_from_any_row(row, "is_deleted")?,
            is_encrypted: bool_from_any_row(row, "is_encrypted")?,
            meta: meta.as_deref().map(json_from_db_text).transpose()?,
            created_at: datetime_from_db_text(&created_at)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub id: i64,
    pub room_key: String,
    pub room_kind: String,
    pub group_id: Option<i64>,
    pub sender_id: i64,
    pub participants: Vec<i64>,
    pub body: String,
    pub message_kind: String,
    pub attachments: Value,
    pub contact: Option<Value>,
    pub is_encrypted: bool,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub async fn create_message(pool: &DbPool, new: &NewChatMessage) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO chat_messages
         (id, room_key, room_kind, group_id, sender_id, participants, body,
          message_kind, attachments, contact, deleted_for, is_deleted,
          is_encrypted, meta, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, '[]', 0, $11, $12, $13)",
    )
    .bind(new.id)
    .bind(&new.room_key)
    .bind(&new.room_kind)
    .bind(new.group_id)
    .bind(new.sender_id)
    .bind(serde_json::to_string(&new.participants).unwrap_or_else(|_| "[]".into()))
    .bind(&new.body)
    .bind(&new.message_kind)
    .bind(new.attachments.to_string())
    .bind(new.contact.as_ref().map(|v| v.to_string()))
    .bind(new.is_encrypted as i32)
    .bind(new.meta.as_ref().map(|v| v.to_string()))
    .bind(datetime_to_db_text(new.created_at))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<ChatMessageRow>, DbError> {
    let row = sqlx::query_as::<_, ChatMessageRow>("SELECT * FROM chat_messages WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Most-recent-first page of a room's messages. `before` paginates by
/// message id, which is time-ordered.
pub async fn get_room_messages(
    pool: &DbPool,
    room_key: &str,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<ChatMessageRow>, DbError> {
    let rows = match before {
        Some(before_id) => {
            sqlx::query_as::<_, ChatMessageRow>(
                "SELECT * FROM chat_messages
                 WHERE room_key = $1 AND id < $2
                 ORDER BY id DESC LIMIT $3",
            )
            .bind(room_key)
            .bind(before_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ChatMessageRow>(
                "SELECT * FROM chat_messages
                 WHERE room_key = $1
                 ORDER BY id DESC LIMIT $2",
            )
            .bind(room_key)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Scrubs the message content in place. The row survives as a tombstone
/// so history still shows the placeholder text.
pub async fn mark_deleted_for_everyone(pool: &DbPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE chat_messages
         SET is_deleted = 1, body = $1, attachments = '[]', contact = NULL
         WHERE id = $2",
    )
    .bind(DELETED_MESSAGE_TEXT)
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Hides the message from one user only. Idempotent.
pub async fn add_deleted_for(pool: &DbPool, id: i64, user_id: i64) -> Result<(), DbError> {
    let row = get_message(pool, id).await?.ok_or(DbError::NotFound)?;
    if row.deleted_for.contains(&user_id) {
        return Ok(());
    }
    let mut hidden = row.deleted_for;
    hidden.push(user_id);
    sqlx::query("UPDATE chat_messages SET deleted_for = $1 WHERE id = $2")
        .bind(serde_json::to_string(&hidden).unwrap_or_else(|_| "[]".into()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    fn sample(id: i64, body: &str) -> NewChatMessage {
        NewChatMessage {
            id,
            room_key: "dm_1_2".into(),
            room_kind: "direct".into(),
            group_id: None,
            sender_id: 1,
            participants: vec![1, 2],
            body: body.into(),
            message_kind: "text".into(),
            attachments: serde_json::json!([]),
            contact: None,
            is_encrypted: false,
            meta: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn inserts_and_reads_back() {
        let pool = test_pool().await;
        create_message(&pool, &sample(100, "hello")).await.expect("insert");

        let row = get_message(&pool, 100).await.expect("query").expect("exists");
        assert_eq!(row.body, "hello");
        assert_eq!(row.participants, vec![1, 2]);
        assert!(!row.is_deleted);
        assert!(row.deleted_for.is_empty());
    }

    #[tokio::test]
    async fn pages_most_recent_first() {
        let pool = test_pool().await;
        for (id, body) in [(1, "a"), (2, "b"), (3, "c")] {
            create_message(&pool, &sample(id, body)).await.expect("insert");
        }

        let latest = get_room_messages(&pool, "dm_1_2", None, 2).await.expect("page");
        let ids: Vec<i64> = latest.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let older = get_room_messages(&pool, "dm_1_2", Some(2), 10)
            .await
            .expect("page");
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].id, 1);
    }

    #[tokio::test]
    async fn delete_for_everyone_scrubs_content() {
        let pool = test_pool().await;
        let mut msg = sample(7, "secret");
        msg.attachments = serde_json::json!([{"url": "/f/1", "fileName": "x.png"}]);
        create_message(&pool, &msg).await.expect("insert");

        mark_deleted_for_everyone(&pool, 7).await.expect("delete");

        let row = get_message(&pool, 7).await.expect("query").expect("exists");
        assert!(row.is_deleted);
        assert_eq!(row.body, DELETED_MESSAGE_TEXT);
        assert_eq!(row.attachments, serde_json::json!([]));
        assert!(row.contact.is_none());

        assert!(matches!(
            mark_deleted_for_everyone(&pool, 999).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_for_me_is_idempotent() {
        let pool = test_pool().await;
        create_message(&pool, &sample(8, "hi")).await.expect("insert");

        add_deleted_for(&pool, 8, 2).await.expect("hide");
        add_deleted_for(&pool, 8, 2).await.expect("hide again");

        let row = get_message(&pool, 8).await.expect("query").expect("exists");
        assert_eq!(row.deleted_for, vec![2]);
        assert!(!row.is_deleted);
    }
}
