//! Delivery and read receipts. Both tables are keyed by (message, user)
//! so repeated marks collapse into a single row.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::{datetime_from_db_text, datetime_to_db_text, placeholders, DbError, DbPool};

#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub message_id: i64,
    pub user_id: i64,
    pub at: DateTime<Utc>,
}

fn receipt_from_row(row: &sqlx::any::AnyRow, at_column: &str) -> Result<ReceiptRow, sqlx::Error> {
    let at: String = row.try_get(at_column)?;
    Ok(ReceiptRow {
        message_id: row.try_get("message_id")?,
        user_id: row.try_get("user_id")?,
        at: datetime_from_db_text(&at)?,
    })
}

/// Records delivery to a user. Later marks refresh the timestamp.
pub async fn upsert_delivery(
    pool: &DbPool,
    message_id: i64,
    room_key: &str,
    user_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO chat_delivery_receipts (message_id, room_key, user_id, delivered_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (message_id, user_id) DO UPDATE SET delivered_at = EXCLUDED.delivered_at",
    )
    .bind(message_id)
    .bind(room_key)
    .bind(user_id)
    .bind(datetime_to_db_text(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

/// Records a read mark. Returns true only on the first mark, so callers
/// can skip fanning out receipts that changed nothing.
pub async fn insert_read_if_absent(
    pool: &DbPool,
    message_id: i64,
    room_key: &str,
    user_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO chat_read_receipts (message_id, room_key, user_id, read_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (message_id, user_id) DO NOTHING",
    )
    .bind(message_id)
    .bind(room_key)
    .bind(user_id)
    .bind(datetime_to_db_text(Utc::now()))
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_delivery_for_messages(
    pool: &DbPool,
    message_ids: &[i64],
) -> Result<Vec<ReceiptRow>, DbError> {
    fetch_receipts(pool, "chat_delivery_receipts", "delivered_at", message_ids).await
}

pub async fn get_read_for_messages(
    pool: &DbPool,
    message_ids: &[i64],
) -> Result<Vec<ReceiptRow>, DbError> {
    fetch_receipts(pool, "chat_read_receipts", "read_at", message_ids).await
}

async fn fetch_receipts(
    pool: &DbPool,
    table: &str,
    at_column: &str,
    message_ids: &[i64],
) -> Result<Vec<ReceiptRow>, DbError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT message_id, user_id, {at_column} FROM {table} WHERE message_id IN ({})",
        placeholders(1, message_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in message_ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter()
        .map(|row| receipt_from_row(row, at_column).map_err(DbError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    #[tokio::test]
    async fn delivery_upserts_collapse() {
        let pool = test_pool().await;

        upsert_delivery(&pool, 1, "dm_1_2", 2).await.expect("first");
        upsert_delivery(&pool, 1, "dm_1_2", 2).await.expect("second");

        let receipts = get_delivery_for_messages(&pool, &[1]).await.expect("fetch");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].user_id, 2);
    }

    #[tokio::test]
    async fn read_marks_report_first_insert_only() {
        let pool = test_pool().await;

        assert!(insert_read_if_absent(&pool, 1, "dm_1_2", 2).await.expect("first"));
        assert!(!insert_read_if_absent(&pool, 1, "dm_1_2", 2).await.expect("repeat"));

        let receipts = get_read_for_messages(&pool, &[1, 2]).await.expect("fetch");
        assert_eq!(receipts.len(), 1);

        assert!(get_read_for_messages(&pool, &[]).await.expect("empty").is_empty());
    }
}
