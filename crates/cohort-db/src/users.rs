use crate::{placeholders, DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
}

pub async fn get_user(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, phone, avatar_url, role FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_users_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<UserRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, username, email, phone, avatar_url, role FROM users WHERE id IN ({})",
        placeholders(1, ids.len())
    );
    let mut query = sqlx::query_as::<_, UserRow>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(pool).await?)
}

#[cfg(test)]
pub(crate) async fn insert_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    role: &str,
) -> Result<(), DbError> {
    sqlx::query("INSERT INTO users (id, username, role) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(username)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    #[tokio::test]
    async fn fetches_users_by_id_set() {
        let pool = test_pool().await;
        insert_user(&pool, 1, "ada", "student").await.expect("user");
        insert_user(&pool, 2, "grace", "supervisor")
            .await
            .expect("user");

        let one = get_user(&pool, 1).await.expect("query").expect("exists");
        assert_eq!(one.username, "ada");

        let many = get_users_by_ids(&pool, &[1, 2, 99]).await.expect("query");
        assert_eq!(many.len(), 2);

        assert!(get_users_by_ids(&pool, &[]).await.expect("query").is_empty());
        assert!(get_user(&pool, 42).await.expect("query").is_none());
    }
}
