use kcd_server_domain::{
    ServiceError, ServiceResult,
    account::{User, UserId, UserRepository},
};
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password")?,
        })
    }
}

#[async_trait::async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, username: &str, password_hash: &str) -> ServiceResult<UserId> {
        let result = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await;
        match result {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                ServiceError::not_possible("Username already taken.")
            }
            Err(e) => Err(ServiceError::Internal(e.to_string())),
        }
    }

    async fn get_user_by_name(&self, username: &str) -> ServiceResult<Option<User>> {
        let row = sqlx::query("SELECT id, username, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        row.as_ref()
            .map(Self::user_from_row)
            .transpose()
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }
}
