//! MySQL user DAO.
//!
//! Every statement runs on a single `MySqlConnection`, so the same SQL serves
//! [`MySqlUserDao`] (a pooled connection per call) and [`TxUserDao`] (the
//! connection of an open transaction).
//!
//! Usernames and emails are bound in their normalized form; the columns
//! compare byte-for-byte.

use crate::dao::UserDao;
use crate::DatabasePool;
use async_trait::async_trait;
use bastion_core::{normalize_identifier, BastionError, BastionResult, NewUser, PageRequest, User, UserId, UserStatus};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySqlConnection};
use std::sync::Arc;
use tracing::debug;

const DELETED: i16 = UserStatus::Deleted.as_i16();

const SELECT_USER: &str = r#"
    SELECT id, username, email, password_hash, display_name, avatar_url,
           role, status, created_at, updated_at
    FROM users
    WHERE id = ? AND status <> ?
"#;

const SELECT_ID_BY_USERNAME: &str = "SELECT id FROM users WHERE username = ? AND status <> ?";
const SELECT_ID_BY_EMAIL: &str = "SELECT id FROM users WHERE email = ? AND status <> ?";

/// Database row representation of a user.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    role: String,
    status: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = BastionError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|e| BastionError::internal(format!("Invalid role for user {}: {e}", row.id)))?;

        Ok(User {
            id: UserId::new(row.id),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            role,
            status: UserStatus::from_i16(row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

async fn find_user(conn: &mut MySqlConnection, id: UserId) -> BastionResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(SELECT_USER)
        .bind(id.into_inner())
        .bind(DELETED)
        .fetch_optional(conn)
        .await?;

    row.map(User::try_from).transpose()
}

async fn resolve_id(conn: &mut MySqlConnection, sql: &'static str, value: &str) -> BastionResult<Option<UserId>> {
    let id: Option<i64> = sqlx::query_scalar(sql)
        .bind(normalize_identifier(value))
        .bind(DELETED)
        .fetch_optional(conn)
        .await?;

    Ok(id.map(UserId::new))
}

async fn list_users(conn: &mut MySqlConnection, page: PageRequest) -> BastionResult<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, email, password_hash, display_name, avatar_url,
               role, status, created_at, updated_at
        FROM users
        WHERE status <> ?
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(DELETED)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(User::try_from).collect()
}

async fn count_users(conn: &mut MySqlConnection) -> BastionResult<u64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE status <> ?")
        .bind(DELETED)
        .fetch_one(conn)
        .await?;

    Ok(u64::try_from(total).unwrap_or_default())
}

async fn insert_user(conn: &mut MySqlConnection, new_user: &NewUser) -> BastionResult<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, display_name, role, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(normalize_identifier(&new_user.username))
    .bind(normalize_identifier(&new_user.email))
    .bind(&new_user.password_hash)
    .bind(&new_user.display_name)
    .bind(new_user.role.as_str())
    .bind(UserStatus::Active.as_i16())
    .execute(&mut *conn)
    .await?;

    let id = i64::try_from(result.last_insert_id())
        .map_err(|_| BastionError::internal("insert id out of range"))
        .map(UserId::new)?;

    find_user(conn, id)
        .await?
        .ok_or_else(|| BastionError::internal(format!("user {id} vanished after insert")))
}

async fn update_user(conn: &mut MySqlConnection, user: &User) -> BastionResult<User> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET username = ?, email = ?, display_name = ?, avatar_url = ?,
            role = ?, status = ?, updated_at = CURRENT_TIMESTAMP(6)
        WHERE id = ? AND status <> ?
        "#,
    )
    .bind(normalize_identifier(&user.username))
    .bind(normalize_identifier(&user.email))
    .bind(&user.display_name)
    .bind(&user.avatar_url)
    .bind(user.role.as_str())
    .bind(user.status.as_i16())
    .bind(user.id.into_inner())
    .bind(DELETED)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(BastionError::not_found("user", user.id));
    }

    find_user(conn, user.id)
        .await?
        .ok_or_else(|| BastionError::not_found("user", user.id))
}

async fn set_password(conn: &mut MySqlConnection, id: UserId, password_hash: &str) -> BastionResult<()> {
    let result = sqlx::query(
        "UPDATE users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP(6) WHERE id = ? AND status <> ?",
    )
    .bind(password_hash)
    .bind(id.into_inner())
    .bind(DELETED)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(BastionError::not_found("user", id));
    }
    Ok(())
}

async fn mark_deleted(conn: &mut MySqlConnection, id: UserId) -> BastionResult<bool> {
    let result = sqlx::query(
        "UPDATE users SET status = ?, updated_at = CURRENT_TIMESTAMP(6) WHERE id = ? AND status <> ?",
    )
    .bind(DELETED)
    .bind(id.into_inner())
    .bind(DELETED)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// MySQL user DAO.
#[derive(Clone)]
pub struct MySqlUserDao {
    pool: Arc<DatabasePool>,
}

impl MySqlUserDao {
    /// Creates a new MySQL user DAO.
    #[must_use]
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDao for MySqlUserDao {
    async fn find_by_id(&self, id: UserId) -> BastionResult<Option<User>> {
        debug!("Finding user by id: {}", id);
        let mut conn = self.pool.inner().acquire().await?;
        find_user(&mut conn, id).await
    }

    async fn find_id_by_username(&self, username: &str) -> BastionResult<Option<UserId>> {
        debug!("Resolving username: {}", username);
        let mut conn = self.pool.inner().acquire().await?;
        resolve_id(&mut conn, SELECT_ID_BY_USERNAME, username).await
    }

    async fn find_id_by_email(&self, email: &str) -> BastionResult<Option<UserId>> {
        debug!("Resolving email: {}", email);
        let mut conn = self.pool.inner().acquire().await?;
        resolve_id(&mut conn, SELECT_ID_BY_EMAIL, email).await
    }

    async fn list(&self, page: PageRequest) -> BastionResult<Vec<User>> {
        debug!("Listing users, page: {}, size: {}", page.page, page.size);
        let mut conn = self.pool.inner().acquire().await?;
        list_users(&mut conn, page).await
    }

    async fn count(&self) -> BastionResult<u64> {
        let mut conn = self.pool.inner().acquire().await?;
        count_users(&mut conn).await
    }

    async fn insert(&self, new_user: &NewUser) -> BastionResult<User> {
        debug!("Inserting user: {}", new_user.username);
        let mut conn = self.pool.inner().acquire().await?;
        insert_user(&mut conn, new_user).await
    }

    async fn update(&self, user: &User) -> BastionResult<User> {
        debug!("Updating user: {}", user.id);
        let mut conn = self.pool.inner().acquire().await?;
        update_user(&mut conn, user).await
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> BastionResult<()> {
        debug!("Updating password for user: {}", id);
        let mut conn = self.pool.inner().acquire().await?;
        set_password(&mut conn, id, password_hash).await
    }

    async fn soft_delete(&self, id: UserId) -> BastionResult<bool> {
        debug!("Soft-deleting user: {}", id);
        let mut conn = self.pool.inner().acquire().await?;
        mark_deleted(&mut conn, id).await
    }
}

/// User statements bound to an open transaction.
///
/// Built from the transaction handed out by
/// [`UnitOfWork`](crate::UnitOfWork); nothing it writes is visible to other
/// connections until that transaction commits.
pub struct TxUserDao<'t> {
    conn: &'t mut MySqlConnection,
}

impl<'t> TxUserDao<'t> {
    /// Binds the DAO to `conn`, usually `&mut *tx` of a transaction.
    pub fn new(conn: &'t mut MySqlConnection) -> Self {
        Self { conn }
    }

    pub async fn find_by_id(&mut self, id: UserId) -> BastionResult<Option<User>> {
        find_user(self.conn, id).await
    }

    pub async fn find_id_by_username(&mut self, username: &str) -> BastionResult<Option<UserId>> {
        resolve_id(self.conn, SELECT_ID_BY_USERNAME, username).await
    }

    pub async fn find_id_by_email(&mut self, email: &str) -> BastionResult<Option<UserId>> {
        resolve_id(self.conn, SELECT_ID_BY_EMAIL, email).await
    }

    pub async fn count(&mut self) -> BastionResult<u64> {
        count_users(self.conn).await
    }

    pub async fn insert(&mut self, new_user: &NewUser) -> BastionResult<User> {
        debug!("Inserting user in transaction: {}", new_user.username);
        insert_user(self.conn, new_user).await
    }

    pub async fn update(&mut self, user: &User) -> BastionResult<User> {
        debug!("Updating user in transaction: {}", user.id);
        update_user(self.conn, user).await
    }

    pub async fn update_password(&mut self, id: UserId, password_hash: &str) -> BastionResult<()> {
        set_password(self.conn, id, password_hash).await
    }

    pub async fn soft_delete(&mut self, id: UserId) -> BastionResult<bool> {
        debug!("Soft-deleting user in transaction: {}", id);
        mark_deleted(self.conn, id).await
    }
}
