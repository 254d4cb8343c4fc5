//! SQLite storage for users, configured endpoints, and sessions.
//!
//! The handle is constructed explicitly with `Db::open` and migrated once at
//! process start with `Db::migrate`; nothing happens as an import-time side
//! effect.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;

use crate::conn::Endpoint;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("username already taken")]
    UsernameTaken,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EndpointRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub address: String,
    pub created_at: String,
    pub updated_at: String,
}

impl EndpointRow {
    pub fn as_endpoint(&self) -> Endpoint {
        Endpoint {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn open(path: &str) -> Result<Self, DbError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Create tables if they don't exist. Run once at startup.
    pub async fn migrate(&self) -> Result<(), DbError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS endpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                address TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---------- users ----------

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<i64, DbError> {
        let res = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?1, ?2)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await;
        match res {
            Ok(r) => Ok(r.last_insert_rowid()),
            Err(sqlx::Error::Database(e))
                if matches!(e.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                Err(DbError::UsernameTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn user_by_name(&self, username: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query("SELECT id, username, password_hash FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| User {
            id: r.get("id"),
            username: r.get("username"),
            password_hash: r.get("password_hash"),
        }))
    }

    // ---------- endpoints ----------

    pub async fn insert_endpoint(
        &self,
        user_id: i64,
        name: &str,
        address: &str,
    ) -> Result<EndpointRow, DbError> {
        let res = sqlx::query("INSERT INTO endpoints (user_id, name, address) VALUES (?1, ?2, ?3)")
            .bind(user_id)
            .bind(name)
            .bind(address)
            .execute(&self.pool)
            .await?;
        let id = res.last_insert_rowid();
        let row = sqlx::query(
            "SELECT id, user_id, name, address, created_at, updated_at
             FROM endpoints WHERE id = ?1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(endpoint_row(&row))
    }

    /// Delete one of the caller's endpoints. Returns false when the row does
    /// not exist or belongs to someone else.
    pub async fn delete_endpoint(&self, user_id: i64, id: i64) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM endpoints WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// The caller's endpoints, newest first.
    pub async fn endpoints_for_user(&self, user_id: i64) -> Result<Vec<EndpointRow>, DbError> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, address, created_at, updated_at
             FROM endpoints WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(endpoint_row).collect())
    }

    /// Every configured endpoint across all users; this is what the
    /// connection manager reconciles against.
    pub async fn all_endpoints(&self) -> Result<Vec<Endpoint>, DbError> {
        let rows = sqlx::query("SELECT id, name, address FROM endpoints ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Endpoint {
                id: r.get("id"),
                name: r.get("name"),
                address: r.get("address"),
            })
            .collect())
    }

    // ---------- sessions ----------

    pub async fn create_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: i64,
    ) -> Result<(), DbError> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolve a bearer token to a user id, ignoring expired sessions.
    pub async fn session_user(&self, token: &str, now: i64) -> Result<Option<i64>, DbError> {
        let row = sqlx::query("SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2")
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("user_id")))
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn endpoint_row(r: &sqlx::sqlite::SqliteRow) -> EndpointRow {
    EndpointRow {
        id: r.get("id"),
        user_id: r.get("user_id"),
        name: r.get("name"),
        address: r.get("address"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}
