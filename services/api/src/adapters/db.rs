//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `SessionStore` and `ChatHistoryService` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tutor_core::domain::{Role, SessionSummary, StoredMessage};
use tutor_core::ports::{ChatHistoryService, PortError, PortResult, SessionStore};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter backed by a Postgres connection pool.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Returns a `SessionStore` that creates sessions on behalf of `user_id`.
    pub fn session_store(&self, user_id: Uuid) -> UserSessionStore {
        UserSessionStore {
            pool: self.pool.clone(),
            user_id,
        }
    }
}

/// A `SessionStore` bound to a single user.
#[derive(Clone)]
pub struct UserSessionStore {
    pool: PgPool,
    user_id: Uuid,
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    title: String,
    language: String,
    created_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            title: self.title,
            language: self.language,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    session_id: Uuid,
    role: String,
    content: String,
    audio_url: Option<String>,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<StoredMessage> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown role '{}' on message {}", self.role, self.id))
        })?;
        Ok(StoredMessage {
            id: self.id,
            session_id: self.session_id,
            role,
            content: self.content,
            audio_ref: self.audio_url,
            created_at: self.created_at,
        })
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for UserSessionStore {
    async fn ensure_session(&self, title: &str, language: &str) -> PortResult<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO chat_sessions (user_id, title, language) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(self.user_id)
        .bind(title)
        .bind(language)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(id)
    }

    async fn append_message(&self, session_id: Uuid, role: Role, content: &str) -> PortResult<()> {
        // The ownership check and the insert are one statement.
        let inserted = sqlx::query(
            "INSERT INTO chat_messages (session_id, role, content) \
             SELECT $1, $2, $3 \
             WHERE EXISTS (SELECT 1 FROM chat_sessions WHERE id = $1 AND user_id = $4)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(self.user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if inserted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }

        sqlx::query("UPDATE chat_sessions SET updated_at = now() WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `ChatHistoryService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatHistoryService for DbAdapter {
    async fn list_sessions(&self, owner: Uuid) -> PortResult<Vec<SessionSummary>> {
        let records = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, title, language, created_at FROM chat_sessions WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn owns_session(&self, owner: Uuid, session_id: Uuid) -> PortResult<bool> {
        let owned: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM chat_sessions WHERE id = $1 AND user_id = $2")
                .bind(session_id)
                .bind(owner)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(owned.is_some())
    }

    async fn list_messages(&self, owner: Uuid, session_id: Uuid) -> PortResult<Vec<StoredMessage>> {
        if !self.owns_session(owner, session_id).await? {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }

        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, session_id, role, content, audio_url, created_at FROM chat_messages WHERE session_id = $1 ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}
