//! Data Access Layer
//!
//! This module contains all the functions for interacting with the PostgreSQL database.
//! It uses `sqlx` for connection pooling; `Db` is also the `CallStore` the media
//! bridge hands finished conversations to.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sqlx::{PgPool, types::Json};
use std::time::Duration;
use voxbridge_core::{CallStore, ConversationTurn};

use crate::models::{Call, CallStatus, CallUpdate, InteractionLog};

const CALL_COLUMNS: &str =
    "id, call_sid, user_phone, start_time, interaction_log, status, duration, user_intent";

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Creates the call record, or refreshes the caller if the call already exists.
    pub async fn create_call(&self, call_sid: &str, user_phone: &str) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO calls (call_sid, user_phone)
            VALUES ($1, $2)
            ON CONFLICT (call_sid) DO UPDATE SET user_phone = EXCLUDED.user_phone
            RETURNING id
            "#,
        )
        .bind(call_sid)
        .bind(user_phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Lists calls, most recent first.
    pub async fn list_calls(&self, skip: i64, limit: i64) -> Result<Vec<Call>> {
        let calls = sqlx::query_as::<_, Call>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls ORDER BY start_time DESC OFFSET $1 LIMIT $2"
        ))
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(calls)
    }

    pub async fn count_calls(&self) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM calls")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn get_call(&self, id: i64) -> Result<Option<Call>> {
        let call = sqlx::query_as::<_, Call>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(call)
    }

    pub async fn get_call_by_sid(&self, call_sid: &str) -> Result<Option<Call>> {
        let call = sqlx::query_as::<_, Call>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE call_sid = $1"
        ))
        .bind(call_sid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(call)
    }

    /// Finds calls whose phone number contains `phone`, most recent first.
    pub async fn search_calls(&self, phone: &str) -> Result<Vec<Call>> {
        let calls = sqlx::query_as::<_, Call>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls \
             WHERE strpos(user_phone, $1) > 0 ORDER BY start_time DESC"
        ))
        .bind(phone)
        .fetch_all(&self.pool)
        .await?;
        Ok(calls)
    }

    /// Applies a partial update, returning the updated call if it exists.
    pub async fn update_call(&self, id: i64, update: CallUpdate) -> Result<Option<Call>> {
        let call = sqlx::query_as::<_, Call>(&format!(
            r#"
            UPDATE calls
            SET interaction_log = COALESCE($1, interaction_log),
                status = COALESCE($2, status),
                duration = COALESCE($3, duration),
                user_intent = COALESCE($4, user_intent)
            WHERE id = $5
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(update.interaction_log.map(Json))
        .bind(update.status)
        .bind(update.duration)
        .bind(update.user_intent)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(call)
    }

    /// Deletes a call. Returns `false` if it did not exist.
    pub async fn delete_call(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM calls WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CallStore for Db {
    async fn create_session(&self, call_sid: &str, caller: &str) -> Result<i64> {
        self.create_call(call_sid, caller).await
    }

    async fn append_turns(&self, call_sid: &str, turns: &[ConversationTurn]) -> Result<()> {
        let entries: Vec<InteractionLog> = turns.iter().map(InteractionLog::from).collect();
        let result = sqlx::query(
            "UPDATE calls SET interaction_log = interaction_log || $1 WHERE call_sid = $2",
        )
        .bind(Json(entries))
        .bind(call_sid)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("Call '{}' not found", call_sid));
        }
        Ok(())
    }

    async fn finalize(
        &self,
        call_sid: &str,
        duration: Duration,
        detected_intent: Option<String>,
    ) -> Result<()> {
        let seconds = i32::try_from(duration.as_secs()).unwrap_or(i32::MAX);
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET status = $1, duration = $2, user_intent = COALESCE($3, user_intent)
            WHERE call_sid = $4
            "#,
        )
        .bind(CallStatus::Completed)
        .bind(seconds)
        .bind(detected_intent)
        .bind(call_sid)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("Call '{}' not found", call_sid));
        }
        Ok(())
    }
}
