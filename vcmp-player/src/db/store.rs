//! Durable mirror of session state
//!
//! The in-process session is the source of truth; this store only keeps
//! what must survive a restart (active flags, per-chat settings, the chat
//! to assistant assignment) plus the append-only play statistics.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;
use vcmp_common::events::LoopMode;
use vcmp_common::ChatId;

use super::settings::{get_setting, set_setting, ADMIN_ONLY_KEY, LOOP_MODE_KEY, VIDEO_MODE_KEY};
use crate::error::Result;

/// One new play, appended to the statistics table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRecord {
    pub track_id: String,
    pub chat_id: ChatId,
    pub user_id: i64,
    pub title: String,
    pub duration_seconds: u64,
}

/// Aggregated play count for one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopTrack {
    pub track_id: String,
    pub title: String,
    pub plays: i64,
}

/// Persistence used by the orchestrator and the HTTP surface
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_active_flag(&self, chat_id: ChatId) -> Result<bool>;

    /// Mark the chat's call active (playing) or remove it
    async fn set_active_flag(&self, chat_id: ChatId, active: bool) -> Result<()>;

    /// Record pause state for an active call; no-op for inactive chats
    async fn set_paused_flag(&self, chat_id: ChatId, paused: bool) -> Result<()>;

    /// Chats whose active flag is set
    async fn active_chats(&self) -> Result<Vec<ChatId>>;

    async fn get_loop_mode(&self, chat_id: ChatId) -> Result<LoopMode>;

    async fn set_loop_mode(&self, chat_id: ChatId, mode: LoopMode) -> Result<()>;

    async fn get_admin_only(&self, chat_id: ChatId) -> Result<bool>;

    async fn set_admin_only(&self, chat_id: ChatId, enabled: bool) -> Result<()>;

    async fn get_video_mode(&self, chat_id: ChatId) -> Result<bool>;

    async fn set_video_mode(&self, chat_id: ChatId, enabled: bool) -> Result<()>;

    /// 1-based assistant number pinned to the chat
    async fn get_assistant(&self, chat_id: ChatId) -> Result<Option<usize>>;

    async fn set_assistant(&self, chat_id: ChatId, num: usize) -> Result<()>;

    async fn record_play(&self, record: PlayRecord) -> Result<()>;

    /// Most played tracks, optionally restricted to one chat
    async fn top_tracks(&self, chat_id: Option<ChatId>, limit: u32) -> Result<Vec<TopTrack>>;
}

/// SQLite implementation of [`SessionStore`]
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_active_flag(&self, chat_id: ChatId) -> Result<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM active_calls WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn set_active_flag(&self, chat_id: ChatId, active: bool) -> Result<()> {
        if active {
            sqlx::query(
                r#"
                INSERT INTO active_calls (chat_id, playing, updated_at)
                VALUES (?, 1, CURRENT_TIMESTAMP)
                ON CONFLICT(chat_id) DO UPDATE SET playing = 1, updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(chat_id)
            .execute(&self.db)
            .await?;
        } else {
            sqlx::query("DELETE FROM active_calls WHERE chat_id = ?")
                .bind(chat_id)
                .execute(&self.db)
                .await?;
        }
        debug!("Chat {} active flag = {}", chat_id, active);
        Ok(())
    }

    async fn set_paused_flag(&self, chat_id: ChatId, paused: bool) -> Result<()> {
        sqlx::query(
            "UPDATE active_calls SET playing = ?, updated_at = CURRENT_TIMESTAMP WHERE chat_id = ?",
        )
        .bind(if paused { 0i64 } else { 1i64 })
        .bind(chat_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn active_chats(&self) -> Result<Vec<ChatId>> {
        let chats: Vec<ChatId> =
            sqlx::query_scalar("SELECT chat_id FROM active_calls ORDER BY chat_id")
                .fetch_all(&self.db)
                .await?;
        Ok(chats)
    }

    async fn get_loop_mode(&self, chat_id: ChatId) -> Result<LoopMode> {
        Ok(get_setting(&self.db, chat_id, LOOP_MODE_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn set_loop_mode(&self, chat_id: ChatId, mode: LoopMode) -> Result<()> {
        set_setting(&self.db, chat_id, LOOP_MODE_KEY, mode).await
    }

    async fn get_admin_only(&self, chat_id: ChatId) -> Result<bool> {
        Ok(get_setting(&self.db, chat_id, ADMIN_ONLY_KEY)
            .await?
            .unwrap_or(false))
    }

    async fn set_admin_only(&self, chat_id: ChatId, enabled: bool) -> Result<()> {
        set_setting(&self.db, chat_id, ADMIN_ONLY_KEY, enabled).await
    }

    async fn get_video_mode(&self, chat_id: ChatId) -> Result<bool> {
        Ok(get_setting(&self.db, chat_id, VIDEO_MODE_KEY)
            .await?
            .unwrap_or(false))
    }

    async fn set_video_mode(&self, chat_id: ChatId, enabled: bool) -> Result<()> {
        set_setting(&self.db, chat_id, VIDEO_MODE_KEY, enabled).await
    }

    async fn get_assistant(&self, chat_id: ChatId) -> Result<Option<usize>> {
        let num: Option<i64> = sqlx::query_scalar("SELECT num FROM assistants WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(num.and_then(|n| usize::try_from(n).ok()))
    }

    async fn set_assistant(&self, chat_id: ChatId, num: usize) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO assistants (chat_id, num) VALUES (?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET num = excluded.num
            "#,
        )
        .bind(chat_id)
        .bind(num as i64)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_play(&self, record: PlayRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO play_stats (track_id, chat_id, user_id, title, duration_seconds)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.track_id)
        .bind(record.chat_id)
        .bind(record.user_id)
        .bind(&record.title)
        .bind(i64::try_from(record.duration_seconds).unwrap_or(i64::MAX))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn top_tracks(&self, chat_id: Option<ChatId>, limit: u32) -> Result<Vec<TopTrack>> {
        let rows = sqlx::query(
            r#"
            SELECT track_id, MAX(title) AS title, COUNT(*) AS plays
            FROM play_stats
            WHERE (?1 IS NULL OR chat_id = ?1)
            GROUP BY track_id
            ORDER BY plays DESC, track_id ASC
            LIMIT ?2
            "#,
        )
        .bind(chat_id)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| -> Result<TopTrack> {
                Ok(TopTrack {
                    track_id: row.try_get("track_id")?,
                    title: row.try_get("title")?,
                    plays: row.try_get("plays")?,
                })
            })
            .collect()
    }
}
