//! Per-chat settings access
//!
//! Read/write settings from the chat_settings table (key-value per chat).

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use vcmp_common::ChatId;

pub const LOOP_MODE_KEY: &str = "loop_mode";
pub const ADMIN_ONLY_KEY: &str = "admin_only";
pub const VIDEO_MODE_KEY: &str = "video_mode";

/// Generic per-chat setting getter
///
/// Returns None if the chat never stored the key.
pub async fn get_setting<T: FromStr>(
    db: &Pool<Sqlite>,
    chat_id: ChatId,
    key: &str,
) -> Result<Option<T>> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM chat_settings WHERE chat_id = ? AND key = ?")
            .bind(chat_id)
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' for chat {}: {}",
                key, chat_id, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic per-chat setting setter
///
/// Inserts or updates the setting.
pub async fn set_setting<T: ToString>(
    db: &Pool<Sqlite>,
    chat_id: ChatId,
    key: &str,
    value: T,
) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO chat_settings (chat_id, key, value)
        VALUES (?, ?, ?)
        ON CONFLICT(chat_id, key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(chat_id)
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
