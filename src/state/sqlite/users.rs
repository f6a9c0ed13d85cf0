use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::SqliteStateStore;
use crate::traits::UserStore;
use crate::types::{ProfilePatch, User};

const UPSERT_USER_SQL: &str = "INSERT INTO users (
        user_id, total_xp, level, current_streak, longest_streak,
        last_active_date, avatar_tier, timezone, display_name,
        created_at, updated_at
     )
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(user_id) DO UPDATE SET
        total_xp = excluded.total_xp,
        level = excluded.level,
        current_streak = excluded.current_streak,
        longest_streak = excluded.longest_streak,
        last_active_date = excluded.last_active_date,
        avatar_tier = excluded.avatar_tier,
        timezone = excluded.timezone,
        display_name = excluded.display_name,
        updated_at = excluded.updated_at";

const ENSURE_USER_SQL: &str = "INSERT OR IGNORE INTO users (
        user_id, total_xp, level, current_streak, longest_streak,
        last_active_date, avatar_tier, timezone, display_name,
        created_at, updated_at
     )
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

// Progression columns are deliberately absent: a profile write must never
// carry back a stale total_xp or streak read moments earlier.
const UPDATE_PROFILE_SQL: &str = "UPDATE users SET
        display_name = CASE WHEN ? THEN ? ELSE display_name END,
        timezone = CASE WHEN ? THEN ? ELSE timezone END,
        updated_at = ?
     WHERE user_id = ?";

pub(super) fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        user_id: row.try_get("user_id")?,
        total_xp: row.try_get("total_xp")?,
        level: row.try_get("level")?,
        current_streak: row.try_get("current_streak")?,
        longest_streak: row.try_get("longest_streak")?,
        last_active_date: row.try_get("last_active_date")?,
        avatar_tier: row.try_get("avatar_tier")?,
        timezone: row.try_get("timezone")?,
        display_name: row.try_get("display_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Upsert query shared by [`UserStore::upsert_user`] and the transactional
/// completion persists in `history`.
pub(super) fn upsert_user_query(
    user: &User,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(UPSERT_USER_SQL)
        .bind(&user.user_id)
        .bind(user.total_xp)
        .bind(user.level)
        .bind(user.current_streak)
        .bind(user.longest_streak)
        .bind(user.last_active_date)
        .bind(user.avatar_tier)
        .bind(&user.timezone)
        .bind(&user.display_name)
        .bind(user.created_at)
        .bind(user.updated_at)
}

#[async_trait]
impl UserStore for SqliteStateStore {
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn upsert_user(&self, user: &User) -> anyhow::Result<()> {
        upsert_user_query(user).execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(ENSURE_USER_SQL)
            .bind(&user.user_id)
            .bind(user.total_xp)
            .bind(user.level)
            .bind(user.current_streak)
            .bind(user.longest_streak)
            .bind(user.last_active_date)
            .bind(user.avatar_tier)
            .bind(&user.timezone)
            .bind(&user.display_name)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_profile_fields(
        &self,
        user_id: &str,
        patch: &ProfilePatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(UPDATE_PROFILE_SQL)
            .bind(patch.display_name.is_some())
            .bind(&patch.display_name)
            .bind(patch.timezone.is_some())
            .bind(&patch.timezone)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
