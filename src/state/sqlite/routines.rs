use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::SqliteStateStore;
use crate::traits::RoutineStore;
use crate::types::{Routine, RoutineWithToday};

/// List query shared by [`RoutineStore::list_routines`] and the weekly
/// snapshot transaction in `history`.
pub(super) fn routines_with_today_query(
    owner_id: &str,
    today: NaiveDate,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        "SELECT r.id, r.owner_id, r.title, r.base_points, r.daily_target, r.active,
                r.created_at, COALESCE(l.cnt, 0) AS completed_today
         FROM routines r
         LEFT JOIN (
            SELECT routine_id, COUNT(*) AS cnt
            FROM routine_logs
            WHERE user_id = ? AND local_date = ?
            GROUP BY routine_id
         ) l ON l.routine_id = r.id
         WHERE r.owner_id = ? AND r.active = 1
         ORDER BY r.created_at, r.id",
    )
    .bind(owner_id)
    .bind(today)
    .bind(owner_id)
}

pub(super) fn routine_with_today_from_row(row: &SqliteRow) -> anyhow::Result<RoutineWithToday> {
    Ok(RoutineWithToday {
        routine: routine_from_row(row)?,
        completed_today: row.try_get("completed_today")?,
    })
}

pub(super) fn routine_from_row(row: &SqliteRow) -> anyhow::Result<Routine> {
    Ok(Routine {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        base_points: row.try_get("base_points")?,
        daily_target: row.try_get("daily_target")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RoutineStore for SqliteStateStore {
    async fn insert_routine(&self, routine: &Routine) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO routines (id, owner_id, title, base_points, daily_target, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&routine.id)
        .bind(&routine.owner_id)
        .bind(&routine.title)
        .bind(routine.base_points)
        .bind(routine.daily_target)
        .bind(routine.active)
        .bind(routine.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_active_routine(
        &self,
        routine_id: &str,
        owner_id: &str,
    ) -> anyhow::Result<Option<Routine>> {
        let row = sqlx::query(
            "SELECT * FROM routines WHERE id = ? AND owner_id = ? AND active = 1",
        )
        .bind(routine_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(routine_from_row).transpose()
    }

    async fn find_active_routine_by_title(
        &self,
        owner_id: &str,
        title: &str,
    ) -> anyhow::Result<Option<Routine>> {
        let row = sqlx::query(
            "SELECT * FROM routines WHERE owner_id = ? AND title = ? AND active = 1 LIMIT 1",
        )
        .bind(owner_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(routine_from_row).transpose()
    }

    async fn list_routines(
        &self,
        owner_id: &str,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<RoutineWithToday>> {
        let rows = routines_with_today_query(owner_id, today)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(routine_with_today_from_row).collect()
    }

    async fn deactivate_routine(&self, routine_id: &str, owner_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE routines SET active = 0 WHERE id = ? AND owner_id = ? AND active = 1",
        )
        .bind(routine_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
