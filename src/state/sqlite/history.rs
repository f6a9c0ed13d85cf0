use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::routines::{routine_with_today_from_row, routines_with_today_query};
use super::users::{upsert_user_query, user_from_row};
use super::SqliteStateStore;
use crate::traits::HistoryStore;
use crate::types::{DayAggregate, DayCount, RoutineLog, Run, User, WeeklySnapshot};
use crate::utils::local_date_in;

fn run_from_row(row: &SqliteRow) -> anyhow::Result<Run> {
    Ok(Run {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        quest_id: row.try_get("quest_id")?,
        gained_xp: row.try_get("gained_xp")?,
        streak_applied: row.try_get("streak_applied")?,
        created_at: row.try_get("created_at")?,
        local_date: row.try_get("local_date")?,
    })
}

#[async_trait]
impl HistoryStore for SqliteStateStore {
    async fn most_recent_run(
        &self,
        user_id: &str,
        quest_id: &str,
    ) -> anyhow::Result<Option<Run>> {
        let row = sqlx::query(
            "SELECT * FROM runs WHERE user_id = ? AND quest_id = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(quest_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs(&self, user_id: &str, limit: i64) -> anyhow::Result<Vec<Run>> {
        let rows = sqlx::query(
            "SELECT * FROM runs WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn count_routine_logs_today(
        &self,
        routine_id: &str,
        user_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM routine_logs
             WHERE routine_id = ? AND user_id = ? AND local_date = ?",
        )
        .bind(routine_id)
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("cnt")?)
    }

    async fn persist_quest_completion(&self, user: &User, run: &Run) -> anyhow::Result<()> {
        // User state and history row commit together or not at all; a reader
        // never observes one without the other.
        let mut tx = self.pool.begin().await?;

        upsert_user_query(user).execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO runs (id, user_id, quest_id, gained_xp, streak_applied, created_at, local_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.user_id)
        .bind(&run.quest_id)
        .bind(run.gained_xp)
        .bind(run.streak_applied)
        .bind(run.created_at)
        .bind(run.local_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn persist_routine_completion(
        &self,
        user: &User,
        log: &RoutineLog,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        upsert_user_query(user).execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO routine_logs (id, routine_id, user_id, gained_xp, created_at, local_date)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id)
        .bind(&log.routine_id)
        .bind(&log.user_id)
        .bind(log.gained_xp)
        .bind(log.created_at)
        .bind(log.local_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn weekly_snapshot(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<WeeklySnapshot> {
        // All four reads in one transaction: the report reflects a single
        // instant even while completions commit concurrently.
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let user = user.as_ref().map(user_from_row).transpose()?;

        let timezone = user
            .as_ref()
            .map(|u| u.timezone.as_str())
            .unwrap_or("UTC");
        let today = local_date_in(timezone, now);
        let from = today - Duration::days(6);

        let run_rows = sqlx::query(
            "SELECT local_date, COUNT(*) AS runs, COALESCE(SUM(gained_xp), 0) AS xp
             FROM runs
             WHERE user_id = ? AND local_date BETWEEN ? AND ?
             GROUP BY local_date
             ORDER BY local_date",
        )
        .bind(user_id)
        .bind(from)
        .bind(today)
        .fetch_all(&mut *tx)
        .await?;
        let run_days = run_rows
            .iter()
            .map(|row| {
                Ok(DayAggregate {
                    local_date: row.try_get("local_date")?,
                    runs: row.try_get("runs")?,
                    xp: row.try_get("xp")?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let log_rows = sqlx::query(
            "SELECT local_date, COUNT(*) AS cnt
             FROM routine_logs
             WHERE user_id = ? AND local_date BETWEEN ? AND ?
             GROUP BY local_date
             ORDER BY local_date",
        )
        .bind(user_id)
        .bind(from)
        .bind(today)
        .fetch_all(&mut *tx)
        .await?;
        let log_days = log_rows
            .iter()
            .map(|row| {
                Ok(DayCount {
                    local_date: row.try_get("local_date")?,
                    count: row.try_get("cnt")?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let routine_rows = routines_with_today_query(user_id, today)
            .fetch_all(&mut *tx)
            .await?;
        let routines = routine_rows
            .iter()
            .map(routine_with_today_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;

        tx.commit().await?;

        Ok(WeeklySnapshot {
            user,
            today,
            run_days,
            log_days,
            routines,
        })
    }
}
