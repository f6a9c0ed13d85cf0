use sqlx::SqlitePool;
use tracing::info;

/// Centralized schema setup for the SQLite store.
///
/// Every statement is safe to run repeatedly (`IF NOT EXISTS`), so startup
/// just calls this unconditionally.
pub(crate) async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            total_xp INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 1,
            current_streak INTEGER NOT NULL DEFAULT 0,
            longest_streak INTEGER NOT NULL DEFAULT 0,
            last_active_date TEXT,
            avatar_tier INTEGER NOT NULL DEFAULT 0,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            display_name TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quests (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            base_points INTEGER NOT NULL,
            cooldown_seconds INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS routines (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            base_points INTEGER NOT NULL,
            daily_target INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_routines_owner ON routines(owner_id, active)")
        .execute(pool)
        .await?;

    // Append-only completion history. runs carries a streak snapshot,
    // routine_logs deliberately does not (daily-target gating needs no
    // per-log streak and the source schema never had one).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            quest_id TEXT NOT NULL,
            gained_xp INTEGER NOT NULL,
            streak_applied INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            local_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runs_user_quest_time
         ON runs(user_id, quest_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runs_user_date ON runs(user_id, local_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS routine_logs (
            id TEXT PRIMARY KEY,
            routine_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            gained_xp INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            local_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_routine_logs_routine_user_date
         ON routine_logs(routine_id, user_id, local_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_routine_logs_user_date
         ON routine_logs(user_id, local_date)",
    )
    .execute(pool)
    .await?;

    info!("Schema migration complete");
    Ok(())
}
