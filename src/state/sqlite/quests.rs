use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::SqliteStateStore;
use crate::config::QuestSeed;
use crate::traits::CatalogStore;
use crate::types::Quest;

fn quest_from_row(row: &SqliteRow) -> anyhow::Result<Quest> {
    Ok(Quest {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        base_points: row.try_get("base_points")?,
        cooldown_seconds: row.try_get("cooldown_seconds")?,
        active: row.try_get("active")?,
    })
}

#[async_trait]
impl CatalogStore for SqliteStateStore {
    async fn get_active_quest(&self, quest_id: &str) -> anyhow::Result<Option<Quest>> {
        let row = sqlx::query("SELECT * FROM quests WHERE id = ? AND active = 1")
            .bind(quest_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(quest_from_row).transpose()
    }

    async fn list_quests(&self) -> anyhow::Result<Vec<Quest>> {
        let rows = sqlx::query("SELECT * FROM quests WHERE active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(quest_from_row).collect()
    }

    async fn seed_quests(&self, seeds: &[QuestSeed]) -> anyhow::Result<usize> {
        // Catalog rows are immutable reference data: first write wins, reseeds
        // never overwrite.
        let mut inserted = 0usize;
        for seed in seeds {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO quests (id, title, base_points, cooldown_seconds, active)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&seed.id)
            .bind(&seed.title)
            .bind(seed.base_points)
            .bind(seed.cooldown_seconds)
            .bind(seed.active)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }
}
