//! Completion engine: the single writer of user progression state.
//!
//! Each completion request walks VALIDATED -> GATED -> APPLIED -> PERSISTED
//! and either returns the fresh state or rejects early with a typed
//! [`Rejection`]. The read-modify-write of user state plus the history insert
//! is serialized per user identity; different users proceed in parallel.

pub mod insights;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineResult, Rejection};
use crate::leveling::{compute_level, promotes_avatar};
use crate::streak::{apply_streak_progress, streak_multiplier};
use crate::traits::{CatalogStore, HistoryStore, RoutineStore, StateStore, UserStore};
use crate::types::{
    CompletionMeta, QuestCompletion, Routine, RoutineCompletion, RoutineLog, Run, User,
};
use crate::utils::{local_date_in, round_half_up};

/// Registry size at which idle per-user lock entries are swept.
const USER_LOCK_SWEEP_THRESHOLD: usize = 1024;

pub struct CompletionEngine {
    store: Arc<dyn StateStore>,
    /// Per-user exclusion scope. Entries are created on first contact and
    /// swept once the registry crosses [`USER_LOCK_SWEEP_THRESHOLD`]; an
    /// entry is only evicted while nobody holds its `Arc`.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CompletionEngine {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        if locks.len() >= USER_LOCK_SWEEP_THRESHOLD && !locks.contains_key(user_id) {
            // strong_count == 1 means only the map holds the entry: no task
            // is holding or awaiting that user's lock, so dropping it is
            // safe and a later request simply recreates it.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lazy user creation on first contact with an identity.
    async fn load_or_create_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<User> {
        match self.store.get_user(user_id).await? {
            Some(user) => Ok(user),
            None => Ok(User::new(user_id, now)),
        }
    }

    // -----------------------------------------------------------------------
    // Quest path
    // -----------------------------------------------------------------------

    pub async fn complete_quest(
        &self,
        user_id: &str,
        quest_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<QuestCompletion> {
        // VALIDATED: must reference an active catalog entry.
        if quest_id.trim().is_empty() {
            return Err(Rejection::InvalidInput("quest id is required".to_string()).into());
        }
        let quest = self
            .store
            .get_active_quest(quest_id)
            .await?
            .ok_or_else(|| {
                Rejection::InvalidInput(format!("unknown or inactive quest: {quest_id}"))
            })?;

        // Serialize gate + apply + persist for this user.
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        // GATED: cooldown against the most recent run for (user, quest).
        if quest.cooldown_seconds > 0 {
            if let Some(last) = self.store.most_recent_run(user_id, quest_id).await? {
                let elapsed_ms = (now - last.created_at).num_milliseconds();
                let cooldown_ms = quest.cooldown_seconds * 1000;
                if elapsed_ms < cooldown_ms {
                    // Remaining wait, ceiling-rounded to whole seconds.
                    let retry_after_seconds = (cooldown_ms - elapsed_ms + 999) / 1000;
                    debug!(user_id, quest_id, retry_after_seconds, "Cooldown active");
                    return Err(Rejection::RateLimited { retry_after_seconds }.into());
                }
            }
        }

        // APPLIED: streak, multiplier, XP, level, avatar tier on a working copy.
        let user = self.load_or_create_user(user_id, now).await?;
        let previous_level = user.level;
        let today = local_date_in(&user.timezone, now);

        let mut updated = apply_streak_progress(user, today);
        let multiplier = streak_multiplier(updated.current_streak);
        let gained_xp = round_half_up(quest.base_points as f64 * multiplier);
        updated.total_xp += gained_xp;
        updated.level = compute_level(updated.total_xp);
        if promotes_avatar(previous_level, updated.level) {
            updated.avatar_tier += 1;
        }
        updated.updated_at = now;

        let run = Run {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            quest_id: quest.id.clone(),
            gained_xp,
            streak_applied: updated.current_streak,
            created_at: now,
            local_date: today,
        };

        // PERSISTED: one transaction, both rows or neither.
        self.store.persist_quest_completion(&updated, &run).await?;

        let leveled_up = updated.level > previous_level;
        if leveled_up {
            info!(user_id, level = updated.level, "Level up");
        }

        Ok(QuestCompletion {
            completion: run,
            progress: (&updated).into(),
            meta: CompletionMeta {
                base_points: quest.base_points,
                multiplier,
                leveled_up,
            },
        })
    }

    // -----------------------------------------------------------------------
    // Routine path
    // -----------------------------------------------------------------------

    pub async fn log_routine(
        &self,
        user_id: &str,
        routine_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<RoutineCompletion> {
        // VALIDATED: routine must exist, be active, and belong to the caller.
        if routine_id.trim().is_empty() {
            return Err(Rejection::InvalidInput("routine id is required".to_string()).into());
        }
        let routine = self
            .store
            .get_active_routine(routine_id, user_id)
            .await?
            .ok_or_else(|| Rejection::NotFound(format!("no such routine: {routine_id}")))?;

        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let user = self.load_or_create_user(user_id, now).await?;
        let previous_level = user.level;
        let today = local_date_in(&user.timezone, now);

        // GATED: per-local-date count cap, no time-based component.
        let logged_today = self
            .store
            .count_routine_logs_today(routine_id, user_id, today)
            .await?;
        if logged_today >= routine.daily_target {
            debug!(user_id, routine_id, logged_today, "Daily target reached");
            return Err(Rejection::LimitReached(format!(
                "daily target of {} already met for '{}'",
                routine.daily_target, routine.title
            ))
            .into());
        }

        // APPLIED: identical structure to the quest path.
        let mut updated = apply_streak_progress(user, today);
        let multiplier = streak_multiplier(updated.current_streak);
        let gained_xp = round_half_up(routine.base_points as f64 * multiplier);
        updated.total_xp += gained_xp;
        updated.level = compute_level(updated.total_xp);
        if promotes_avatar(previous_level, updated.level) {
            updated.avatar_tier += 1;
        }
        updated.updated_at = now;

        // No streak snapshot on routine logs; runs are the only history rows
        // that carry one.
        let log = RoutineLog {
            id: Uuid::new_v4().to_string(),
            routine_id: routine.id.clone(),
            user_id: user_id.to_string(),
            gained_xp,
            created_at: now,
            local_date: today,
        };

        self.store.persist_routine_completion(&updated, &log).await?;

        let leveled_up = updated.level > previous_level;
        if leveled_up {
            info!(user_id, level = updated.level, "Level up");
        }

        Ok(RoutineCompletion {
            completion: log,
            progress: (&updated).into(),
            meta: CompletionMeta {
                base_points: routine.base_points,
                multiplier,
                leveled_up,
            },
        })
    }

    // -----------------------------------------------------------------------
    // Routine management
    // -----------------------------------------------------------------------

    pub async fn create_routine(
        &self,
        user_id: &str,
        title: Option<&str>,
        base_points: Option<i64>,
        daily_target: Option<i64>,
        now: DateTime<Utc>,
    ) -> EngineResult<Routine> {
        // Presence is explicit: an absent field and a zero are different
        // mistakes and get different messages.
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Rejection::InvalidInput("title is required".to_string()))?;
        let base_points = base_points
            .ok_or_else(|| Rejection::InvalidInput("basePoints is required".to_string()))?;
        if base_points <= 0 {
            return Err(Rejection::InvalidInput("basePoints must be positive".to_string()).into());
        }
        let daily_target = daily_target
            .ok_or_else(|| Rejection::InvalidInput("dailyTarget is required".to_string()))?;
        if daily_target <= 0 {
            return Err(
                Rejection::InvalidInput("dailyTarget must be positive".to_string()).into(),
            );
        }

        if let Some(existing) = self
            .store
            .find_active_routine_by_title(user_id, title)
            .await?
        {
            return Err(Rejection::Conflict(format!(
                "an active routine titled '{}' already exists",
                existing.title
            ))
            .into());
        }

        // Make sure the owner record exists so the routine never dangles.
        // Insert-if-absent: an existing row keeps its progression even if a
        // completion commits while this request is in flight.
        self.store.ensure_user(&User::new(user_id, now)).await?;

        let routine = Routine {
            id: Uuid::new_v4().to_string(),
            owner_id: user_id.to_string(),
            title: title.to_string(),
            base_points,
            daily_target,
            active: true,
            created_at: now,
        };
        self.store.insert_routine(&routine).await?;
        info!(user_id, routine_id = %routine.id, "Routine created");
        Ok(routine)
    }

    pub async fn deactivate_routine(
        &self,
        user_id: &str,
        routine_id: &str,
    ) -> EngineResult<()> {
        let deactivated = self.store.deactivate_routine(routine_id, user_id).await?;
        if !deactivated {
            return Err(Rejection::NotFound(format!("no such routine: {routine_id}")).into());
        }
        Ok(())
    }
}
