//! Store boundary traits.
//!
//! One trait per concern, implemented together by the SQLite store. The
//! engine and HTTP layer hold an `Arc<dyn StateStore>` built once per process
//! and injected explicitly; there is no ambient global store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::config::QuestSeed;
use crate::types::{
    ProfilePatch, Quest, Routine, RoutineLog, RoutineWithToday, Run, User, WeeklySnapshot,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>>;

    /// Full-state write. Only safe inside the engine's per-user scope; request
    /// paths outside that scope use [`ensure_user`](Self::ensure_user) and
    /// [`update_profile_fields`](Self::update_profile_fields), which never
    /// rewrite progression columns from a stale read.
    async fn upsert_user(&self, user: &User) -> anyhow::Result<()>;

    /// Insert-if-absent. An existing row is left untouched, progression
    /// included.
    async fn ensure_user(&self, user: &User) -> anyhow::Result<()>;

    /// Column-scoped profile write: only `display_name`, `timezone` and
    /// `updated_at` are touched, and only for fields present in the patch.
    /// Returns false when no row matched.
    async fn update_profile_fields(
        &self,
        user_id: &str,
        patch: &ProfilePatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Active quests only; inactive ids resolve to `None`.
    async fn get_active_quest(&self, quest_id: &str) -> anyhow::Result<Option<Quest>>;

    async fn list_quests(&self) -> anyhow::Result<Vec<Quest>>;

    /// Idempotent seed: existing rows win, returns the number inserted.
    async fn seed_quests(&self, seeds: &[QuestSeed]) -> anyhow::Result<usize>;
}

#[async_trait]
pub trait RoutineStore: Send + Sync {
    async fn insert_routine(&self, routine: &Routine) -> anyhow::Result<()>;

    /// Active and owned by `owner_id`, else `None`.
    async fn get_active_routine(
        &self,
        routine_id: &str,
        owner_id: &str,
    ) -> anyhow::Result<Option<Routine>>;

    async fn find_active_routine_by_title(
        &self,
        owner_id: &str,
        title: &str,
    ) -> anyhow::Result<Option<Routine>>;

    /// Active routines with the completion count for `today` joined in.
    async fn list_routines(
        &self,
        owner_id: &str,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<RoutineWithToday>>;

    /// Soft-deactivate. Returns false when nothing matched.
    async fn deactivate_routine(&self, routine_id: &str, owner_id: &str) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn most_recent_run(&self, user_id: &str, quest_id: &str)
        -> anyhow::Result<Option<Run>>;

    async fn list_runs(&self, user_id: &str, limit: i64) -> anyhow::Result<Vec<Run>>;

    async fn count_routine_logs_today(
        &self,
        routine_id: &str,
        user_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<i64>;

    /// Writes the updated user state and the run row in one transaction.
    /// Either both are visible to subsequent reads or neither is.
    async fn persist_quest_completion(&self, user: &User, run: &Run) -> anyhow::Result<()>;

    /// Transactional counterpart for the routine path.
    async fn persist_routine_completion(
        &self,
        user: &User,
        log: &RoutineLog,
    ) -> anyhow::Result<()>;

    /// One-transaction read of everything the weekly aggregator needs: user
    /// row, run/log day buckets over the trailing 7 local days, and the
    /// active routines with today's counts. Days with no activity are absent
    /// from the buckets; the aggregator densifies.
    async fn weekly_snapshot(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<WeeklySnapshot>;
}

/// The full store surface the engine is wired with.
pub trait StateStore: UserStore + CatalogStore + RoutineStore + HistoryStore {}

impl<T: UserStore + CatalogStore + RoutineStore + HistoryStore> StateStore for T {}

/// Applies a profile patch through the store, preserving untouched fields.
/// Returns `None` when the user has never been seen.
///
/// The write is column-scoped in the store, so a completion committing
/// between any read and this write keeps its progression intact.
pub async fn update_profile(
    store: &dyn StateStore,
    user_id: &str,
    patch: &ProfilePatch,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<User>> {
    if !store.update_profile_fields(user_id, patch, now).await? {
        return Ok(None);
    }
    store.get_user(user_id).await
}
