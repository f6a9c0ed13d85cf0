//! Core domain types: users, quests, routines, completion history, and the
//! wire-facing response shapes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-user progression record. Created lazily on first contact with an
/// identity; mutated only by the completion engine; never deleted.
///
/// Invariant after every update: `longest_streak >= current_streak` and
/// `total_xp`/`avatar_tier` never decrease.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub total_xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_date: Option<NaiveDate>,
    pub avatar_tier: i64,
    /// Fixed UTC offset string ("UTC", "+02:00", "-05:30").
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh record for a first-seen identity: level 1, no streak, UTC.
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_xp: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_active_date: None,
            avatar_tier: 0,
            timezone: "UTC".to_string(),
            display_name: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial profile update. Fields left absent keep their stored value;
/// presence is explicit so an empty string is a deliberate write, never a
/// coerced "falsy" skip.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub timezone: Option<String>,
}

/// Merges a partial profile update onto an existing record.
///
/// Pure and tested independently of storage: untouched fields are preserved
/// verbatim, progression fields are never writable through a patch.
pub fn merge_profile(existing: &User, patch: &ProfilePatch, now: DateTime<Utc>) -> User {
    let mut merged = existing.clone();
    if let Some(name) = &patch.display_name {
        merged.display_name = Some(name.clone());
    }
    if let Some(tz) = &patch.timezone {
        merged.timezone = tz.clone();
    }
    merged.updated_at = now;
    merged
}

/// Catalog quest: immutable reference data seeded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    /// Reward at multiplier 1.0.
    pub base_points: i64,
    /// 0 means no cooldown.
    pub cooldown_seconds: i64,
    pub active: bool,
}

/// User-owned repeatable habit. Soft-deactivated, never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub base_points: i64,
    /// Max completions per local date that earn XP.
    pub daily_target: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Routine joined with its completion count for the caller's current local
/// date, as returned by the list endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineWithToday {
    #[serde(flatten)]
    pub routine: Routine,
    pub completed_today: i64,
}

/// Append-only quest completion record. `gained_xp` and `streak_applied` are
/// snapshots taken at award time, never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub user_id: String,
    pub quest_id: String,
    pub gained_xp: i64,
    pub streak_applied: i64,
    pub created_at: DateTime<Utc>,
    pub local_date: NaiveDate,
}

/// Append-only routine completion record. Carries no streak snapshot; see the
/// schema asymmetry test in `state::sqlite::tests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineLog {
    pub id: String,
    pub routine_id: String,
    pub user_id: String,
    pub gained_xp: i64,
    pub created_at: DateTime<Utc>,
    pub local_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// Progression snapshot returned with every completion and from `/me`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total_xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_date: Option<NaiveDate>,
    pub avatar_tier: i64,
}

impl From<&User> for Progress {
    fn from(user: &User) -> Self {
        Self {
            total_xp: user.total_xp,
            level: user.level,
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
            last_active_date: user.last_active_date,
            avatar_tier: user.avatar_tier,
        }
    }
}

/// How the award was computed, echoed back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMeta {
    pub base_points: i64,
    pub multiplier: f64,
    pub leveled_up: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestCompletion {
    pub completion: Run,
    pub progress: Progress,
    pub meta: CompletionMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineCompletion {
    pub completion: RoutineLog,
    pub progress: Progress,
    pub meta: CompletionMeta,
}

// ---------------------------------------------------------------------------
// Weekly insights
// ---------------------------------------------------------------------------

/// Weekly routine-consistency classification. Thresholds on the completion
/// rate: >= 70 Green, >= 40 Amber, else Red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskBand {
    Green,
    Amber,
    Red,
}

/// Presentational mood derived from the risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Thoughtful,
    Tired,
}

impl RiskBand {
    pub fn from_completion_rate(rate: i64) -> Self {
        if rate >= 70 {
            RiskBand::Green
        } else if rate >= 40 {
            RiskBand::Amber
        } else {
            RiskBand::Red
        }
    }

    pub fn mood(&self) -> Mood {
        match self {
            RiskBand::Green => Mood::Happy,
            RiskBand::Amber => Mood::Thoughtful,
            RiskBand::Red => Mood::Tired,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RiskBand::Green => "Great week! Your routines are on track.",
            RiskBand::Amber => "A few routines slipped this week. Small steps still count.",
            RiskBand::Red => "Tough week. Pick one routine and restart your streak today.",
        }
    }
}

/// One day in the dense 7-day series. Days with no activity appear with
/// zeroed counts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: NaiveDate,
    pub quest_runs: i64,
    pub routine_logs: i64,
    pub xp_gained: i64,
    pub target_met: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTotals {
    pub quest_runs: i64,
    pub routine_logs: i64,
    pub xp_gained: i64,
}

/// Read-only weekly report; mutates nothing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub days: Vec<DaySummary>,
    pub totals: WeeklyTotals,
    pub daily_target_total: i64,
    pub days_met_target: i64,
    /// Whole percentage 0..=100; 0 whenever no active routines exist.
    pub completion_rate: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub avatar_tier: i64,
    pub risk_band: RiskBand,
    pub mood: Mood,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Aggregation rows (store -> aggregator)
// ---------------------------------------------------------------------------

/// Per-day quest activity as grouped by the store.
#[derive(Debug, Clone)]
pub struct DayAggregate {
    pub local_date: NaiveDate,
    pub runs: i64,
    pub xp: i64,
}

/// Per-day routine-log count as grouped by the store.
#[derive(Debug, Clone)]
pub struct DayCount {
    pub local_date: NaiveDate,
    pub count: i64,
}

/// Everything the weekly aggregator needs, read inside one transaction so the
/// report reflects a single instant. `today` is the user's current local date
/// as resolved by the store while it held the snapshot.
#[derive(Debug, Clone)]
pub struct WeeklySnapshot {
    pub user: Option<User>,
    pub today: NaiveDate,
    pub run_days: Vec<DayAggregate>,
    pub log_days: Vec<DayCount>,
    pub routines: Vec<RoutineWithToday>,
}
