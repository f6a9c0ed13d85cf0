//! End-to-end completion flows over a real SQLite store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::config::QuestSeed;
use crate::engine::{insights, CompletionEngine};
use crate::error::{EngineError, Rejection};
use crate::leveling::compute_level;
use crate::state::SqliteStateStore;
use crate::traits::{CatalogStore, HistoryStore, StateStore, UserStore};
use crate::types::{ProfilePatch, RiskBand, User};

fn quest(id: &str, base_points: i64, cooldown_seconds: i64) -> QuestSeed {
    QuestSeed {
        id: id.to_string(),
        title: id.to_string(),
        base_points,
        cooldown_seconds,
        active: true,
    }
}

async fn setup() -> (
    Arc<CompletionEngine>,
    Arc<dyn StateStore>,
    tempfile::NamedTempFile,
) {
    let db = tempfile::NamedTempFile::new().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(
        SqliteStateStore::new(db.path().to_str().unwrap())
            .await
            .unwrap(),
    );
    store
        .seed_quests(&[
            quest("simple", 10, 0),
            quest("hourly", 25, 3600),
            quest("epic", 10_000, 0),
        ])
        .await
        .unwrap();
    let engine = Arc::new(CompletionEngine::new(store.clone()));
    (engine, store, db)
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

#[tokio::test]
async fn first_completion_awards_boosted_xp() {
    let (engine, _store, _db) = setup().await;

    let res = engine
        .complete_quest("u-1", "simple", at(2024, 5, 1, 12))
        .await
        .unwrap();

    // Streak 1 => 5% day bonus, no week block: 10 * 1.05 rounds up to 11.
    assert_eq!(res.progress.current_streak, 1);
    assert_eq!(res.progress.longest_streak, 1);
    assert_eq!(res.meta.multiplier, 1.05);
    assert_eq!(res.meta.base_points, 10);
    assert_eq!(res.completion.gained_xp, 11);
    assert_eq!(res.completion.streak_applied, 1);
    assert_eq!(res.progress.total_xp, 11);
    assert_eq!(res.progress.level, compute_level(11));
}

#[tokio::test]
async fn same_day_repeats_leave_streak_flat() {
    let (engine, _store, _db) = setup().await;

    engine
        .complete_quest("u-1", "simple", at(2024, 5, 1, 8))
        .await
        .unwrap();
    let res = engine
        .complete_quest("u-1", "simple", at(2024, 5, 1, 20))
        .await
        .unwrap();

    assert_eq!(res.progress.current_streak, 1);
    assert_eq!(res.meta.multiplier, 1.05);
}

#[tokio::test]
async fn consecutive_days_build_streak_then_gap_resets() {
    let (engine, _store, _db) = setup().await;

    engine
        .complete_quest("u-1", "simple", at(2024, 5, 1, 12))
        .await
        .unwrap();
    let day2 = engine
        .complete_quest("u-1", "simple", at(2024, 5, 2, 12))
        .await
        .unwrap();
    assert_eq!(day2.progress.current_streak, 2);
    assert_eq!(day2.meta.multiplier, 1.1);

    // Two quiet days break the chain.
    let day5 = engine
        .complete_quest("u-1", "simple", at(2024, 5, 5, 12))
        .await
        .unwrap();
    assert_eq!(day5.progress.current_streak, 1);
    assert_eq!(day5.progress.longest_streak, 2);
}

#[tokio::test]
async fn cooldown_rejects_then_admits() {
    let (engine, _store, _db) = setup().await;
    let t0 = at(2024, 5, 1, 12);

    engine.complete_quest("u-1", "hourly", t0).await.unwrap();

    match engine
        .complete_quest("u-1", "hourly", t0 + Duration::seconds(1800))
        .await
    {
        Err(EngineError::Rejected(Rejection::RateLimited { retry_after_seconds })) => {
            assert_eq!(retry_after_seconds, 1800);
        }
        other => panic!("expected rate limit, got {:?}", other.map(|_| ())),
    }

    engine
        .complete_quest("u-1", "hourly", t0 + Duration::seconds(3601))
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_quest_is_invalid_input() {
    let (engine, _store, _db) = setup().await;
    match engine
        .complete_quest("u-1", "no-such-quest", at(2024, 5, 1, 12))
        .await
    {
        Err(EngineError::Rejected(rej)) => assert_eq!(rej.kind(), "INVALID_INPUT"),
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn daily_target_caps_logs_per_local_date() {
    let (engine, _store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    let routine = engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(2), now)
        .await
        .unwrap();

    engine.log_routine("u-1", &routine.id, now).await.unwrap();
    engine
        .log_routine("u-1", &routine.id, now + Duration::hours(2))
        .await
        .unwrap();

    match engine
        .log_routine("u-1", &routine.id, now + Duration::hours(3))
        .await
    {
        Err(EngineError::Rejected(rej)) => assert_eq!(rej.kind(), "LIMIT_REACHED"),
        other => panic!("expected limit rejection, got {:?}", other.map(|_| ())),
    }

    // Next local date: the count starts over.
    engine
        .log_routine("u-1", &routine.id, now + Duration::days(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn routine_of_another_user_is_not_found() {
    let (engine, _store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    let routine = engine
        .create_routine("owner", Some("Stretch"), Some(5), Some(2), now)
        .await
        .unwrap();

    match engine.log_routine("intruder", &routine.id, now).await {
        Err(EngineError::Rejected(rej)) => assert_eq!(rej.kind(), "NOT_FOUND"),
        other => panic!("expected not-found, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn create_routine_validates_presence_and_sign() {
    let (engine, _store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    let missing_title = engine
        .create_routine("u-1", None, Some(5), Some(2), now)
        .await;
    assert!(matches!(
        missing_title,
        Err(EngineError::Rejected(Rejection::InvalidInput(_)))
    ));

    // Zero is present but invalid, a different mistake than absent.
    let zero_target = engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(0), now)
        .await;
    match zero_target {
        Err(EngineError::Rejected(Rejection::InvalidInput(msg))) => {
            assert!(msg.contains("positive"));
        }
        other => panic!("expected invalid input, got {:?}", other.map(|_| ())),
    }

    let absent_target = engine
        .create_routine("u-1", Some("Stretch"), Some(5), None, now)
        .await;
    match absent_target {
        Err(EngineError::Rejected(Rejection::InvalidInput(msg))) => {
            assert!(msg.contains("required"));
        }
        other => panic!("expected invalid input, got {:?}", other.map(|_| ())),
    }

    engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(2), now)
        .await
        .unwrap();
    let duplicate = engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(2), now)
        .await;
    assert!(matches!(
        duplicate,
        Err(EngineError::Rejected(Rejection::Conflict(_)))
    ));
}

#[tokio::test]
async fn avatar_tier_promotes_on_multiple_of_five() {
    let (engine, store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    // 60 XP puts the user at level 4; gaining 11 crosses into level 5.
    let mut user = User::new("u-1", now);
    user.total_xp = 60;
    user.level = compute_level(60);
    assert_eq!(user.level, 4);
    store.upsert_user(&user).await.unwrap();

    let res = engine.complete_quest("u-1", "simple", now).await.unwrap();
    assert_eq!(res.progress.total_xp, 71);
    assert_eq!(res.progress.level, 5);
    assert!(res.meta.leveled_up);
    assert_eq!(res.progress.avatar_tier, 1);
}

#[tokio::test]
async fn huge_xp_jump_promotes_at_most_once() {
    let (engine, _store, _db) = setup().await;

    // 10000 * 1.05 = 10500 XP lands far up the curve, crossing many
    // multiples of five; only the final level's divisibility counts.
    let res = engine
        .complete_quest("u-1", "epic", at(2024, 5, 1, 12))
        .await
        .unwrap();
    assert_eq!(res.completion.gained_xp, 10_500);
    assert!(res.meta.leveled_up);
    assert_eq!(res.progress.level, compute_level(10_500));
    assert_eq!(res.progress.avatar_tier, 0);
}

#[tokio::test]
async fn timezone_shifts_the_local_date() {
    let (engine, store, _db) = setup().await;
    let now = at(2024, 5, 1, 23); // 23:00 UTC

    let mut user = User::new("u-1", now);
    user.timezone = "+02:00".to_string();
    store.upsert_user(&user).await.unwrap();

    let res = engine.complete_quest("u-1", "simple", now).await.unwrap();
    assert_eq!(res.completion.local_date.to_string(), "2024-05-02");
}

#[tokio::test]
async fn weekly_report_with_zero_activity_is_red() {
    let (_engine, store, _db) = setup().await;

    let report = insights::weekly_insights(store.as_ref(), "u-1", at(2024, 5, 7, 12))
        .await
        .unwrap();
    assert_eq!(report.days.len(), 7);
    assert_eq!(report.window_start.to_string(), "2024-05-01");
    assert_eq!(report.window_end.to_string(), "2024-05-07");
    assert_eq!(report.completion_rate, 0);
    assert_eq!(report.risk_band, RiskBand::Red);
    assert!(report
        .days
        .iter()
        .all(|d| d.routine_logs == 0 && d.quest_runs == 0));
}

#[tokio::test]
async fn quest_activity_without_routines_keeps_rate_zero() {
    let (engine, store, _db) = setup().await;

    for day in 1..=7 {
        engine
            .complete_quest("u-1", "simple", at(2024, 5, day, 12))
            .await
            .unwrap();
    }

    let report = insights::weekly_insights(store.as_ref(), "u-1", at(2024, 5, 7, 18))
        .await
        .unwrap();
    assert_eq!(report.totals.quest_runs, 7);
    assert!(report.totals.xp_gained > 0);
    // No active routines means no target to meet: rate stays 0.
    assert_eq!(report.daily_target_total, 0);
    assert_eq!(report.completion_rate, 0);
    assert_eq!(report.risk_band, RiskBand::Red);
    assert_eq!(report.current_streak, 7);
}

#[tokio::test]
async fn weekly_report_goes_green_when_targets_met() {
    let (engine, store, _db) = setup().await;
    let start = at(2024, 5, 1, 12);

    let routine = engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(1), start)
        .await
        .unwrap();
    for day in 0..7 {
        engine
            .log_routine("u-1", &routine.id, start + Duration::days(day))
            .await
            .unwrap();
    }

    let report = insights::weekly_insights(store.as_ref(), "u-1", at(2024, 5, 7, 18))
        .await
        .unwrap();
    assert_eq!(report.days_met_target, 7);
    assert_eq!(report.completion_rate, 100);
    assert_eq!(report.risk_band, RiskBand::Green);
    assert_eq!(report.current_streak, 7);
    assert_eq!(report.longest_streak, 7);
    assert!(report.days.iter().all(|d| d.target_met));
}

#[tokio::test]
async fn amber_band_for_partial_weeks() {
    let (engine, store, _db) = setup().await;
    let start = at(2024, 5, 1, 12);

    let routine = engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(1), start)
        .await
        .unwrap();
    // 4 of the 7 window days met: round(4/7*100) = 57 -> Amber.
    for day in [0, 1, 2, 3] {
        engine
            .log_routine("u-1", &routine.id, start + Duration::days(day))
            .await
            .unwrap();
    }

    let report = insights::weekly_insights(store.as_ref(), "u-1", at(2024, 5, 7, 18))
        .await
        .unwrap();
    assert_eq!(report.days_met_target, 4);
    assert_eq!(report.completion_rate, 57);
    assert_eq!(report.risk_band, RiskBand::Amber);
}

#[tokio::test]
async fn concurrent_completions_for_one_user_do_not_lose_updates() {
    let (engine, store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.complete_quest("u-1", "simple", now).await.unwrap()
        }));
    }

    let mut gained_total = 0i64;
    for handle in handles {
        gained_total += handle.await.unwrap().completion.gained_xp;
    }

    let user = store.get_user("u-1").await.unwrap().unwrap();
    assert_eq!(user.total_xp, gained_total);
    assert_eq!(user.current_streak, 1); // same local date throughout
    assert_eq!(store.list_runs("u-1", 100).await.unwrap().len(), 10);
}

/// Profile writes happen outside the engine's per-user scope, so they must
/// never carry stale progression back over a completion that committed in
/// between.
#[tokio::test]
async fn profile_patches_never_roll_back_progression() {
    let (engine, store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    let mut earned = 0i64;
    for i in 0..25 {
        let store = store.clone();
        let patcher = tokio::spawn(async move {
            let patch = ProfilePatch {
                display_name: Some(format!("Dana {i}")),
                timezone: None,
            };
            crate::traits::update_profile(store.as_ref(), "u-1", &patch, Utc::now())
                .await
                .unwrap();
        });
        earned += engine
            .complete_quest("u-1", "simple", now)
            .await
            .unwrap()
            .completion
            .gained_xp;
        patcher.await.unwrap();
    }

    let user = store.get_user("u-1").await.unwrap().unwrap();
    assert_eq!(user.total_xp, earned);
    assert_eq!(user.current_streak, 1);
    assert!(user.display_name.is_some());
}

#[tokio::test]
async fn creating_a_routine_preserves_progression() {
    let (engine, store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    let gained = engine
        .complete_quest("u-1", "simple", now)
        .await
        .unwrap()
        .completion
        .gained_xp;
    engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(2), now)
        .await
        .unwrap();

    let user = store.get_user("u-1").await.unwrap().unwrap();
    assert_eq!(user.total_xp, gained);
    assert_eq!(user.current_streak, 1);
}

/// The report reads in one transaction, so its totals and the progression
/// fields describe the same instant. With all activity inside the window the
/// two must agree exactly.
#[tokio::test]
async fn weekly_report_totals_match_stored_progression() {
    let (engine, store, _db) = setup().await;

    for day in 1..=3 {
        engine
            .complete_quest("u-1", "simple", at(2024, 5, day, 12))
            .await
            .unwrap();
    }

    let report = insights::weekly_insights(store.as_ref(), "u-1", at(2024, 5, 7, 12))
        .await
        .unwrap();
    let user = store.get_user("u-1").await.unwrap().unwrap();
    assert_eq!(report.totals.xp_gained, user.total_xp);
    assert_eq!(report.totals.quest_runs, 3);
    assert_eq!(report.current_streak, user.current_streak);
    assert_eq!(report.longest_streak, user.longest_streak);
}

/// The wire asymmetry between the two completion records, kept on purpose:
/// quest runs expose the streak they were awarded under, routine logs don't.
#[tokio::test]
async fn routine_log_response_carries_no_streak_snapshot() {
    let (engine, _store, _db) = setup().await;
    let now = at(2024, 5, 1, 12);

    let quest_json =
        serde_json::to_value(engine.complete_quest("u-1", "simple", now).await.unwrap())
            .unwrap();
    assert!(quest_json["completion"].get("streakApplied").is_some());

    let routine = engine
        .create_routine("u-1", Some("Stretch"), Some(5), Some(2), now)
        .await
        .unwrap();
    let log_json =
        serde_json::to_value(engine.log_routine("u-1", &routine.id, now).await.unwrap())
            .unwrap();
    assert!(log_json["completion"].get("streakApplied").is_none());
}
