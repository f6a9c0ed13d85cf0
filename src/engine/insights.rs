//! Weekly insight aggregator: read-only risk classification over the last
//! seven local days of activity.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::traits::{HistoryStore, StateStore};
use crate::types::{DaySummary, RiskBand, User, WeeklyReport, WeeklyTotals};
use crate::utils::round_half_up;

/// Builds the weekly report for a user over the inclusive window
/// `[today - 6, today]` in the user's timezone.
///
/// Mutates nothing. The store reads happen in one transaction, so the streak
/// fields and the day buckets always describe the same instant. A never-seen
/// identity gets a fresh-user report (zero activity, Red band).
pub async fn weekly_insights(
    store: &dyn StateStore,
    user_id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<WeeklyReport> {
    let snapshot = store.weekly_snapshot(user_id, now).await?;
    let user = snapshot.user.unwrap_or_else(|| User::new(user_id, now));

    let today = snapshot.today;
    let window_start = today - Duration::days(6);

    let runs_by_date: HashMap<NaiveDate, (i64, i64)> = snapshot
        .run_days
        .into_iter()
        .map(|d| (d.local_date, (d.runs, d.xp)))
        .collect();
    let logs_by_date: HashMap<NaiveDate, i64> = snapshot
        .log_days
        .into_iter()
        .map(|d| (d.local_date, d.count))
        .collect();

    let daily_target_total: i64 = snapshot
        .routines
        .iter()
        .map(|r| r.routine.daily_target)
        .sum();

    // Dense series: every date in the window appears, zeros for quiet days.
    let mut days = Vec::with_capacity(7);
    let mut days_met_target = 0i64;
    for offset in 0..7 {
        let date = window_start + Duration::days(offset);
        let (quest_runs, xp_gained) = runs_by_date.get(&date).copied().unwrap_or((0, 0));
        let routine_logs = logs_by_date.get(&date).copied().unwrap_or(0);
        let target_met = daily_target_total > 0 && routine_logs >= daily_target_total;
        if target_met {
            days_met_target += 1;
        }
        days.push(DaySummary {
            date,
            quest_runs,
            routine_logs,
            xp_gained,
            target_met,
        });
    }

    let completion_rate = if daily_target_total > 0 {
        round_half_up(days_met_target as f64 / 7.0 * 100.0)
    } else {
        0
    };

    let risk_band = RiskBand::from_completion_rate(completion_rate);

    let totals = WeeklyTotals {
        quest_runs: days.iter().map(|d| d.quest_runs).sum(),
        routine_logs: days.iter().map(|d| d.routine_logs).sum(),
        xp_gained: days.iter().map(|d| d.xp_gained).sum(),
    };

    Ok(WeeklyReport {
        window_start,
        window_end: today,
        days,
        totals,
        daily_target_total,
        days_met_target,
        completion_rate,
        current_streak: user.current_streak,
        longest_streak: user.longest_streak,
        avatar_tier: user.avatar_tier,
        mood: risk_band.mood(),
        message: risk_band.message().to_string(),
        risk_band,
    })
}
