//! Streak engine: calendar-day continuity and the reward multiplier.
//!
//! Pure functions of (user state, date). The completion engine calls
//! [`apply_streak_progress`] exactly once per completion event; calling it
//! twice for the same event would double-increment the streak.

use chrono::NaiveDate;

use crate::types::User;
use crate::utils::round2;

/// Advances streak state for a completion on `today` (the user's local date).
///
/// - first-ever completion: streak becomes 1
/// - same local date as the last completion: streak unchanged
/// - exactly the next calendar day: streak + 1
/// - a gap of two or more days, or a date in the past (clock skew): reset to 1
///
/// Afterwards `longest_streak` is raised to cover `current_streak` and
/// `last_active_date` is set to `today`.
pub fn apply_streak_progress(mut user: User, today: NaiveDate) -> User {
    match user.last_active_date {
        None => user.current_streak = 1,
        Some(last) => {
            let diff = (today - last).num_days();
            if diff == 1 {
                user.current_streak += 1;
            } else if diff != 0 {
                user.current_streak = 1;
            }
        }
    }
    user.longest_streak = user.longest_streak.max(user.current_streak);
    user.last_active_date = Some(today);
    user
}

/// Reward multiplier for a given streak length.
///
/// Daily bonus of +5% per streak day capped at +50%, plus an uncapped +10%
/// per completed 7-day block. Streaks below 1 earn no bonus.
pub fn streak_multiplier(streak: i64) -> f64 {
    if streak < 1 {
        return 1.0;
    }
    let per_day = (0.05 * streak as f64).min(0.5);
    let week_bonus = (streak / 7) as f64 * 0.1;
    round2(1.0 + per_day + week_bonus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn user_with(last: Option<&str>, current: i64, longest: i64) -> User {
        let mut u = User::new("u-1", Utc::now());
        u.last_active_date = last.map(|d| d.parse().unwrap());
        u.current_streak = current;
        u.longest_streak = longest;
        u
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn first_completion_starts_streak() {
        let u = apply_streak_progress(user_with(None, 0, 0), date("2024-05-01"));
        assert_eq!(u.current_streak, 1);
        assert_eq!(u.longest_streak, 1);
        assert_eq!(u.last_active_date, Some(date("2024-05-01")));
    }

    #[test]
    fn consecutive_day_increments() {
        let u = apply_streak_progress(user_with(Some("2024-05-01"), 3, 5), date("2024-05-02"));
        assert_eq!(u.current_streak, 4);
        assert_eq!(u.longest_streak, 5);
    }

    #[test]
    fn same_day_repeat_does_not_double_count() {
        let u = apply_streak_progress(user_with(Some("2024-05-01"), 3, 3), date("2024-05-01"));
        assert_eq!(u.current_streak, 3);
    }

    #[test]
    fn gap_resets_to_one() {
        let u = apply_streak_progress(user_with(Some("2024-05-01"), 9, 9), date("2024-05-03"));
        assert_eq!(u.current_streak, 1);
        assert_eq!(u.longest_streak, 9);
    }

    #[test]
    fn backwards_date_resets_to_one() {
        // Clock skew: "today" before the last active date.
        let u = apply_streak_progress(user_with(Some("2024-05-10"), 4, 4), date("2024-05-08"));
        assert_eq!(u.current_streak, 1);
        assert_eq!(u.last_active_date, Some(date("2024-05-08")));
    }

    #[test]
    fn longest_streak_tracks_new_highs() {
        let u = apply_streak_progress(user_with(Some("2024-05-01"), 5, 5), date("2024-05-02"));
        assert_eq!(u.current_streak, 6);
        assert_eq!(u.longest_streak, 6);
    }

    #[test]
    fn multiplier_table() {
        assert_eq!(streak_multiplier(0), 1.0);
        assert_eq!(streak_multiplier(-3), 1.0);
        assert_eq!(streak_multiplier(1), 1.05);
        assert_eq!(streak_multiplier(2), 1.1);
        // Streak 7: per-day 0.35, one week block 0.1.
        assert_eq!(streak_multiplier(7), 1.45);
        // Streak 10: per-day capped at 0.5, one week block.
        assert_eq!(streak_multiplier(10), 1.6);
        // Streak 14: cap + two week blocks.
        assert_eq!(streak_multiplier(14), 1.7);
        // Week bonus is uncapped.
        assert_eq!(streak_multiplier(70), 2.5);
    }

    proptest! {
        #[test]
        fn longest_never_below_current(
            days in proptest::collection::vec(0i64..4, 1..60)
        ) {
            // Replay an arbitrary sequence of day gaps (0 = same day).
            let mut user = User::new("p", Utc::now());
            let mut today = date("2024-01-01");
            for gap in days {
                today += chrono::Duration::days(gap);
                user = apply_streak_progress(user, today);
                prop_assert!(user.longest_streak >= user.current_streak);
                prop_assert!(user.current_streak >= 1);
            }
        }

        #[test]
        fn consecutive_days_increment_by_exactly_one(len in 1i64..100) {
            let mut user = User::new("p", Utc::now());
            let start = date("2024-01-01");
            for i in 0..len {
                user = apply_streak_progress(user, start + chrono::Duration::days(i));
                prop_assert_eq!(user.current_streak, i + 1);
            }
        }

        #[test]
        fn multiplier_at_least_one(streak in -10i64..500) {
            prop_assert!(streak_multiplier(streak) >= 1.0);
        }
    }
}
