//! Leveling function and avatar-tier promotion rule.

/// Maps cumulative XP to a level: `floor(sqrt(xp) / 2) + 1`.
///
/// Monotonic non-decreasing; level 1 at 0 XP. Negative input is treated as 0
/// (XP is never negative in stored state).
pub fn compute_level(total_xp: i64) -> i64 {
    ((total_xp.max(0) as f64).sqrt() / 2.0).floor() as i64 + 1
}

/// Whether a completion event promotes the avatar tier.
///
/// Only the post-event level is tested: a jump from level 3 to level 11
/// promotes once at most, not once per multiple-of-5 crossed.
pub fn promotes_avatar(previous_level: i64, new_level: i64) -> bool {
    new_level > previous_level && new_level % 5 == 0
}
