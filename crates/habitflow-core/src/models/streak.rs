use chrono::{DateTime, Utc};

use crate::models::{Completion, Habit};

/// Two completions whose floored day gap is within this bound belong to the
/// same run. Deliberately looser than [`ALIVE_WINDOW_DAYS`]; the asymmetry is
/// observable in streak output and must not be tightened.
const CONSECUTIVE_GAP_DAYS: f64 = 1.5;

/// How many whole days the latest completion may lag behind `now` before the
/// current streak counts as broken.
const ALIVE_WINDOW_DAYS: i64 = 1;

/// Derived streak statistics for one habit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreakData {
    /// Length of the still-active run ending at `now`; 0 when the most
    /// recent completion is stale.
    pub streak: u32,
    /// Longest run ever observed in the history.
    pub best_streak: u32,
    /// Raw completion count.
    pub total: u32,
}

/// Compute streak statistics from one habit's completion history.
///
/// Pure and side-effect free: the input order is irrelevant (records are
/// sorted by `completed_at` internally) and `now` is passed in rather than
/// read from the clock. Day gaps are the floor of the real-valued day
/// difference, not a calendar-date subtraction.
pub fn compute_streak_data(completions: &[Completion], now: DateTime<Utc>) -> StreakData {
    let mut sorted: Vec<&Completion> = completions.iter().collect();
    sorted.sort_by_key(|c| c.completed_at);

    let Some(latest) = sorted.last() else {
        return StreakData::default();
    };

    let total = sorted.len() as u32;
    let days_since_last = (now - latest.completed_at).num_days();
    let alive = days_since_last <= ALIVE_WINDOW_DAYS;

    let mut streak: u32 = if alive { 1 } else { 0 };
    let mut current_streak: u32 = 1;
    let mut best_streak: u32 = 1;
    // `streak` only ever tracks the run containing the most recent
    // completion; the first gap ends that run for good.
    let mut in_leading_run = true;

    for pair in sorted.windows(2).rev() {
        let gap_days = (pair[1].completed_at - pair[0].completed_at).num_days();
        if gap_days as f64 <= CONSECUTIVE_GAP_DAYS {
            current_streak += 1;
            if in_leading_run && alive {
                streak = current_streak;
            }
        } else {
            in_leading_run = false;
            best_streak = best_streak.max(current_streak);
            current_streak = 1;
        }
    }

    StreakData {
        streak,
        best_streak: best_streak.max(current_streak),
        total,
    }
}

/// A habit together with its derived streak statistics.
#[derive(Clone, Debug)]
pub struct RankedHabit {
    pub habit: Habit,
    pub data: StreakData,
}

/// Rank habits by total completions, descending. The sort is stable: habits
/// with equal totals keep their original relative order.
pub fn rank_habits(
    habits: &[Habit],
    completions: &[Completion],
    now: DateTime<Utc>,
) -> Vec<RankedHabit> {
    let mut ranked: Vec<RankedHabit> = habits
        .iter()
        .map(|habit| {
            let own: Vec<Completion> = completions
                .iter()
                .filter(|c| c.id == habit.id)
                .cloned()
                .collect();
            RankedHabit {
                habit: habit.clone(),
                data: compute_streak_data(&own, now),
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.data.total.cmp(&a.data.total));
    ranked
}
