pub mod completion;
pub mod habit;
pub mod profile;
pub mod streak;

pub use completion::{local_day_start, Completion};
pub use habit::{Frequency, Habit, HabitPatch, NewHabit, FREQUENCIES};
pub use profile::UserProfile;
pub use streak::{compute_streak_data, rank_habits, RankedHabit, StreakData};
