mod memory;
mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::SupabaseStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Completion, Habit, HabitPatch, NewHabit, UserProfile};

/// Contract with the hosted store, scoped per owner.
///
/// Implementations perform one attempt per call and never retry on the
/// caller's behalf; best-effort policy (log-and-continue, optimistic local
/// mutation) lives in the ledger, not here.
#[async_trait]
pub trait HabitStore: Send + Sync {
    async fn habits_for(&self, owner: &str) -> Result<Vec<Habit>>;

    async fn completions_for(&self, owner: &str) -> Result<Vec<Completion>>;

    /// Completions with `completed_at` strictly after `since`.
    async fn completions_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Completion>>;

    async fn insert_habit(&self, habit: NewHabit) -> Result<Habit>;

    async fn update_habit(&self, id: i64, patch: HabitPatch) -> Result<()>;

    async fn delete_habit(&self, id: i64) -> Result<()>;

    /// Insert-or-replace the single completion row for a habit.
    async fn upsert_completion(&self, completion: Completion) -> Result<()>;

    async fn profile_for(&self, owner: &str) -> Result<Option<UserProfile>>;

    async fn create_profile(&self, profile: UserProfile) -> Result<()>;
}
