use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};
use crate::events::{ChangeEvent, RowChange};
use crate::models::{
    compute_streak_data, local_day_start, rank_habits, Completion, Frequency, Habit, HabitPatch,
    NewHabit, RankedHabit,
};
use crate::store::HabitStore;

/// Eventually-consistent local mirror of one owner's habits and completions.
///
/// Rebuilt wholesale by the load operations and patched incrementally from
/// the change feed. The mirrors are owned exclusively by whoever drives this
/// struct — in practice the sync runtime's single consumer task — so there is
/// no locking here, only idempotent merge logic.
pub struct HabitLedger {
    store: Arc<dyn HabitStore>,
    owner_id: String,
    habits: Vec<Habit>,
    completions: Vec<Completion>,
}

impl HabitLedger {
    pub fn new(store: Arc<dyn HabitStore>, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
            habits: Vec::new(),
            completions: Vec::new(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn habits(&self) -> &[Habit] {
        &self.habits
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    /// Fetch all habits for the owner and replace the mirror wholesale.
    ///
    /// Best-effort by design: a transport failure is logged and the previous
    /// mirror stays untouched. Never retried.
    pub async fn load_habits(&mut self) {
        match self.store.habits_for(&self.owner_id).await {
            Ok(habits) => self.habits = habits,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load habits; keeping previous mirror");
            }
        }
    }

    /// Fetch the full completion view and replace the mirror wholesale.
    /// Same best-effort policy as `load_habits`.
    pub async fn load_completions(&mut self) {
        match self.store.completions_for(&self.owner_id).await {
            Ok(completions) => self.completions = completions,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load completions; keeping previous mirror");
            }
        }
    }

    /// Seed the mirror with completions after local midnight — enough to
    /// answer "already done today" without the full view.
    pub async fn load_todays_completions(&mut self, now: DateTime<Utc>) {
        let since = local_day_start(now);
        match self.store.completions_since(&self.owner_id, since).await {
            Ok(rows) => {
                for row in rows {
                    self.upsert_completion_row(row);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load today's completions");
            }
        }
    }

    /// Apply one change-feed event to the mirrors.
    ///
    /// Idempotent under duplicate delivery: an insert for an id already
    /// present replaces that row instead of appending, updates patch in
    /// place without disturbing order, and deletes of absent rows are no-ops.
    pub fn apply(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Habit(change) => {
                tracing::debug!(kind = change.kind(), "applying habit change");
                match change {
                    RowChange::Insert(habit) => {
                        match self.habits.iter_mut().find(|h| h.id == habit.id) {
                            Some(existing) => *existing = habit,
                            None => self.habits.push(habit),
                        }
                    }
                    RowChange::Update(habit) => {
                        if let Some(existing) = self.habits.iter_mut().find(|h| h.id == habit.id) {
                            *existing = habit;
                        } else {
                            // Per-record ordering means the insert should have
                            // arrived first; tolerate the stray update anyway.
                            self.habits.push(habit);
                        }
                    }
                    RowChange::Delete { id } => self.habits.retain(|h| h.id != id),
                }
            }
            ChangeEvent::Completion(change) => {
                tracing::debug!(kind = change.kind(), "applying completion change");
                match change {
                    RowChange::Insert(completion) | RowChange::Update(completion) => {
                        self.upsert_completion_row(completion);
                    }
                    RowChange::Delete { id } => self.completions.retain(|c| c.id != id),
                }
            }
        }
    }

    fn upsert_completion_row(&mut self, completion: Completion) {
        match self.completions.iter_mut().find(|c| c.id == completion.id) {
            Some(existing) => *existing = completion,
            None => self.completions.push(completion),
        }
    }

    /// Habit ids completed since local midnight, recomputed from wall-clock
    /// time on every query so the day rolls over without any explicit event.
    pub fn completed_today(&self, now: DateTime<Utc>) -> HashSet<i64> {
        let day_start = local_day_start(now);
        self.completions
            .iter()
            .filter(|c| c.completed_at >= day_start)
            .map(|c| c.id)
            .collect()
    }

    pub fn is_completed_today(&self, id: i64, now: DateTime<Utc>) -> bool {
        self.completed_today(now).contains(&id)
    }

    /// Validate and submit a new habit.
    ///
    /// Validation happens before any network call. On success nothing is
    /// appended locally: the change feed echoes the insert back, so the
    /// mirror converges eventually rather than immediately.
    pub async fn create_habit(
        &mut self,
        title: &str,
        description: &str,
        frequency: Option<Frequency>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if title.trim().is_empty() {
            return Err(CoreError::Validation("title"));
        }
        if description.trim().is_empty() {
            return Err(CoreError::Validation("description"));
        }
        let frequency = frequency.ok_or(CoreError::Validation("frequency"))?;

        let habit = NewHabit {
            user_id: self.owner_id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            streak_count: 0,
            last_completed: now,
            frequency,
        };
        let inserted = self.store.insert_habit(habit).await?;
        tracing::info!(id = inserted.id, "habit created");
        Ok(())
    }

    /// Remove a habit, optimistically.
    ///
    /// The local row goes away immediately; if the store call then fails the
    /// removal is NOT rolled back — the inconsistency is logged and accepted.
    pub async fn delete_habit(&mut self, id: i64) {
        self.habits.retain(|h| h.id != id);
        if let Err(e) = self.store.delete_habit(id).await {
            tracing::warn!(id, error = %e, "habit delete failed; optimistic removal stands");
        }
    }

    /// Mark a habit done today.
    ///
    /// No-op when the habit is already in today's completed set. Otherwise
    /// two writes, not transactional: the completion row first, then the
    /// habit's streak cache. A failing second write leaves the completion
    /// recorded with a stale `streak_count` — a known window, logged and not
    /// retried; `reconcile_streak_counts` can close it on demand.
    pub async fn complete_habit(&mut self, id: i64, now: DateTime<Utc>) -> Result<()> {
        if self.is_completed_today(id, now) {
            tracing::debug!(id, "habit already completed today");
            return Ok(());
        }

        self.store
            .upsert_completion(Completion {
                id,
                user_id: self.owner_id.clone(),
                completed_at: now,
            })
            .await?;

        let Some(habit) = self.habits.iter().find(|h| h.id == id).cloned() else {
            tracing::warn!(id, "completed a habit missing from the mirror");
            return Ok(());
        };
        let patch = HabitPatch {
            streak_count: habit.streak_count + 1,
            last_completed: now,
        };
        if let Err(e) = self.store.update_habit(id, patch).await {
            tracing::warn!(
                id,
                error = %e,
                "completion recorded but streak cache update failed"
            );
        }
        Ok(())
    }

    /// Corrective pass for the two-write window: recompute each habit's
    /// current streak from the completion mirror and overwrite the stored
    /// cache where it drifted. Explicitly invoked, never automatic.
    pub async fn reconcile_streak_counts(&mut self, now: DateTime<Utc>) {
        let habits = self.habits.clone();
        for habit in habits {
            let own: Vec<Completion> = self
                .completions
                .iter()
                .filter(|c| c.id == habit.id)
                .cloned()
                .collect();
            let data = compute_streak_data(&own, now);
            if habit.streak_count == data.streak as i64 {
                continue;
            }
            tracing::info!(
                id = habit.id,
                cached = habit.streak_count,
                derived = data.streak,
                "reconciling drifted streak cache"
            );
            let patch = HabitPatch {
                streak_count: data.streak as i64,
                last_completed: habit.last_completed,
            };
            if let Err(e) = self.store.update_habit(habit.id, patch).await {
                tracing::warn!(id = habit.id, error = %e, "streak reconciliation write failed");
            }
        }
    }

    /// Habits with derived streak data, ranked by total completions.
    pub fn ranked(&self, now: DateTime<Utc>) -> Vec<RankedHabit> {
        rank_habits(&self.habits, &self.completions, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn habit_row(id: i64, title: &str) -> Habit {
        Habit {
            id,
            user_id: "user-1".to_string(),
            title: title.to_string(),
            description: "desc".to_string(),
            streak_count: 0,
            last_completed: now(),
            frequency: Frequency::Daily,
        }
    }

    fn ledger_with_memory_store() -> (Arc<MemoryStore>, HabitLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = HabitLedger::new(store.clone(), "user-1");
        (store, ledger)
    }

    #[tokio::test]
    async fn duplicate_insert_event_keeps_one_row() {
        let (_store, mut ledger) = ledger_with_memory_store();
        let habit = habit_row(1, "read");
        ledger.apply(ChangeEvent::Habit(RowChange::Insert(habit.clone())));
        ledger.apply(ChangeEvent::Habit(RowChange::Insert(habit)));
        assert_eq!(ledger.habits().len(), 1);
    }

    #[tokio::test]
    async fn update_event_patches_in_place() {
        let (_store, mut ledger) = ledger_with_memory_store();
        ledger.apply(ChangeEvent::Habit(RowChange::Insert(habit_row(1, "read"))));
        ledger.apply(ChangeEvent::Habit(RowChange::Insert(habit_row(2, "run"))));

        let mut updated = habit_row(1, "read");
        updated.streak_count = 4;
        ledger.apply(ChangeEvent::Habit(RowChange::Update(updated)));

        // Order of other elements unaffected.
        assert_eq!(ledger.habits()[0].id, 1);
        assert_eq!(ledger.habits()[0].streak_count, 4);
        assert_eq!(ledger.habits()[1].id, 2);
    }

    #[tokio::test]
    async fn delete_event_removes_the_row() {
        let (_store, mut ledger) = ledger_with_memory_store();
        ledger.apply(ChangeEvent::Habit(RowChange::Insert(habit_row(1, "read"))));
        ledger.apply(ChangeEvent::Habit(RowChange::Delete { id: 1 }));
        assert!(ledger.habits().is_empty());
        // Deleting again is a no-op.
        ledger.apply(ChangeEvent::Habit(RowChange::Delete { id: 1 }));
    }

    #[tokio::test]
    async fn create_habit_validates_before_any_network_call() {
        let (store, mut ledger) = ledger_with_memory_store();

        let err = ledger.create_habit("", "desc", Some(Frequency::Daily), now()).await;
        assert!(matches!(err, Err(CoreError::Validation("title"))));
        let err = ledger.create_habit("read", "  ", Some(Frequency::Daily), now()).await;
        assert!(matches!(err, Err(CoreError::Validation("description"))));
        let err = ledger.create_habit("read", "desc", None, now()).await;
        assert!(matches!(err, Err(CoreError::Validation("frequency"))));

        assert!(store.habits_for("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_habit_does_not_append_locally() {
        let (store, mut ledger) = ledger_with_memory_store();
        ledger
            .create_habit("read", "20 pages", Some(Frequency::Daily), now())
            .await
            .unwrap();

        // The store has the row; the mirror converges only via the feed echo.
        assert_eq!(store.habits_for("user-1").await.unwrap().len(), 1);
        assert!(ledger.habits().is_empty());
    }

    #[tokio::test]
    async fn delete_is_optimistic_and_never_rolled_back() {
        let (store, mut ledger) = ledger_with_memory_store();
        ledger.apply(ChangeEvent::Habit(RowChange::Insert(habit_row(1, "read"))));
        store.fail_deletes(true);

        ledger.delete_habit(1).await;
        assert!(ledger.habits().is_empty());
    }

    #[tokio::test]
    async fn complete_habit_is_idempotent_within_a_day() {
        let (store, mut ledger) = ledger_with_memory_store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.set_feed(tx);

        let inserted = store
            .insert_habit(NewHabit {
                user_id: "user-1".to_string(),
                title: "read".to_string(),
                description: "desc".to_string(),
                streak_count: 0,
                last_completed: now(),
                frequency: Frequency::Daily,
            })
            .await
            .unwrap();
        ledger.load_habits().await;

        ledger.complete_habit(inserted.id, now()).await.unwrap();
        // Echo the feed back into the mirror, as the runtime would.
        while let Ok(event) = rx.try_recv() {
            ledger.apply(event);
        }

        // Second call the same day is a no-op.
        ledger.complete_habit(inserted.id, now()).await.unwrap();

        assert_eq!(store.completions_for("user-1").await.unwrap().len(), 1);
        let habit = &store.habits_for("user-1").await.unwrap()[0];
        assert_eq!(habit.streak_count, 1);
        assert!(ledger.is_completed_today(inserted.id, now()));
    }

    #[tokio::test]
    async fn failed_streak_write_leaves_completion_recorded() {
        let (store, mut ledger) = ledger_with_memory_store();
        let inserted = store
            .insert_habit(NewHabit {
                user_id: "user-1".to_string(),
                title: "read".to_string(),
                description: "desc".to_string(),
                streak_count: 0,
                last_completed: now(),
                frequency: Frequency::Daily,
            })
            .await
            .unwrap();
        ledger.load_habits().await;
        store.fail_updates(true);

        // Accepted inconsistency window: the call itself still succeeds.
        ledger.complete_habit(inserted.id, now()).await.unwrap();
        assert_eq!(store.completions_for("user-1").await.unwrap().len(), 1);
        assert_eq!(store.habits_for("user-1").await.unwrap()[0].streak_count, 0);
    }

    #[tokio::test]
    async fn reconcile_overwrites_drifted_cache() {
        let (store, mut ledger) = ledger_with_memory_store();
        let inserted = store
            .insert_habit(NewHabit {
                user_id: "user-1".to_string(),
                title: "read".to_string(),
                description: "desc".to_string(),
                streak_count: 0,
                last_completed: now(),
                frequency: Frequency::Daily,
            })
            .await
            .unwrap();
        ledger.load_habits().await;
        ledger.apply(ChangeEvent::Completion(RowChange::Insert(Completion {
            id: inserted.id,
            user_id: "user-1".to_string(),
            completed_at: now(),
        })));

        ledger.reconcile_streak_counts(now()).await;
        assert_eq!(store.habits_for("user-1").await.unwrap()[0].streak_count, 1);
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_mirror() {
        let (store, mut ledger) = ledger_with_memory_store();
        ledger.apply(ChangeEvent::Habit(RowChange::Insert(habit_row(1, "read"))));

        store.fail_reads(true);
        ledger.load_habits().await;
        assert_eq!(ledger.habits().len(), 1);

        // A successful fetch replaces the mirror wholesale.
        store.fail_reads(false);
        ledger.load_habits().await;
        assert!(ledger.habits().is_empty());
    }

    #[tokio::test]
    async fn completed_today_rolls_over_at_local_midnight() {
        let (_store, mut ledger) = ledger_with_memory_store();
        ledger.apply(ChangeEvent::Completion(RowChange::Insert(Completion {
            id: 1,
            user_id: "user-1".to_string(),
            completed_at: now(),
        })));

        assert!(ledger.is_completed_today(1, now()));
        // Two days later the same row no longer counts as "today".
        assert!(!ledger.is_completed_today(1, now() + chrono::Duration::days(2)));
    }
}
