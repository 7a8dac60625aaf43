use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{CoreError, Result};
use crate::events::{ChangeEvent, RowChange};
use crate::models::{Completion, Habit, HabitPatch, NewHabit, UserProfile};
use crate::store::HabitStore;

/// In-memory store fake.
///
/// Assigns ids and echoes every mutation onto an attached change channel,
/// simulating the realtime round-trip of the hosted backend. Used by ledger
/// and runtime tests and by offline demos; the failure knobs inject store
/// errors for the optimistic-mutation and inconsistency-window paths.
#[derive(Default)]
pub struct MemoryStore {
    habits: Mutex<Vec<Habit>>,
    completions: Mutex<Vec<Completion>>,
    profiles: Mutex<Vec<UserProfile>>,
    next_id: AtomicI64,
    feed: Mutex<Option<UnboundedSender<ChangeEvent>>>,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Attach the channel mutations are echoed to.
    pub fn set_feed(&self, sender: UnboundedSender<ChangeEvent>) {
        *self.feed.lock() = Some(sender);
    }

    /// Make subsequent `update_habit` calls fail.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete_habit` calls fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent fetches fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn emit(&self, event: ChangeEvent) {
        if let Some(sender) = self.feed.lock().as_ref() {
            let _ = sender.send(event);
        }
    }

    fn injected_failure() -> CoreError {
        CoreError::Api {
            status: 500,
            body: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl HabitStore for MemoryStore {
    async fn habits_for(&self, owner: &str) -> Result<Vec<Habit>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        Ok(self
            .habits
            .lock()
            .iter()
            .filter(|h| h.user_id == owner)
            .cloned()
            .collect())
    }

    async fn completions_for(&self, owner: &str) -> Result<Vec<Completion>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        Ok(self
            .completions
            .lock()
            .iter()
            .filter(|c| c.user_id == owner)
            .cloned()
            .collect())
    }

    async fn completions_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Completion>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        Ok(self
            .completions
            .lock()
            .iter()
            .filter(|c| c.user_id == owner && c.completed_at > since)
            .cloned()
            .collect())
    }

    async fn insert_habit(&self, habit: NewHabit) -> Result<Habit> {
        let row = Habit {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user_id: habit.user_id,
            title: habit.title,
            description: habit.description,
            streak_count: habit.streak_count,
            last_completed: habit.last_completed,
            frequency: habit.frequency,
        };
        self.habits.lock().push(row.clone());
        self.emit(ChangeEvent::Habit(RowChange::Insert(row.clone())));
        Ok(row)
    }

    async fn update_habit(&self, id: i64, patch: HabitPatch) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        let updated = {
            let mut habits = self.habits.lock();
            match habits.iter_mut().find(|h| h.id == id) {
                Some(habit) => {
                    habit.streak_count = patch.streak_count;
                    habit.last_completed = patch.last_completed;
                    Some(habit.clone())
                }
                None => None,
            }
        };
        match updated {
            Some(habit) => {
                self.emit(ChangeEvent::Habit(RowChange::Update(habit)));
                Ok(())
            }
            None => Err(CoreError::Api {
                status: 404,
                body: format!("habit {id} not found"),
            }),
        }
    }

    async fn delete_habit(&self, id: i64) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        self.habits.lock().retain(|h| h.id != id);
        self.emit(ChangeEvent::Habit(RowChange::Delete { id }));
        Ok(())
    }

    async fn upsert_completion(&self, completion: Completion) -> Result<()> {
        {
            let mut completions = self.completions.lock();
            completions.retain(|c| c.id != completion.id);
            completions.push(completion.clone());
        }
        self.emit(ChangeEvent::Completion(RowChange::Insert(completion)));
        Ok(())
    }

    async fn profile_for(&self, owner: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .profiles
            .lock()
            .iter()
            .find(|p| p.user_id == owner)
            .cloned())
    }

    async fn create_profile(&self, profile: UserProfile) -> Result<()> {
        self.profiles.lock().push(profile);
        Ok(())
    }
}
