use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{CoreError, Result};
use crate::events::ChangeEvent;
use crate::ledger::HabitLedger;
use crate::models::{Completion, Frequency, Habit};
use crate::store::HabitStore;

/// Commands accepted by the sync runtime.
#[derive(Debug)]
pub enum LedgerCommand {
    CreateHabit {
        title: String,
        description: String,
        frequency: Option<Frequency>,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteHabit { id: i64 },
    CompleteHabit { id: i64 },
    /// Re-run the full loads (wholesale mirror replacement).
    Refresh,
    /// Corrective pass over drifted `streak_count` caches.
    ReconcileStreaks,
    Shutdown,
}

/// Cheap clone handed to callers; all mutation goes through the runtime's
/// command channel so only one actor ever touches the mirrors.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::UnboundedSender<LedgerCommand>,
}

impl LedgerHandle {
    pub fn send(&self, command: LedgerCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| CoreError::Closed)
    }

    /// Submit a new habit and wait for the validation/store outcome. The
    /// mirror itself is only updated once the feed echoes the insert back.
    pub async fn create_habit(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        frequency: Option<Frequency>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::CreateHabit {
            title: title.into(),
            description: description.into(),
            frequency,
            reply,
        })?;
        rx.await.map_err(|_| CoreError::Closed)?
    }

    pub fn delete_habit(&self, id: i64) -> Result<()> {
        self.send(LedgerCommand::DeleteHabit { id })
    }

    pub fn complete_habit(&self, id: i64) -> Result<()> {
        self.send(LedgerCommand::CompleteHabit { id })
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(LedgerCommand::Refresh)
    }

    pub fn reconcile_streaks(&self) -> Result<()> {
        self.send(LedgerCommand::ReconcileStreaks)
    }

    pub fn shutdown(&self) {
        let _ = self.send(LedgerCommand::Shutdown);
    }
}

/// Read-only copy of the mirrors, published after every mutation.
#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    pub habits: Vec<Habit>,
    pub completions: Vec<Completion>,
}

/// Single-consumer event loop around the ledger.
///
/// Owns the mirrors outright and multiplexes the change feed with caller
/// commands; readers observe state through the snapshot watch channel rather
/// than sharing the mirrors themselves.
pub struct SyncRuntime {
    ledger: HabitLedger,
    feed: mpsc::UnboundedReceiver<ChangeEvent>,
    commands: mpsc::UnboundedReceiver<LedgerCommand>,
    handle: LedgerHandle,
    snapshot_tx: watch::Sender<LedgerSnapshot>,
}

impl SyncRuntime {
    pub fn new(
        store: Arc<dyn HabitStore>,
        owner_id: impl Into<String>,
        feed: mpsc::UnboundedReceiver<ChangeEvent>,
    ) -> Self {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(LedgerSnapshot::default());
        Self {
            ledger: HabitLedger::new(store, owner_id),
            feed,
            commands,
            handle: LedgerHandle { tx: command_tx },
            snapshot_tx,
        }
    }

    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<LedgerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run until shutdown or until the feed and command channels both close.
    pub async fn run(mut self) {
        self.ledger.load_habits().await;
        self.ledger.load_completions().await;
        self.ledger.load_todays_completions(Utc::now()).await;
        self.publish();

        loop {
            tokio::select! {
                event = self.feed.recv() => match event {
                    Some(event) => {
                        self.ledger.apply(event);
                        self.publish();
                    }
                    None => {
                        tracing::info!("change feed closed; stopping sync runtime");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(LedgerCommand::Shutdown) | None => break,
                    Some(command) => {
                        self.dispatch(command).await;
                        self.publish();
                    }
                },
            }
        }
    }

    async fn dispatch(&mut self, command: LedgerCommand) {
        let now = Utc::now();
        match command {
            LedgerCommand::CreateHabit {
                title,
                description,
                frequency,
                reply,
            } => {
                let result = self
                    .ledger
                    .create_habit(&title, &description, frequency, now)
                    .await;
                let _ = reply.send(result);
            }
            LedgerCommand::DeleteHabit { id } => self.ledger.delete_habit(id).await,
            LedgerCommand::CompleteHabit { id } => {
                if let Err(e) = self.ledger.complete_habit(id, now).await {
                    tracing::warn!(id, error = %e, "complete habit failed");
                }
            }
            LedgerCommand::Refresh => {
                self.ledger.load_habits().await;
                self.ledger.load_completions().await;
            }
            LedgerCommand::ReconcileStreaks => self.ledger.reconcile_streak_counts(now).await,
            LedgerCommand::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(LedgerSnapshot {
            habits: self.ledger.habits().to_vec(),
            completions: self.ledger.completions().to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn wait_for<F>(snapshots: &mut watch::Receiver<LedgerSnapshot>, mut predicate: F)
    where
        F: FnMut(&LedgerSnapshot) -> bool,
    {
        loop {
            if predicate(&snapshots.borrow()) {
                return;
            }
            snapshots.changed().await.expect("runtime stopped early");
        }
    }

    #[tokio::test]
    async fn created_habit_round_trips_through_the_feed() {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let store = Arc::new(MemoryStore::new());
        store.set_feed(feed_tx);

        let runtime = SyncRuntime::new(store.clone(), "user-1", feed_rx);
        let handle = runtime.handle();
        let mut snapshots = runtime.snapshots();
        let task = tokio::spawn(runtime.run());

        handle
            .create_habit("Read", "20 pages", Some(Frequency::Daily))
            .await
            .unwrap();
        wait_for(&mut snapshots, |s| !s.habits.is_empty()).await;
        assert_eq!(snapshots.borrow().habits[0].title, "Read");

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn completion_echo_reaches_the_mirror() {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let store = Arc::new(MemoryStore::new());
        store.set_feed(feed_tx);

        let runtime = SyncRuntime::new(store.clone(), "user-1", feed_rx);
        let handle = runtime.handle();
        let mut snapshots = runtime.snapshots();
        let task = tokio::spawn(runtime.run());

        handle
            .create_habit("Read", "20 pages", Some(Frequency::Daily))
            .await
            .unwrap();
        wait_for(&mut snapshots, |s| !s.habits.is_empty()).await;
        let id = snapshots.borrow().habits[0].id;

        handle.complete_habit(id).unwrap();
        wait_for(&mut snapshots, |s| !s.completions.is_empty()).await;
        assert_eq!(snapshots.borrow().completions[0].id, id);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_create_reports_back_through_the_handle() {
        let (_feed_tx, feed_rx) = mpsc::unbounded_channel();
        let store = Arc::new(MemoryStore::new());
        let runtime = SyncRuntime::new(store, "user-1", feed_rx);
        let handle = runtime.handle();
        let task = tokio::spawn(runtime.run());

        let err = handle.create_habit("", "desc", Some(Frequency::Daily)).await;
        assert!(matches!(err, Err(CoreError::Validation("title"))));

        handle.shutdown();
        task.await.unwrap();
    }
}
