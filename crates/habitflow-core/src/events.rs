use crate::models::{Completion, Habit};

/// A single row-level change delivered by the feed.
///
/// Deletes carry only the old row's id: the store publishes just the
/// replica-identity columns for deleted rows.
#[derive(Clone, Debug)]
pub enum RowChange<T> {
    Insert(T),
    Update(T),
    Delete { id: i64 },
}

impl<T> RowChange<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Typed change-feed message, one per affected record.
///
/// The only ordering guarantee is per-record; events across records may be
/// reordered and duplicates may arrive, so applying them must be idempotent.
#[derive(Clone, Debug)]
pub enum ChangeEvent {
    Habit(RowChange<Habit>),
    Completion(RowChange<Completion>),
}
