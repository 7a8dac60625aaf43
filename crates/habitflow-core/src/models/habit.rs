use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recurrence frequency of a habit. Stored lowercase in the `habits` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

pub const FREQUENCIES: [Frequency; 3] = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly];

impl Frequency {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// A row of the `habits` table.
///
/// `streak_count` is a store-persisted cache of the current streak. It is
/// bumped on completion but may drift from the value the streak analyzer
/// derives from the completion history; see `HabitLedger::reconcile_streak_counts`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub streak_count: i64,
    pub last_completed: DateTime<Utc>,
    pub frequency: Frequency,
}

/// Insert payload for a new habit; the store assigns the id.
#[derive(Clone, Debug, Serialize)]
pub struct NewHabit {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub streak_count: i64,
    pub last_completed: DateTime<Utc>,
    pub frequency: Frequency,
}

/// Partial update applied after a completion (or by the reconciliation pass).
#[derive(Clone, Debug, Serialize)]
pub struct HabitPatch {
    pub streak_count: i64,
    pub last_completed: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_round_trips_lowercase() {
        let json = serde_json::to_string(&Frequency::Weekly).unwrap();
        assert_eq!(json, "\"weekly\"");
        let parsed: Frequency = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(parsed, Frequency::Monthly);
    }

    #[test]
    fn habit_row_deserializes() {
        let json = r#"{
            "id": 7,
            "user_id": "user-1",
            "title": "Read",
            "description": "20 pages",
            "streak_count": 3,
            "last_completed": "2024-03-01T08:30:00Z",
            "frequency": "daily"
        }"#;
        let habit: Habit = serde_json::from_str(json).unwrap();
        assert_eq!(habit.id, 7);
        assert_eq!(habit.frequency, Frequency::Daily);
        assert_eq!(habit.streak_count, 3);
    }
}
