use chrono::{DateTime, Local, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of the `habit_completed` table.
///
/// `id` is the id of the habit it completes: the table holds at most one row
/// per habit, overwritten on each completion. The "history" the streak
/// analyzer sees is therefore whatever rows the mirror currently holds, not
/// an append-only log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    pub id: i64,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Start of the local calendar day containing `now`, in UTC.
///
/// "Today" is always recomputed from wall-clock time at the point of query,
/// so the completed-today view rolls over at local midnight without any
/// explicit transition.
pub fn local_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    local
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or(local)
        .with_timezone(&Utc)
}
