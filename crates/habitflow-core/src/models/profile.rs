use serde::{Deserialize, Serialize};

/// A row of the `userProfile` table, created at sign-up.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
}
