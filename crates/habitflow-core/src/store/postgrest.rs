use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::BackendConfig;
use crate::error::{CoreError, Result};
use crate::models::{Completion, Habit, HabitPatch, NewHabit, UserProfile};
use crate::store::HabitStore;

/// REST client for the hosted store.
///
/// Every table sits under `{url}/rest/v1/`; requests carry the project's
/// anon key plus the signed-in user's bearer token, and row filters use the
/// `column=op.value` query syntax.
pub struct SupabaseStore {
    config: BackendConfig,
    access_token: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(config: BackendConfig, access_token: impl Into<String>) -> Self {
        Self {
            config,
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.config.rest_url(), table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", self.access_token))
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(CoreError::Api { status, body })
    }
}

#[async_trait]
impl HabitStore for SupabaseStore {
    async fn habits_for(&self, owner: &str) -> Result<Vec<Habit>> {
        let owner_filter = format!("eq.{owner}");
        let response = self
            .authed(self.client.get(self.table_url("habits")))
            .query(&[("select", "*"), ("user_id", owner_filter.as_str())])
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn completions_for(&self, owner: &str) -> Result<Vec<Completion>> {
        let owner_filter = format!("eq.{owner}");
        let response = self
            .authed(self.client.get(self.table_url("habit_completed")))
            .query(&[("select", "*"), ("user_id", owner_filter.as_str())])
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn completions_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Completion>> {
        let owner_filter = format!("eq.{owner}");
        let since_filter = format!("gt.{}", since.to_rfc3339_opts(SecondsFormat::Millis, true));
        let response = self
            .authed(self.client.get(self.table_url("habit_completed")))
            .query(&[
                ("select", "*"),
                ("user_id", owner_filter.as_str()),
                ("completed_at", since_filter.as_str()),
            ])
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn insert_habit(&self, habit: NewHabit) -> Result<Habit> {
        let response = self
            .authed(self.client.post(self.table_url("habits")))
            .header("Prefer", "return=representation")
            .json(&habit)
            .send()
            .await?;
        let rows: Vec<Habit> = Self::expect_success(response).await?.json().await?;
        rows.into_iter().next().ok_or_else(|| CoreError::Api {
            status: 200,
            body: "insert returned no rows".to_string(),
        })
    }

    async fn update_habit(&self, id: i64, patch: HabitPatch) -> Result<()> {
        let id_filter = format!("eq.{id}");
        let response = self
            .authed(self.client.patch(self.table_url("habits")))
            .query(&[("id", id_filter.as_str())])
            .json(&patch)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn delete_habit(&self, id: i64) -> Result<()> {
        let id_filter = format!("eq.{id}");
        let response = self
            .authed(self.client.delete(self.table_url("habits")))
            .query(&[("id", id_filter.as_str())])
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn upsert_completion(&self, completion: Completion) -> Result<()> {
        // One row per habit id: a repeat completion replaces the old row.
        let response = self
            .authed(self.client.post(self.table_url("habit_completed")))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&completion)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn profile_for(&self, owner: &str) -> Result<Option<UserProfile>> {
        let owner_filter = format!("eq.{owner}");
        let response = self
            .authed(self.client.get(self.table_url("userProfile")))
            .query(&[("select", "*"), ("user_id", owner_filter.as_str())])
            .send()
            .await?;
        let rows: Vec<UserProfile> = Self::expect_success(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn create_profile(&self, profile: UserProfile) -> Result<()> {
        let response = self
            .authed(self.client.post(self.table_url("userProfile")))
            .json(&profile)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}
