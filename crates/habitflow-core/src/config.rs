use crate::error::{CoreError, Result};

/// Connection settings for the hosted backend (REST, auth and realtime all
/// hang off the same project URL).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    /// Read `SUPABASE_URL` / `SUPABASE_ANON_KEY` from the environment.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| CoreError::Config("SUPABASE_URL is not set".to_string()))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| CoreError::Config("SUPABASE_ANON_KEY is not set".to_string()))?;
        Ok(Self::new(url, anon_key))
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.url)
    }

    /// Websocket endpoint for the change feed. `https` becomes `wss`.
    pub fn realtime_url(&self) -> String {
        let ws_base = self.url.replacen("http", "ws", 1);
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.anon_key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        let config = BackendConfig::new("https://proj.supabase.co/", "key");
        assert_eq!(config.rest_url(), "https://proj.supabase.co/rest/v1");
    }

    #[test]
    fn realtime_url_upgrades_scheme() {
        let config = BackendConfig::new("https://proj.supabase.co", "key");
        assert_eq!(
            config.realtime_url(),
            "wss://proj.supabase.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
    }
}
