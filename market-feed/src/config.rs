use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_project_url")]
    pub project_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Access token of the account the daemon reads as. Anonymous when unset.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_realtime")]
    pub realtime: bool,
}

fn default_port() -> u16 { 3010 }
fn default_project_url() -> String { "http://localhost:54321".into() }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_realtime() -> bool { true }

impl FeedConfig {
    /// `.env` first, then `MARKET_FEED__*` variables.
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MARKET_FEED").separator("__"))
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> anyhow::Result<Self> {
        Ok(config.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
