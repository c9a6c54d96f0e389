//! `reqwest`-backed [`CommandHttp`] implementation.
//!
//! # Examples
//!
//! ```
//! use chord_state::http::{RestClient, RestConfig};
//!
//! let client = RestClient::new(RestConfig {
//!     token: "token".into(),
//!     application_id: 1,
//!     max_retries: 5,
//!     ..Default::default()
//! })
//! .unwrap();
//! assert_eq!(client.config().max_retries, 5);
//! ```

use super::{utils, CommandHttp};
use crate::error::{Result, StateError};
use crate::model::Snowflake;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// REST client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// API root, including the version segment
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bot token sent as `Authorization: Bot <token>`
    #[serde(default)]
    pub token: String,

    /// Application whose commands are managed
    #[serde(default)]
    pub application_id: Snowflake,

    /// Retries after the first attempt for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Log retries at `warn`
    #[serde(default = "default_enable_logging")]
    pub enable_logging: bool,
}

fn default_base_url() -> String {
    "https://discord.com/api/v10".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_enable_logging() -> bool {
    true
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            application_id: 0,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            enable_logging: default_enable_logging(),
        }
    }
}

/// Command endpoints over HTTPS with retry and backoff.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base: Arc<str>,
    config: Arc<RestConfig>,
}

impl RestClient {
    /// Build a client. Fails when the base URL does not parse.
    pub fn new(config: RestConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(StateError::Config(format!(
                "base_url `{}` cannot be a base URL",
                config.base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            client,
            base: base.as_str().trim_end_matches('/').into(),
            config: Arc::new(config),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn commands_url(&self, guild_id: Option<Snowflake>) -> String {
        let app = self.config.application_id;
        match guild_id {
            Some(guild_id) => format!("{}/applications/{app}/guilds/{guild_id}/commands", self.base),
            None => format!("{}/applications/{app}/commands", self.base),
        }
    }

    async fn request_with_retries(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let mut attempt = 0;
        loop {
            match self.request(method.clone(), url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = utils::exponential_backoff(attempt, self.config.retry_delay_ms);
                    if self.config.enable_logging {
                        tracing::warn!(
                            "Request failed (attempt {}), retrying after {:?}: {}",
                            attempt + 1,
                            delay,
                            e
                        );
                    }
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let mut req_builder = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.config.token));
        if let Some(body) = body {
            req_builder = req_builder.json(body);
        }

        let response = req_builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(utils::status_error(status, text));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn get_list(&self, url: &str) -> Result<Vec<Value>> {
        match self.request_with_retries(reqwest::Method::GET, url, None).await? {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(StateError::Api {
                status: 200,
                message: "expected a JSON array".into(),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Value> {
        self.request_with_retries(reqwest::Method::POST, url, Some(payload))
            .await?
            .ok_or_else(|| StateError::Api {
                status: 200,
                message: "empty upsert response".into(),
            })
    }
}

#[async_trait]
impl CommandHttp for RestClient {
    async fn get_global_commands(&self) -> Result<Vec<Value>> {
        self.get_list(&self.commands_url(None)).await
    }

    async fn get_guild_commands(&self, guild_id: Snowflake) -> Result<Vec<Value>> {
        self.get_list(&self.commands_url(Some(guild_id))).await
    }

    async fn upsert_global_command(&self, payload: &Value) -> Result<Value> {
        self.post(&self.commands_url(None), payload).await
    }

    async fn upsert_guild_command(&self, guild_id: Snowflake, payload: &Value) -> Result<Value> {
        self.post(&self.commands_url(Some(guild_id)), payload).await
    }

    async fn delete_global_command(&self, command_id: Snowflake) -> Result<()> {
        let url = format!("{}/{command_id}", self.commands_url(None));
        self.request_with_retries(reqwest::Method::DELETE, &url, None)
            .await
            .map(|_| ())
    }

    async fn delete_guild_command(&self, guild_id: Snowflake, command_id: Snowflake) -> Result<()> {
        let url = format!("{}/{command_id}", self.commands_url(Some(guild_id)));
        self.request_with_retries(reqwest::Method::DELETE, &url, None)
            .await
            .map(|_| ())
    }
}
