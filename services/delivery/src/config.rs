use std::time::Duration;

use serde::Deserialize;

use campus_core::config::Config;

use crate::domain::types::DEFAULT_BATCH_SIZE;

/// Delivery service configuration, read from environment variables.
#[derive(Debug, Deserialize)]
pub struct DeliveryConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port to listen on. Env var: `DELIVERY_PORT`.
    #[serde(default = "default_port")]
    pub delivery_port: u16,
    /// Shared secret the scheduler sends in `x-campus-worker-token`.
    pub worker_token: String,
    /// Identity provider admin API base URL (e.g. "http://idp:8080/admin").
    pub account_directory_url: String,
    pub account_directory_token: String,
    /// Object store base URL artifacts are `PUT` under.
    pub object_store_url: String,
    #[serde(default)]
    pub object_store_token: Option<String>,
    /// Events claimed per worker invocation. Env var: `OUTBOX_BATCH_SIZE`.
    #[serde(default = "default_batch_size")]
    pub outbox_batch_size: u32,
    /// Reclaim events stuck in `processing` for longer than this. Unset disables it.
    #[serde(default)]
    pub claim_lease_secs: Option<i32>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// How long a losing reservation request waits for the winner.
    #[serde(default = "default_artifact_wait_ms")]
    pub artifact_wait_ms: u64,
    #[serde(default = "default_artifact_poll_ms")]
    pub artifact_poll_ms: u64,
}

impl Config for DeliveryConfig {}

fn default_port() -> u16 {
    3120
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_artifact_wait_ms() -> u64 {
    10_000
}

fn default_artifact_poll_ms() -> u64 {
    250
}

impl DeliveryConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn artifact_wait(&self) -> Duration {
        Duration::from_millis(self.artifact_wait_ms)
    }

    pub fn artifact_poll(&self) -> Duration {
        Duration::from_millis(self.artifact_poll_ms)
    }
}
