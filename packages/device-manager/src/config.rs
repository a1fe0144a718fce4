use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use command_log::{DEFAULT_COMPLETION_SUBJECT, MIN_SEND_ATTEMPTS};

use crate::common::DEFAULT_ID_NAMESPACE;
use crate::kernel::DEFAULT_SYNC_WAIT_HANDLER;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub nats_url: String,
    pub device_repository_url: String,
    pub permissions_url: String,
    pub id_namespace: String,
    /// Partitions created for each topic that does not exist yet.
    pub topic_partitions: u32,
    /// Never below [`MIN_SEND_ATTEMPTS`].
    pub publish_send_attempts: u32,
    pub completion_subject: String,
    pub sync_wait_timeout: Duration,
    pub sync_wait_handlers: Vec<String>,
    pub collaborator_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment, test maps).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            port: or("PORT", "8080")
                .parse()
                .context("PORT must be a valid number")?,
            nats_url: or("NATS_URL", "nats://localhost:4222"),
            device_repository_url: lookup("DEVICE_REPOSITORY_URL")
                .context("DEVICE_REPOSITORY_URL must be set")?,
            permissions_url: lookup("PERMISSIONS_URL").context("PERMISSIONS_URL must be set")?,
            id_namespace: or("ID_NAMESPACE", DEFAULT_ID_NAMESPACE),
            topic_partitions: or("TOPIC_PARTITIONS", "1")
                .parse::<u32>()
                .context("TOPIC_PARTITIONS must be a valid number")?
                .max(1),
            publish_send_attempts: or("PUBLISH_SEND_ATTEMPTS", "10")
                .parse::<u32>()
                .context("PUBLISH_SEND_ATTEMPTS must be a valid number")?
                .max(MIN_SEND_ATTEMPTS),
            completion_subject: or("COMPLETION_SUBJECT", DEFAULT_COMPLETION_SUBJECT),
            sync_wait_timeout: Duration::from_secs(
                or("SYNC_WAIT_TIMEOUT_SECS", "30")
                    .parse()
                    .context("SYNC_WAIT_TIMEOUT_SECS must be a valid number")?,
            ),
            sync_wait_handlers: or("SYNC_WAIT_HANDLERS", DEFAULT_SYNC_WAIT_HANDLER)
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect(),
            collaborator_timeout: Duration::from_secs(
                or("COLLABORATOR_TIMEOUT_SECS", "10")
                    .parse()
                    .context("COLLABORATOR_TIMEOUT_SECS must be a valid number")?,
            ),
        })
    }
}
