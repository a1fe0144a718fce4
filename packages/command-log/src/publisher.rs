//! Command publisher.
//!
//! Wraps an entity (or a deletion) in a [`CommandEnvelope`] and appends it to the
//! topic of its kind, keyed by entity id. Envelope construction errors are
//! returned before any I/O; transient send failures are retried a bounded
//! number of times.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::command::{Command, CommandEnvelope};
use crate::error::PublishError;
use crate::log::LogProducer;

/// Lower bound on send attempts per publish.
pub const MIN_SEND_ATTEMPTS: u32 = 10;

/// Configuration for the command publisher.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Attempts per publish, clamped to at least [`MIN_SEND_ATTEMPTS`].
    pub send_attempts: u32,
    /// Delay after the first failed attempt; grows linearly per attempt.
    pub retry_backoff: Duration,
    /// Kinds whose commands must name an owner.
    pub owner_scoped_kinds: HashSet<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            send_attempts: MIN_SEND_ATTEMPTS,
            retry_backoff: Duration::from_millis(100),
            owner_scoped_kinds: HashSet::new(),
        }
    }
}

impl PublisherConfig {
    /// Mark `kinds` as owner-scoped.
    pub fn with_owner_scoped<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owner_scoped_kinds.extend(kinds.into_iter().map(Into::into));
        self
    }
}

/// Appends command envelopes to the log. Cheap to clone.
#[derive(Clone)]
pub struct CommandPublisher {
    producer: Arc<dyn LogProducer>,
    config: Arc<PublisherConfig>,
}

impl CommandPublisher {
    pub fn new(producer: Arc<dyn LogProducer>, config: PublisherConfig) -> Self {
        Self {
            producer,
            config: Arc::new(config),
        }
    }

    /// Whether commands for `kind` must carry an owner.
    pub fn is_owner_scoped(&self, kind: &str) -> bool {
        self.config.owner_scoped_kinds.contains(kind)
    }

    /// Publish one command for `kind`.
    ///
    /// Appends exactly one record to the `kind` topic keyed by `id`. The caller
    /// must treat any error as "not written".
    pub async fn publish<T: Serialize>(
        &self,
        kind: &str,
        command: Command,
        id: &str,
        owner: Option<&str>,
        payload: Option<&T>,
    ) -> Result<(), PublishError> {
        let envelope = CommandEnvelope::new(
            kind,
            command,
            id,
            owner.map(str::to_string),
            payload,
            self.is_owner_scoped(kind),
        )?;
        let value = Bytes::from(envelope.encode()?);

        self.send_with_retry(kind, id, value).await?;
        debug!(topic = %kind, id = %id, command = %command, "command published");
        Ok(())
    }

    /// Publish a PUT of `payload`.
    pub async fn put<T: Serialize>(
        &self,
        kind: &str,
        id: &str,
        owner: Option<&str>,
        payload: &T,
    ) -> Result<(), PublishError> {
        self.publish(kind, Command::Put, id, owner, Some(payload))
            .await
    }

    /// Publish a DELETE of `id`.
    pub async fn delete(
        &self,
        kind: &str,
        id: &str,
        owner: Option<&str>,
    ) -> Result<(), PublishError> {
        self.publish::<()>(kind, Command::Delete, id, owner, None)
            .await
    }

    async fn send_with_retry(
        &self,
        topic: &str,
        key: &str,
        value: Bytes,
    ) -> Result<(), PublishError> {
        let attempts = self.config.send_attempts.max(MIN_SEND_ATTEMPTS);
        let mut attempt = 1;
        loop {
            match self.producer.send(topic, key, value.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => {
                    return Err(PublishError::SendFailed {
                        topic: topic.to_string(),
                        attempts,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(topic = %topic, key = %key, attempt, error = %e, "send failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}
