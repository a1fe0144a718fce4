//! Envelope-level handler for downstream services.
//!
//! [`SignalingHandler`] turns a raw [`LogRecord`] into a decoded
//! [`CommandEnvelope`], hands it to a [`CommandApplier`], and after a
//! successful apply publishes the handler's [`CompletionSignal`].
//!
//! Any failure (undecodable record, apply error, signal publish error) is
//! returned to the consumer, which retries the whole record. Appliers must
//! therefore be idempotent: applying the same PUT or DELETE again is a no-op.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::command::CommandEnvelope;
use crate::consumer::RecordHandler;
use crate::log::LogRecord;
use crate::signal::{CompletionSignal, SignalSink};

/// Applies decoded commands for one downstream system.
#[async_trait]
pub trait CommandApplier: Send + Sync {
    /// Apply `envelope` read from the topic of `kind`.
    async fn apply(
        &self,
        kind: &str,
        envelope: &CommandEnvelope<serde_json::Value>,
    ) -> anyhow::Result<()>;
}

/// Decode, apply, then confirm.
pub struct SignalingHandler {
    handler_name: String,
    applier: Arc<dyn CommandApplier>,
    sink: Arc<dyn SignalSink>,
}

impl SignalingHandler {
    pub fn new(
        handler_name: impl Into<String>,
        applier: Arc<dyn CommandApplier>,
        sink: Arc<dyn SignalSink>,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            applier,
            sink,
        }
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }
}

#[async_trait]
impl RecordHandler for SignalingHandler {
    async fn handle(&self, record: &LogRecord) -> anyhow::Result<()> {
        let envelope = CommandEnvelope::decode(&record.value).with_context(|| {
            format!(
                "undecodable command at `{}`[{}] offset {}",
                record.topic, record.partition, record.offset
            )
        })?;

        self.applier.apply(&record.topic, &envelope).await?;

        self.sink
            .signal(&CompletionSignal {
                resource_kind: record.topic.clone(),
                resource_id: envelope.id.clone(),
                command: envelope.command,
                handler: self.handler_name.clone(),
            })
            .await
            .context("failed to publish completion signal")?;
        Ok(())
    }
}
