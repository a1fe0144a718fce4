//! NATS backends.
//!
//! - [`JetStreamLog`]: one JetStream stream per topic, one subject per
//!   partition (`{topic}.{partition}`), one durable pull consumer per
//!   (group, partition) with explicit, double-acknowledged commits.
//! - [`NatsSignals`]: completion signals as JSON on a core NATS subject.
//!
//! The partition key travels in the `Partition-Key` header; the value is the
//! raw envelope bytes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, consumer::DeliverPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::LogError;
use crate::log::{partition_for, LogAdmin, LogProducer, LogRecord, LogSource, PartitionReader};
use crate::signal::{CompletionSignal, SignalSink};

/// Header carrying the record key.
pub const PARTITION_KEY_HEADER: &str = "Partition-Key";

/// JetStream tuning.
#[derive(Debug, Clone)]
pub struct JetStreamConfig {
    /// How long the server waits for a commit before redelivering. Must exceed
    /// the consumer retry budget, otherwise a record being retried is
    /// redelivered behind itself.
    pub ack_wait: Duration,
    /// Maximum age of retained records. `None` keeps everything.
    pub max_age: Option<Duration>,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(600),
            max_age: None,
        }
    }
}

/// JetStream-backed log.
pub struct JetStreamLog {
    context: jetstream::Context,
    config: JetStreamConfig,
    partitions: Mutex<HashMap<String, u32>>,
}

fn stream_name(topic: &str) -> String {
    topic
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

fn partition_subject(topic: &str, partition: u32) -> String {
    format!("{topic}.{partition}")
}

impl JetStreamLog {
    pub fn new(client: async_nats::Client, config: JetStreamConfig) -> Self {
        Self {
            context: jetstream::new(client),
            config,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    async fn cached_partition_count(&self, topic: &str) -> Result<u32, LogError> {
        let cached = self
            .partitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .copied();
        match cached {
            Some(count) => Ok(count),
            None => self.partition_count(topic).await,
        }
    }
}

#[async_trait]
impl LogProducer for JetStreamLog {
    async fn send(&self, topic: &str, key: &str, value: Bytes) -> Result<(), LogError> {
        let partitions = self.cached_partition_count(topic).await?;
        let subject = partition_subject(topic, partition_for(key, partitions));

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(PARTITION_KEY_HEADER, key);

        let ack = self
            .context
            .publish_with_headers(subject, headers, value)
            .await
            .map_err(LogError::transport)?;
        ack.await.map_err(LogError::transport)?;
        Ok(())
    }
}

#[async_trait]
impl LogAdmin for JetStreamLog {
    async fn ensure_topic(&self, topic: &str, partitions: u32) -> Result<(), LogError> {
        let partitions = partitions.max(1);
        let mut config = jetstream::stream::Config {
            name: stream_name(topic),
            subjects: (0..partitions)
                .map(|p| partition_subject(topic, p))
                .collect(),
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        };
        if let Some(max_age) = self.config.max_age {
            config.max_age = max_age;
        }

        self.context
            .get_or_create_stream(config)
            .await
            .map_err(LogError::transport)?;
        info!(topic = %topic, partitions, "topic ready");
        Ok(())
    }

    async fn partition_count(&self, topic: &str) -> Result<u32, LogError> {
        let mut stream = self
            .context
            .get_stream(stream_name(topic))
            .await
            .map_err(|_| LogError::UnknownTopic(topic.to_string()))?;
        let info = stream.info().await.map_err(LogError::transport)?;
        let count = info.config.subjects.len().max(1) as u32;

        self.partitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(topic.to_string(), count);
        Ok(count)
    }
}

#[async_trait]
impl LogSource for JetStreamLog {
    async fn open(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<Box<dyn PartitionReader>, LogError> {
        let stream = self
            .context
            .get_stream(stream_name(topic))
            .await
            .map_err(|_| LogError::UnknownTopic(topic.to_string()))?;

        let durable = format!("{}-{partition}", stream_name(group));
        let consumer = stream
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: partition_subject(topic, partition),
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy: DeliverPolicy::All,
                    ack_wait: self.config.ack_wait,
                    max_ack_pending: 1,
                    ..Default::default()
                },
            )
            .await
            .map_err(LogError::transport)?;

        let messages = consumer.messages().await.map_err(LogError::transport)?;
        debug!(topic = %topic, partition, consumer = %durable, "read session opened");

        Ok(Box::new(JetStreamReader {
            topic: topic.to_string(),
            partition,
            messages,
            pending: None,
            last_committed: None,
        }))
    }
}

struct JetStreamReader {
    topic: String,
    partition: u32,
    messages: pull::Stream,
    pending: Option<(u64, jetstream::Message)>,
    last_committed: Option<u64>,
}

#[async_trait]
impl PartitionReader for JetStreamReader {
    async fn fetch(&mut self) -> Result<LogRecord, LogError> {
        loop {
            let message = match self.messages.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(LogError::transport(e)),
                None => return Err(LogError::Closed),
            };
            let sequence = message.info().map_err(LogError::transport)?.stream_sequence;

            // A redelivery of something already committed.
            if self.last_committed.is_some_and(|last| sequence <= last) {
                debug!(topic = %self.topic, partition = self.partition, sequence, "skipping committed redelivery");
                if let Err(e) = message.ack().await {
                    warn!(topic = %self.topic, sequence, error = %e, "failed to ack redelivery");
                }
                continue;
            }

            let key = message
                .headers
                .as_ref()
                .and_then(|h| h.get(PARTITION_KEY_HEADER))
                .map(|v| v.as_str().to_string())
                .unwrap_or_default();
            let record = LogRecord {
                topic: self.topic.clone(),
                partition: self.partition,
                offset: sequence,
                key,
                value: message.payload.clone(),
            };
            self.pending = Some((sequence, message));
            return Ok(record);
        }
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let (sequence, message) = self.pending.take().ok_or(LogError::CommitOutOfOrder {
            expected: self.last_committed.map_or(0, |s| s + 1),
            actual: record.offset,
        })?;
        if sequence != record.offset {
            let expected = sequence;
            self.pending = Some((sequence, message));
            return Err(LogError::CommitOutOfOrder {
                expected,
                actual: record.offset,
            });
        }

        message.double_ack().await.map_err(LogError::transport)?;
        self.last_committed = Some(sequence);
        Ok(())
    }
}

/// Completion signals over core NATS.
#[derive(Clone)]
pub struct NatsSignals {
    client: async_nats::Client,
    subject: String,
}

impl NatsSignals {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }

    /// Subscribe to every signal published from now on.
    ///
    /// Malformed messages are logged and skipped.
    pub async fn subscribe(
        &self,
    ) -> Result<impl Stream<Item = CompletionSignal> + Send + 'static, LogError> {
        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(LogError::transport)?;
        info!(subject = %self.subject, "subscribed to completion signals");

        Ok(subscriber.filter_map(|message| async move {
            match serde_json::from_slice::<CompletionSignal>(&message.payload) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    warn!(subject = %message.subject, error = %e, "malformed completion signal");
                    None
                }
            }
        }))
    }
}

#[async_trait]
impl SignalSink for NatsSignals {
    async fn signal(&self, signal: &CompletionSignal) -> Result<(), LogError> {
        let payload = serde_json::to_vec(signal).map_err(LogError::transport)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(LogError::transport)
    }
}
