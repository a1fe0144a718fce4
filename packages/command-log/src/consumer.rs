//! Log consumer workers.
//!
//! One worker per topic partition. Each worker runs the loop
//!
//! ```text
//! Idle ─► Fetching ─► Applying ─┬─► Committing ─► Idle
//!                               │
//!                               └─► Retrying ─► Applying …
//!
//! cancellation ─► Stopped
//! ```
//!
//! - A record is committed only after its handler succeeded, one record at a
//!   time. A crash between apply and commit redelivers that record, so handlers
//!   must be idempotent.
//! - Handler failures are retried with non-decreasing backoff until a wall-clock
//!   budget runs out. The worker then stops **without committing** and reports
//!   [`ConsumerError::RetryBudgetExhausted`]. The partition stays blocked until an
//!   operator intervenes; commands are never dropped silently.
//! - Cancellation stops fetching. An apply that already started runs to success
//!   or budget exhaustion first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConsumerError, LogError};
use crate::log::{LogRecord, LogSource, PartitionReader};

/// Applies one raw log record.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, record: &LogRecord) -> anyhow::Result<()>;
}

/// Backoff and budget for handler retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wait after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound for a single wait.
    pub max_backoff: Duration,
    /// Total wall-clock time a record may spend failing before the worker gives up.
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            budget: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based). Doubles per attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Fetching,
    Applying,
    Retrying { attempt: u32 },
    Committing,
    Stopped,
}

/// Consumer worker for a single topic partition.
pub struct PartitionWorker {
    source: Arc<dyn LogSource>,
    group: String,
    topic: String,
    partition: u32,
    handler: Arc<dyn RecordHandler>,
    retry: RetryPolicy,
    state: watch::Sender<ConsumerState>,
}

impl PartitionWorker {
    pub fn new(
        source: Arc<dyn LogSource>,
        group: impl Into<String>,
        topic: impl Into<String>,
        partition: u32,
        handler: Arc<dyn RecordHandler>,
        retry: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            source,
            group: group.into(),
            topic: topic.into(),
            partition,
            handler,
            retry,
            state,
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Run until cancelled or a fatal error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        info!(topic = %self.topic, partition = self.partition, group = %self.group, "consumer starting");
        let result = self.consume(&shutdown).await;
        self.transition(ConsumerState::Stopped);
        match &result {
            Ok(()) => info!(topic = %self.topic, partition = self.partition, "consumer stopped"),
            Err(e) => error!(topic = %self.topic, partition = self.partition, error = %e, "consumer stopped on fatal error"),
        }
        result
    }

    async fn consume(&self, shutdown: &CancellationToken) -> Result<(), ConsumerError> {
        let mut reader = self
            .source
            .open(&self.group, &self.topic, self.partition)
            .await
            .map_err(|e| self.log_error(e))?;

        loop {
            self.transition(ConsumerState::Idle);
            if shutdown.is_cancelled() {
                return Ok(());
            }

            self.transition(ConsumerState::Fetching);
            let record = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                fetched = reader.fetch() => fetched.map_err(|e| self.log_error(e))?,
            };

            self.apply(&record).await?;
            self.commit(reader.as_mut(), &record).await?;
        }
    }

    async fn apply(&self, record: &LogRecord) -> Result<(), ConsumerError> {
        self.transition(ConsumerState::Applying);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let err = match self.handler.handle(record).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            attempt += 1;

            let elapsed = started.elapsed();
            if elapsed >= self.retry.budget {
                return Err(ConsumerError::RetryBudgetExhausted {
                    topic: self.topic.clone(),
                    partition: self.partition,
                    offset: record.offset,
                    attempts: attempt,
                    budget: self.retry.budget,
                    source: err,
                });
            }

            let wait = self.retry.backoff(attempt).min(self.retry.budget - elapsed);
            warn!(
                topic = %self.topic,
                partition = self.partition,
                offset = record.offset,
                key = %record.key,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "handler failed, retrying"
            );
            self.transition(ConsumerState::Retrying { attempt });
            tokio::time::sleep(wait).await;
            self.transition(ConsumerState::Applying);
        }
    }

    async fn commit(
        &self,
        reader: &mut dyn PartitionReader,
        record: &LogRecord,
    ) -> Result<(), ConsumerError> {
        self.transition(ConsumerState::Committing);
        reader
            .commit(record)
            .await
            .map_err(|e| self.log_error(e))?;
        debug!(topic = %self.topic, partition = self.partition, offset = record.offset, "record committed");
        Ok(())
    }

    fn transition(&self, next: ConsumerState) {
        self.state.send_replace(next);
    }

    fn log_error(&self, source: LogError) -> ConsumerError {
        ConsumerError::Log {
            topic: self.topic.clone(),
            partition: self.partition,
            source,
        }
    }
}

/// Configuration shared by every worker of a [`ConsumerSet`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group; offsets are tracked per group.
    pub group: String,
    /// Partitions to create when a subscribed topic does not exist yet.
    pub partitions: u32,
    pub retry: RetryPolicy,
}

impl ConsumerConfig {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            partitions: 1,
            retry: RetryPolicy::default(),
        }
    }
}

/// Builds a [`ConsumerSet`] from topic subscriptions.
pub struct ConsumerBuilder {
    source: Arc<dyn LogSource>,
    config: ConsumerConfig,
    subscriptions: Vec<(String, Arc<dyn RecordHandler>)>,
}

impl ConsumerBuilder {
    pub fn new(source: Arc<dyn LogSource>, config: ConsumerConfig) -> Self {
        Self {
            source,
            config,
            subscriptions: Vec::new(),
        }
    }

    /// Consume every partition of `topic` with `handler`.
    pub fn subscribe(mut self, topic: impl Into<String>, handler: Arc<dyn RecordHandler>) -> Self {
        self.subscriptions.push((topic.into(), handler));
        self
    }

    /// Ensure every topic exists, then spawn one worker per partition.
    ///
    /// Cancelling `parent` stops the set; [`ConsumerSet::shutdown`] stops only
    /// this set and leaves `parent` alone.
    pub async fn start(self, parent: CancellationToken) -> Result<ConsumerSet, ConsumerError> {
        let shutdown = parent.child_token();
        let mut tasks = JoinSet::new();
        let mut states = Vec::new();

        for (topic, handler) in self.subscriptions {
            let setup_error = |source| ConsumerError::Log {
                topic: topic.clone(),
                partition: 0,
                source,
            };
            self.source
                .ensure_topic(&topic, self.config.partitions)
                .await
                .map_err(setup_error)?;
            let partitions = self
                .source
                .partition_count(&topic)
                .await
                .map_err(setup_error)?;

            for partition in 0..partitions {
                let worker = PartitionWorker::new(
                    self.source.clone(),
                    self.config.group.clone(),
                    topic.clone(),
                    partition,
                    handler.clone(),
                    self.config.retry.clone(),
                );
                states.push((topic.clone(), partition, worker.state()));
                tasks.spawn(worker.run(shutdown.child_token()));
            }
        }

        Ok(ConsumerSet {
            tasks,
            shutdown,
            states,
        })
    }
}

/// Running partition workers.
pub struct ConsumerSet {
    tasks: JoinSet<Result<(), ConsumerError>>,
    shutdown: CancellationToken,
    states: Vec<(String, u32, watch::Receiver<ConsumerState>)>,
}

impl ConsumerSet {
    /// Number of workers started.
    pub fn worker_count(&self) -> usize {
        self.states.len()
    }

    /// Current state of the worker for `topic`/`partition`.
    pub fn state(&self, topic: &str, partition: u32) -> Option<ConsumerState> {
        self.states
            .iter()
            .find(|(t, p, _)| t == topic && *p == partition)
            .map(|(_, _, rx)| *rx.borrow())
    }

    /// Watch the worker for `topic`/`partition`.
    pub fn watch(&self, topic: &str, partition: u32) -> Option<watch::Receiver<ConsumerState>> {
        self.states
            .iter()
            .find(|(t, p, _)| t == topic && *p == partition)
            .map(|(_, _, rx)| rx.clone())
    }

    /// Wait for the next worker to fail.
    ///
    /// Returns `None` once every worker has stopped cleanly. Callers treat
    /// `Some` as fatal for the process.
    pub async fn next_fatal(&mut self) -> Option<ConsumerError> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => return Some(e),
                Err(e) => return Some(ConsumerError::Aborted(e.to_string())),
            }
        }
        None
    }

    /// Stop fetching, let in-flight applies finish, and wait for every worker.
    ///
    /// Returns the first worker error, if any.
    pub async fn shutdown(mut self) -> Result<(), ConsumerError> {
        self.shutdown.cancel();
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(ConsumerError::Aborted(e.to_string())),
            };
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
