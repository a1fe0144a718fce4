//! In-memory log backend for tests.
//!
//! `MemoryLog` implements every log trait and records what happened so tests can
//! assert on it (how many appends, which keys, in which order). It also supports
//! fault injection for send and commit failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::LogError;
use crate::log::{partition_for, LogAdmin, LogProducer, LogRecord, LogSource, PartitionReader};

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Vec<LogRecord>>>,
    /// Next offset to read, per (group, topic, partition).
    committed: HashMap<(String, String, u32), u64>,
    failing_sends: u32,
    failing_commits: u32,
    send_attempts: u64,
    commits: u64,
    closed: bool,
}

struct Inner {
    state: Mutex<State>,
    appended: Notify,
    default_partitions: u32,
}

/// Cloneable in-memory log. Clones share the same topics.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

impl MemoryLog {
    /// Topics created implicitly by `send` get one partition.
    pub fn new() -> Self {
        Self::with_default_partitions(1)
    }

    /// Topics created implicitly by `send` get `partitions` partitions.
    pub fn with_default_partitions(partitions: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                appended: Notify::new(),
                default_partitions: partitions.max(1),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` sends fail with a transport error.
    pub fn fail_next_sends(&self, n: u32) {
        self.state().failing_sends = n;
    }

    /// Make the next `n` commits fail with a transport error.
    pub fn fail_next_commits(&self, n: u32) {
        self.state().failing_commits = n;
    }

    /// End all read sessions; pending and future fetches return `Closed`.
    pub fn close(&self) {
        self.state().closed = true;
        self.inner.appended.notify_waiters();
    }

    /// Every record of a topic, partition by partition, in offset order.
    pub fn records(&self, topic: &str) -> Vec<LogRecord> {
        self.state()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Records of a topic with the given key, in append order.
    pub fn records_for_key(&self, topic: &str, key: &str) -> Vec<LogRecord> {
        self.records(topic)
            .into_iter()
            .filter(|r| r.key == key)
            .collect()
    }

    /// Total number of successful appends across all topics.
    pub fn append_count(&self) -> usize {
        self.state()
            .topics
            .values()
            .flat_map(|partitions| partitions.iter())
            .map(Vec::len)
            .sum()
    }

    /// Number of send calls, including failed ones.
    pub fn send_attempts(&self) -> u64 {
        self.state().send_attempts
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.state().commits
    }

    /// Committed offset of a consumer group on a partition.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> u64 {
        self.state()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// Whether a topic exists.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.state().topics.contains_key(topic)
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogProducer for MemoryLog {
    async fn send(&self, topic: &str, key: &str, value: Bytes) -> Result<(), LogError> {
        {
            let mut state = self.state();
            state.send_attempts += 1;
            if state.failing_sends > 0 {
                state.failing_sends -= 1;
                return Err(LogError::transport("injected send failure"));
            }

            let default_partitions = self.inner.default_partitions as usize;
            let partitions = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new(); default_partitions]);
            let partition = partition_for(key, partitions.len() as u32);
            let log = &mut partitions[partition as usize];
            log.push(LogRecord {
                topic: topic.to_string(),
                partition,
                offset: log.len() as u64,
                key: key.to_string(),
                value,
            });
        }
        self.inner.appended.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl LogAdmin for MemoryLog {
    async fn ensure_topic(&self, topic: &str, partitions: u32) -> Result<(), LogError> {
        self.state()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
        Ok(())
    }

    async fn partition_count(&self, topic: &str) -> Result<u32, LogError> {
        self.state()
            .topics
            .get(topic)
            .map(|p| p.len() as u32)
            .ok_or_else(|| LogError::UnknownTopic(topic.to_string()))
    }
}

#[async_trait]
impl LogSource for MemoryLog {
    async fn open(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<Box<dyn PartitionReader>, LogError> {
        let key = (group.to_string(), topic.to_string(), partition);
        let position = {
            let state = self.state();
            let partitions = state
                .topics
                .get(topic)
                .ok_or_else(|| LogError::UnknownTopic(topic.to_string()))?;
            if partition as usize >= partitions.len() {
                return Err(LogError::UnknownPartition {
                    topic: topic.to_string(),
                    partition,
                });
            }
            state.committed.get(&key).copied().unwrap_or(0)
        };

        Ok(Box::new(MemoryReader {
            log: self.clone(),
            key,
            position,
        }))
    }
}

struct MemoryReader {
    log: MemoryLog,
    key: (String, String, u32),
    position: u64,
}

impl MemoryReader {
    fn poll_record(&self) -> Result<Option<LogRecord>, LogError> {
        let state = self.log.state();
        if state.closed {
            return Err(LogError::Closed);
        }
        let (_, topic, partition) = &self.key;
        Ok(state
            .topics
            .get(topic)
            .and_then(|p| p.get(*partition as usize))
            .and_then(|records| records.get(self.position as usize))
            .cloned())
    }
}

#[async_trait]
impl PartitionReader for MemoryReader {
    async fn fetch(&mut self) -> Result<LogRecord, LogError> {
        loop {
            // Register interest before checking so an append in between is not missed.
            let appended = self.log.inner.appended.notified();
            if let Some(record) = self.poll_record()? {
                self.position += 1;
                return Ok(record);
            }
            appended.await;
        }
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let mut state = self.log.state();
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(LogError::transport("injected commit failure"));
        }

        let committed = state.committed.entry(self.key.clone()).or_insert(0);
        if record.offset != *committed {
            return Err(LogError::CommitOutOfOrder {
                expected: *committed,
                actual: record.offset,
            });
        }
        *committed = record.offset + 1;
        state.commits += 1;
        Ok(())
    }
}
