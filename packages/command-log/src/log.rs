//! Log substrate abstraction.
//!
//! A topic is an append-only log split into partitions. Records are routed to a
//! partition by a stable hash of their key, so every record for the same key
//! lands in the same partition and is read back in append order.
//!
//! Backends:
//! - [`JetStreamLog`](crate::nats::JetStreamLog) for production
//! - [`MemoryLog`](crate::memory::MemoryLog) for tests and spies

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::LogError;

/// A record read back from a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: u32,
    /// Monotonic position within the partition (0-based in memory, the
    /// stream sequence on JetStream).
    pub offset: u64,
    pub key: String,
    pub value: Bytes,
}

/// Append side of the log.
#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Append `value` to `topic`, routed by `key`.
    ///
    /// Returns once the broker acknowledged the append.
    async fn send(&self, topic: &str, key: &str, value: Bytes) -> Result<(), LogError>;
}

/// Topic provisioning.
#[async_trait]
pub trait LogAdmin: Send + Sync {
    /// Create `topic` with `partitions` partitions unless it already exists.
    async fn ensure_topic(&self, topic: &str, partitions: u32) -> Result<(), LogError>;

    /// Number of partitions of an existing topic.
    async fn partition_count(&self, topic: &str) -> Result<u32, LogError>;
}

/// A read session on one topic partition for one consumer group.
///
/// Sessions start at the group's committed offset. Records that were fetched
/// but not committed are delivered again by the next session.
#[async_trait]
pub trait PartitionReader: Send {
    /// Wait for the next record. Must be cancel-safe: dropping the future
    /// before it resolves loses nothing.
    async fn fetch(&mut self) -> Result<LogRecord, LogError>;

    /// Durably advance the group's offset past `record`.
    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError>;
}

/// Read side of the log.
#[async_trait]
pub trait LogSource: LogAdmin {
    async fn open(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<Box<dyn PartitionReader>, LogError>;
}

/// Stable key to partition mapping.
///
/// Uses the first eight bytes of the key's SHA-256 so the mapping never changes
/// between builds or processes.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    if partitions <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(partitions)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_partition() {
        for n in [2, 3, 8, 16] {
            let p = partition_for("urn:infai:ses:device:1", n);
            assert!(p < n);
            assert_eq!(p, partition_for("urn:infai:ses:device:1", n));
        }
    }

    #[test]
    fn single_partition_always_zero() {
        assert_eq!(partition_for("anything", 0), 0);
        assert_eq!(partition_for("anything", 1), 0);
    }

    #[test]
    fn keys_spread_across_partitions() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            seen.insert(partition_for(&format!("key-{i}"), 4));
        }
        assert_eq!(seen.len(), 4);
    }
}
