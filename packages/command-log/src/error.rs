//! Structured error types for publishing, consuming and waiting.
//!
//! Every boundary of the library has its own pattern-matchable error:
//!
//! - [`LogError`] - the log substrate (JetStream or in-memory) failed
//! - [`PublishError`] - a command could not be built or appended
//! - [`ConsumerError`] - a partition worker stopped abnormally
//! - [`WaitError`] - a completion wait ended without confirmation
//!
//! `anyhow::Error` is only used at the handler seam, where downstream services
//! return whatever their apply step produced.

use std::time::Duration;

use thiserror::Error;

/// Boxed transport error, as produced by the NATS client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by a log backend.
#[derive(Debug, Error)]
pub enum LogError {
    /// The underlying connection or broker rejected the operation.
    #[error("log transport error: {0}")]
    Transport(#[source] BoxError),

    /// The topic has not been created.
    #[error("topic `{0}` does not exist")]
    UnknownTopic(String),

    /// The partition index is outside the topic's partition range.
    #[error("partition {partition} out of range for topic `{topic}`")]
    UnknownPartition { topic: String, partition: u32 },

    /// The read session ended (connection drained or log shut down).
    #[error("log read session closed")]
    Closed,

    /// A commit was requested for a record that is not the pending one.
    #[error("commit out of order: expected offset {expected}, got {actual}")]
    CommitOutOfOrder { expected: u64, actual: u64 },
}

impl LogError {
    /// Wrap any transport-level error.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(err.into())
    }
}

/// Errors returned by [`CommandPublisher::publish`](crate::CommandPublisher::publish).
///
/// The first three variants are construction errors: no log I/O happened.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Owner-scoped kinds must carry the owning user.
    #[error("missing owner for {kind} `{id}`")]
    MissingOwner { kind: String, id: String },

    /// Every command is keyed by a non-empty entity id.
    #[error("missing id for {kind} command")]
    MissingId { kind: String },

    /// PUT commands carry the full entity.
    #[error("missing payload for PUT of {kind} `{id}`")]
    MissingPayload { kind: String, id: String },

    /// The envelope could not be encoded.
    #[error("failed to encode command envelope: {0}")]
    Encode(#[from] serde_json::Error),

    /// All send attempts failed; the command must be treated as not written.
    #[error("failed to append to `{topic}` after {attempts} attempts: {source}")]
    SendFailed {
        topic: String,
        attempts: u32,
        #[source]
        source: LogError,
    },
}

impl PublishError {
    /// Whether the error is the caller's fault (nothing was sent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingOwner { .. } | Self::MissingId { .. } | Self::MissingPayload { .. }
        )
    }
}

/// Abnormal termination of a partition worker.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The handler kept failing past the retry budget. The record was not
    /// committed and will be redelivered after operator intervention.
    #[error(
        "handler for `{topic}`[{partition}] offset {offset} failed {attempts} times within {budget:?}: {source}"
    )]
    RetryBudgetExhausted {
        topic: String,
        partition: u32,
        offset: u64,
        attempts: u32,
        budget: Duration,
        #[source]
        source: anyhow::Error,
    },

    /// The log itself failed (topic setup, fetch or commit).
    #[error("log error on `{topic}`[{partition}]: {source}")]
    Log {
        topic: String,
        partition: u32,
        #[source]
        source: LogError,
    },

    /// The worker task panicked or was aborted.
    #[error("consumer worker terminated abnormally: {0}")]
    Aborted(String),
}

/// Outcome of a completion wait that did not confirm.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// No matching signal from every required handler before the deadline.
    /// The command itself was published; only the confirmation is missing.
    #[error("timed out waiting for {command} of {kind} `{id}` (missing: {missing:?})")]
    Timeout {
        kind: String,
        id: String,
        command: String,
        missing: Vec<String>,
    },

    /// The registry dropped the registration without resolving it.
    #[error("completion registration dropped")]
    Dropped,
}
