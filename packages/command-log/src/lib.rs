//! # Command Log
//!
//! Keyed command publication, at-least-once log consumption, and a
//! synchronous bridge for waiting on asynchronous completion.
//!
//! ## Architecture
//!
//! ```text
//! HTTP write
//!     │
//!     ├─► CompletionWaiter.register() ──────────────┐
//!     │                                             │
//!     ▼ publish(kind, command, id, owner, payload)  │
//! CommandPublisher                                  │
//!     │                                             │
//!     ▼ append, key = id                            │
//! Log topic "{kind}" ─── partition = hash(id)       │
//!     │                                             │
//!     ▼ fetch                                       │
//! PartitionWorker (downstream service)              │
//!     ├─► RecordHandler.handle() ◄─ retry/backoff   │
//!     ├─► commit                                    │
//!     └─► CompletionSignal ─► signal channel ───────┤
//!                                                   ▼
//!                                      WaitHandle.wait() resolves
//! ```
//!
//! ## Guarantees
//!
//! - **Per-key order**: every command for an id lands in one partition and
//!   is applied in append order. Nothing is promised across ids.
//! - **At-least-once apply**: records are committed one at a time after a
//!   successful apply. A crash in between redelivers the record, so handlers
//!   must be idempotent.
//! - **Halt, don't drop**: a handler failing past its retry budget stops its
//!   worker without committing.
//! - **Bounded waits**: a wait resolves when every required handler
//!   confirmed, or times out. A timeout does not mean the write failed.
//!
//! ## Example
//!
//! ```ignore
//! use command_log::{
//!     Command, CommandPublisher, CompletionWaiter, PublisherConfig, WaitRequest,
//! };
//!
//! let publisher = CommandPublisher::new(log.clone(), PublisherConfig::default());
//! let waiter = CompletionWaiter::new();
//!
//! let handle = waiter.register_timeout(
//!     WaitRequest::new("device-types", &id, Command::Put).handlers(["device-repository"]),
//!     Duration::from_secs(30),
//! );
//! publisher.put("device-types", &id, None, &device_type).await?;
//! handle.wait().await?;
//! ```

mod apply;
mod command;
mod completion;
mod consumer;
mod error;
mod log;
mod publisher;
mod signal;

pub mod memory;
pub mod nats;

pub use crate::apply::{CommandApplier, SignalingHandler};
pub use crate::command::{Command, CommandEnvelope};
pub use crate::completion::{CompletionWaiter, WaitHandle, WaitRequest, DEFAULT_WAIT_TIMEOUT};
pub use crate::consumer::{
    ConsumerBuilder, ConsumerConfig, ConsumerSet, ConsumerState, PartitionWorker, RecordHandler,
    RetryPolicy,
};
pub use crate::error::{BoxError, ConsumerError, LogError, PublishError, WaitError};
pub use crate::log::{
    partition_for, LogAdmin, LogProducer, LogRecord, LogSource, PartitionReader,
};
pub use crate::publisher::{CommandPublisher, PublisherConfig, MIN_SEND_ATTEMPTS};
pub use crate::signal::{
    forward_signals, CompletionSignal, SignalBus, SignalSink, DEFAULT_COMPLETION_SUBJECT,
};

pub use async_trait::async_trait;
