//! Completion signals and the channel that carries them.
//!
//! Every downstream handler that finishes applying a command publishes one
//! [`CompletionSignal`] naming itself. Any number of handlers may publish for
//! the same command. Delivery is at-most-once: a signal missed by a waiter is
//! indistinguishable from a slow handler and ends in a wait timeout.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::completion::CompletionWaiter;
use crate::error::LogError;

/// Default subject / channel name for completion signals.
pub const DEFAULT_COMPLETION_SUBJECT: &str = "done";

/// Default channel capacity for the in-process bus.
const DEFAULT_CAPACITY: usize = 1024;

/// A handler's confirmation that it applied `command` to `resource_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub resource_kind: String,
    pub resource_id: String,
    pub command: Command,
    pub handler: String,
}

/// Publishing side of the completion channel.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn signal(&self, signal: &CompletionSignal) -> Result<(), LogError>;
}

/// In-process completion channel.
///
/// Used in tests and when the consumer and the waiter share a process.
#[derive(Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<CompletionSignal>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Stream of every signal sent after this call.
    ///
    /// Lagged receivers skip the signals they missed.
    pub fn subscribe(&self) -> impl Stream<Item = CompletionSignal> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|received| async move {
            match received {
                Ok(signal) => Some(signal),
                Err(e) => {
                    warn!(error = %e, "completion signal receiver lagged");
                    None
                }
            }
        })
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalSink for SignalBus {
    async fn signal(&self, signal: &CompletionSignal) -> Result<(), LogError> {
        // No subscribers is not an error: nobody is waiting.
        let _ = self.sender.send(signal.clone());
        Ok(())
    }
}

/// Feed a stream of completion signals into `waiter` until it ends or
/// `shutdown` is cancelled.
pub async fn forward_signals<S>(signals: S, waiter: CompletionWaiter, shutdown: CancellationToken)
where
    S: Stream<Item = CompletionSignal> + Send,
{
    info!("completion signal forwarding started");
    futures::pin_mut!(signals);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = signals.next() => match next {
                Some(signal) => {
                    let resolved = waiter.signal(&signal);
                    debug!(
                        kind = %signal.resource_kind,
                        id = %signal.resource_id,
                        handler = %signal.handler,
                        resolved,
                        "completion signal received"
                    );
                }
                None => {
                    warn!("completion signal stream ended");
                    break;
                }
            },
        }
    }
    info!("completion signal forwarding stopped");
}
