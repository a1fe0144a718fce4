//! Completion waiter: blocks a caller until downstream handlers confirm a command.
//!
//! A caller registers interest in `(kind, id, command)` plus the set of handlers
//! that must confirm, then awaits the returned [`WaitHandle`]. Consumers (or a
//! signal subscription feeding [`CompletionWaiter::signal`]) resolve it.
//!
//! # Semantics
//!
//! - Matching is exact on kind, id and command.
//! - With required handlers, the wait resolves once **every** handler signaled.
//!   With none, the first signal from any handler resolves it.
//! - The registration is removed on resolution, timeout, or when the handle is
//!   dropped (e.g. the HTTP request was cancelled), so the table only holds
//!   live waits.
//! - `signal` only takes a short lock and never awaits, so calling it from a
//!   consumer's apply path cannot deadlock on a waiter.
//!
//! # Example
//!
//! ```ignore
//! let handle = waiter.register(
//!     WaitRequest::new("device-types", &id, Command::Put).handlers(["device-repository"]),
//!     Instant::now() + Duration::from_secs(30),
//! );
//! publisher.put("device-types", &id, None, &device_type).await?;
//! handle.wait().await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::command::Command;
use crate::error::WaitError;
use crate::signal::CompletionSignal;

/// Default bound for a synchronous wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// What to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequest {
    pub kind: String,
    pub id: String,
    pub command: Command,
    /// Handlers that must all confirm. Empty means any single handler.
    pub handlers: HashSet<String>,
}

impl WaitRequest {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, command: Command) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            command,
            handlers: HashSet::new(),
        }
    }

    /// Require confirmation from each of `handlers`.
    pub fn handlers<I, S>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handlers.extend(handlers.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WaitKey {
    kind: String,
    id: String,
    command: Command,
}

struct Registration {
    token: u64,
    any_handler: bool,
    remaining: HashSet<String>,
    done: oneshot::Sender<()>,
}

#[derive(Default)]
struct Registry {
    next_token: u64,
    waits: HashMap<WaitKey, Vec<Registration>>,
}

/// Shared correlation registry. Clones share the same table.
#[derive(Clone, Default)]
pub struct CompletionWaiter {
    registry: Arc<Mutex<Registry>>,
}

impl CompletionWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a wait that expires at `deadline`.
    ///
    /// Register before publishing so a fast confirmation cannot be missed.
    pub fn register(&self, request: WaitRequest, deadline: Instant) -> WaitHandle {
        let (done, receiver) = oneshot::channel();
        let key = WaitKey {
            kind: request.kind,
            id: request.id,
            command: request.command,
        };

        let token = {
            let mut registry = self.lock();
            registry.next_token += 1;
            let token = registry.next_token;
            registry
                .waits
                .entry(key.clone())
                .or_default()
                .push(Registration {
                    token,
                    any_handler: request.handlers.is_empty(),
                    remaining: request.handlers.clone(),
                    done,
                });
            token
        };
        trace!(kind = %key.kind, id = %key.id, command = %key.command, token, "wait registered");

        WaitHandle {
            waiter: self.clone(),
            key,
            token,
            required: request.handlers,
            deadline,
            receiver,
        }
    }

    /// Register a wait that expires after `timeout`.
    pub fn register_timeout(&self, request: WaitRequest, timeout: Duration) -> WaitHandle {
        self.register(request, Instant::now() + timeout)
    }

    /// Deliver a completion signal. Returns the number of waits it resolved.
    pub fn signal(&self, signal: &CompletionSignal) -> usize {
        let key = WaitKey {
            kind: signal.resource_kind.clone(),
            id: signal.resource_id.clone(),
            command: signal.command,
        };

        let mut registry = self.lock();
        let Some(registrations) = registry.waits.get_mut(&key) else {
            return 0;
        };

        let mut resolved = 0;
        let mut pending = Vec::with_capacity(registrations.len());
        for mut registration in registrations.drain(..) {
            registration.remaining.remove(&signal.handler);
            if registration.any_handler || registration.remaining.is_empty() {
                // The receiver may already be gone; the registration is removed either way.
                let _ = registration.done.send(());
                resolved += 1;
            } else {
                pending.push(registration);
            }
        }

        if pending.is_empty() {
            registry.waits.remove(&key);
        } else {
            *registrations = pending;
        }
        drop(registry);

        if resolved > 0 {
            debug!(
                kind = %key.kind,
                id = %key.id,
                command = %key.command,
                handler = %signal.handler,
                resolved,
                "completion signal resolved waits"
            );
        }
        resolved
    }

    /// Number of live registrations.
    pub fn pending(&self) -> usize {
        self.lock().waits.values().map(Vec::len).sum()
    }

    fn missing(&self, key: &WaitKey, token: u64) -> Option<Vec<String>> {
        let registry = self.lock();
        registry
            .waits
            .get(key)?
            .iter()
            .find(|r| r.token == token)
            .map(|r| {
                let mut missing: Vec<_> = r.remaining.iter().cloned().collect();
                missing.sort();
                missing
            })
    }

    fn remove(&self, key: &WaitKey, token: u64) {
        let mut registry = self.lock();
        if let Some(registrations) = registry.waits.get_mut(key) {
            registrations.retain(|r| r.token != token);
            if registrations.is_empty() {
                registry.waits.remove(key);
            }
        }
    }
}

/// A registered wait. Dropping it cancels the registration.
pub struct WaitHandle {
    waiter: CompletionWaiter,
    key: WaitKey,
    token: u64,
    required: HashSet<String>,
    deadline: Instant,
    receiver: oneshot::Receiver<()>,
}

impl WaitHandle {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Block until every required handler confirmed or the deadline passed.
    pub async fn wait(mut self) -> Result<(), WaitError> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(WaitError::Dropped),
            Err(_) => {
                let missing = self.waiter.missing(&self.key, self.token).unwrap_or_else(|| {
                    let mut all: Vec<_> = self.required.iter().cloned().collect();
                    all.sort();
                    all
                });
                debug!(
                    kind = %self.key.kind,
                    id = %self.key.id,
                    command = %self.key.command,
                    ?missing,
                    "completion wait timed out"
                );
                Err(WaitError::Timeout {
                    kind: self.key.kind.clone(),
                    id: self.key.id.clone(),
                    command: self.key.command.to_string(),
                    missing,
                })
            }
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.waiter.remove(&self.key, self.token);
    }
}
