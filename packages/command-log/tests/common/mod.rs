//! Shared helpers for command-log integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use command_log::{async_trait, Command, CommandApplier, CommandEnvelope};

/// Initialize tracing once; respects RUST_LOG.
/// Run tests with: RUST_LOG=debug cargo test -- --nocapture
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Idempotent key-value applier with random failure injection.
///
/// Failures happen after the write took effect, which is the worst case for
/// redelivery: the next attempt sees its own earlier write.
pub struct FlakyStore {
    entries: Mutex<HashMap<String, serde_json::Value>>,
    failure_rate: f64,
    applies: AtomicU64,
    failures: AtomicU64,
}

impl FlakyStore {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            failure_rate,
            applies: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn get(&self, id: &str) -> Option<serde_json::Value> {
        self.entries.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandApplier for FlakyStore {
    async fn apply(
        &self,
        _kind: &str,
        envelope: &CommandEnvelope<serde_json::Value>,
    ) -> anyhow::Result<()> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        {
            let mut entries = self.entries.lock().unwrap();
            match (envelope.command, &envelope.payload) {
                (Command::Put, Some(payload)) => {
                    entries.insert(envelope.id.clone(), payload.clone());
                }
                (Command::Put, None) => anyhow::bail!("PUT without payload"),
                (Command::Delete, _) => {
                    entries.remove(&envelope.id);
                }
            }
        }

        if fastrand::f64() < self.failure_rate {
            self.failures.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("injected failure for {}", envelope.id);
        }
        Ok(())
    }
}
