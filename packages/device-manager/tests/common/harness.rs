//! Test harness: the real router over in-memory infrastructure.
//!
//! Optionally runs downstream consumers in-process so `wait=true` requests
//! resolve the same way they do in production: command log → consumer →
//! completion signal → waiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use command_log::{
    async_trait, forward_signals, Command, CommandApplier, CommandEnvelope, ConsumerBuilder,
    ConsumerConfig, ConsumerSet, SignalBus, SignalingHandler,
};
use device_manager::domains::entities::EntityKind;
use device_manager::kernel::TestDependencies;
use device_manager::server::build_app;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Bearer token for `user`, optionally with the admin realm role.
pub fn token(user: &str, admin: bool) -> String {
    let roles = if admin { vec!["user", "admin"] } else { vec!["user"] };
    let jwt = encode(
        &Header::default(),
        &json!({"sub": user, "realm_access": {"roles": roles}}),
        &EncodingKey::from_secret(b"gateway"),
    )
    .expect("token encodes");
    format!("Bearer {jwt}")
}

/// Idempotent stand-in for a downstream repository.
#[derive(Default)]
pub struct Repository {
    entities: Mutex<HashMap<(String, String), Value>>,
}

impl Repository {
    pub fn get(&self, kind: &str, id: &str) -> Option<Value> {
        self.entities
            .lock()
            .unwrap()
            .get(&(kind.to_string(), id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl CommandApplier for Repository {
    async fn apply(&self, kind: &str, envelope: &CommandEnvelope<Value>) -> anyhow::Result<()> {
        let key = (kind.to_string(), envelope.id.clone());
        let mut entities = self.entities.lock().unwrap();
        match envelope.command {
            Command::Put => {
                let payload = envelope
                    .payload
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("PUT without payload"))?;
                entities.insert(key, payload);
            }
            Command::Delete => {
                entities.remove(&key);
            }
        }
        Ok(())
    }
}

pub struct TestHarness {
    pub app: Router,
    pub deps: TestDependencies,
    pub repositories: HashMap<String, Arc<Repository>>,
    consumers: Vec<ConsumerSet>,
    shutdown: CancellationToken,
}

impl TestHarness {
    /// Router only, no downstream consumers.
    pub fn new(deps: TestDependencies) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        Self {
            app: build_app(deps.clone().into_server_deps()),
            deps,
            repositories: HashMap::new(),
            consumers: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Router plus one in-process consumer group per handler name, each
    /// applying every entity topic and signaling completion.
    pub async fn with_downstream(deps: TestDependencies, handlers: &[&str]) -> Self {
        let mut harness = Self::new(deps);
        let bus = SignalBus::new();
        tokio::spawn(forward_signals(
            bus.subscribe(),
            harness.deps.waiter.clone(),
            harness.shutdown.clone(),
        ));

        for handler in handlers {
            let repository = Arc::new(Repository::default());
            let signaling = Arc::new(SignalingHandler::new(
                *handler,
                repository.clone(),
                Arc::new(bus.clone()),
            ));
            let mut builder = ConsumerBuilder::new(
                Arc::new(harness.deps.log.clone()),
                ConsumerConfig::new(*handler),
            );
            for kind in EntityKind::ALL {
                builder = builder.subscribe(kind.topic(), signaling.clone());
            }
            let consumers = builder
                .start(harness.shutdown.child_token())
                .await
                .expect("consumers start");
            harness.consumers.push(consumers);
            harness.repositories.insert(handler.to_string(), repository);
        }
        harness
    }

    pub fn repository(&self, handler: &str) -> &Repository {
        &self.repositories[handler]
    }

    /// Send a request and decode the JSON response body (`Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", token);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for consumers in self.consumers {
            consumers.shutdown().await.expect("consumers stop cleanly");
        }
    }
}
