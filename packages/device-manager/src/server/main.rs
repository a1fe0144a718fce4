// Main entry point for the device manager API server

use std::sync::Arc;

use anyhow::{Context, Result};
use command_log::nats::{JetStreamConfig, JetStreamLog, NatsSignals};
use command_log::{
    forward_signals, CommandPublisher, CompletionWaiter, LogAdmin, PublisherConfig,
};
use device_manager::common::IdMinter;
use device_manager::domains::entities::EntityKind;
use device_manager::kernel::{HttpPermissions, HttpValidator, ServerDeps, SyncWaitConfig};
use device_manager::{server::build_app, Config};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,device_manager=debug,command_log=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting device manager");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to NATS
    tracing::info!(url = %config.nats_url, "Connecting to NATS...");
    let client = async_nats::connect(&config.nats_url)
        .await
        .context("Failed to connect to NATS")?;
    tracing::info!("NATS connected");

    // One stream per entity kind
    let log = Arc::new(JetStreamLog::new(client.clone(), JetStreamConfig::default()));
    for kind in EntityKind::ALL {
        log.ensure_topic(kind.topic(), config.topic_partitions)
            .await
            .with_context(|| format!("Failed to create topic {}", kind.topic()))?;
    }

    let publisher = CommandPublisher::new(
        log,
        PublisherConfig {
            send_attempts: config.publish_send_attempts,
            ..PublisherConfig::default()
        }
        .with_owner_scoped(EntityKind::owner_scoped_topics()),
    );

    // Completion signals feed the waiter until shutdown
    let shutdown = CancellationToken::new();
    let waiter = CompletionWaiter::new();
    let signals = NatsSignals::new(client.clone(), config.completion_subject.clone())
        .subscribe()
        .await
        .context("Failed to subscribe to completion signals")?;
    let signal_pump = tokio::spawn(forward_signals(signals, waiter.clone(), shutdown.clone()));

    let http = reqwest::Client::builder()
        .timeout(config.collaborator_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let deps = ServerDeps::new(
        publisher,
        waiter,
        Arc::new(HttpValidator::new(http.clone(), &config.device_repository_url)),
        Arc::new(HttpPermissions::new(http, &config.permissions_url)),
        IdMinter::new(&config.id_namespace),
        SyncWaitConfig {
            timeout: config.sync_wait_timeout,
            handlers: config.sync_wait_handlers.clone(),
        },
    )
    .with_nats(client.clone());

    let app = build_app(deps);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = signal_pump.await {
        tracing::warn!(error = %e, "Completion signal pump panicked");
    }
    client.drain().await.context("Failed to drain NATS connection")?;
    tracing::info!("Device manager stopped");

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM and cancel background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
    shutdown.cancel();
}
