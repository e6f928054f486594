use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use clients::{spawn_archive_client, spawn_consumer_client, spawn_producer_client};
use relay_api::{ChannelPublisher, ChannelSubscriber};
use topic_engine::{Topic, TopicRegistry};

use crate::config::{RelayConfig, RunArgs};
use crate::error::RelayAppError;

/// Сколько ждать завершения клиентов после Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: RunArgs) -> Result<(), RelayAppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "relay starting");

    // --- Load config ---
    let config = RelayConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");

    // --- Directories ---
    for p in &config.producers {
        ensure_dir(&p.input_dir)?;
        if let Some(dir) = &p.archive_dir {
            ensure_dir(dir)?;
        }
    }
    for c in &config.consumers {
        ensure_dir(&c.output_dir)?;
        if let Some(dir) = &c.heartbeat_dir {
            ensure_dir(dir)?;
        }
    }
    for a in &config.archives {
        ensure_dir(&a.output_dir)?;
        if let Some(dir) = &a.heartbeat_dir {
            ensure_dir(dir)?;
        }
    }

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Create topics ---
    let mut registry = TopicRegistry::new();
    for topic_cfg in &config.topics {
        registry.register(Topic::new(topic_cfg.name.clone()));
        tracing::info!(
            topic = %topic_cfg.name,
            buffer = topic_cfg.buffer,
            overflow = ?topic_cfg.overflow,
            "registered topic"
        );
    }

    let registry = Arc::new(registry);
    let subscriber: Arc<dyn ChannelSubscriber> = registry.clone();
    let publisher: Arc<dyn ChannelPublisher> = registry;

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // --- Consumers and archives subscribe before producers start ---
    for c in &config.consumers {
        let (buffer, overflow) = config.subscription_settings(&c.topics, c.buffer, c.overflow);
        handles.push(spawn_consumer_client(c.clone(), &subscriber, buffer, overflow, token.clone()).await?);
        tracing::info!(client = %c.name, topics = ?c.topics, "spawned consumer");
    }

    for a in &config.archives {
        let (buffer, overflow) = config.subscription_settings(&a.topics, a.buffer, a.overflow);
        handles.push(spawn_archive_client(a.clone(), &subscriber, buffer, overflow, token.clone()).await?);
        tracing::info!(client = %a.name, topics = ?a.topics, "spawned archive");
    }

    for p in &config.producers {
        handles.push(spawn_producer_client(p.clone(), &publisher, token.clone())?);
        tracing::info!(client = %p.name, topic = %p.topic, "spawned producer");
    }

    tracing::info!(clients = handles.len(), "relay ready");

    // --- Ожидание Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    token.cancel();

    // Drain with a shared deadline, abort the rest
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    for mut h in handles {
        if tokio::time::timeout_at(deadline, &mut h).await.is_err() {
            h.abort();
            let _ = h.await;
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), RelayAppError> {
    std::fs::create_dir_all(path).map_err(|e| RelayAppError::CreateDir {
        path: path.display().to_string(),
        source: e,
    })
}
