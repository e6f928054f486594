use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use batching::{BatchFlushController, FlushPolicy, FlushReport, RotatedFileSink};
use heartbeat::{write_heartbeat_file, Filtered, HeartbeatMonitor, Liveness};
use relay_api::{ChannelSubscriber, ChannelSubscription, OverflowPolicy, RelayError};

use crate::config::ConsumerClientConfig;
use crate::ClientError;

/// Pause after a failed poll before trying again.
pub(crate) const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════
//  Consumer: subscription + heartbeat monitor
// ═══════════════════════════════════════════════════════════════

/// Subscription that strips heartbeats before the application sees them.
pub struct Consumer {
    name: String,
    subscription: Box<dyn ChannelSubscription>,
    monitor: HeartbeatMonitor,
    heartbeat_dir: Option<PathBuf>,
}

impl Consumer {
    pub async fn subscribe(
        name: impl Into<String>,
        subscriber: &Arc<dyn ChannelSubscriber>,
        topics: &[String],
        buffer: usize,
        overflow: OverflowPolicy,
        heartbeat_interval: Option<u64>,
        heartbeat_dir: Option<PathBuf>,
    ) -> Result<Self, ClientError> {
        let name = name.into();
        let subscription = subscriber
            .subscribe(topics, buffer, overflow)
            .await
            .map_err(|e| ClientError::Subscription { client: name.clone(), source: e })?;

        tracing::info!(client = %name, topics = ?topics, "subscribed");
        Ok(Self {
            monitor: HeartbeatMonitor::new(topics.iter().cloned(), heartbeat_interval),
            name,
            subscription,
            heartbeat_dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    /// Poll once and return the application messages, in arrival order.
    ///
    /// Heartbeats are consumed here: valid ones refresh liveness and, with
    /// a heartbeat directory configured, are persisted there.
    pub async fn poll(&mut self, timeout_ms: i64) -> Result<Vec<String>, RelayError> {
        let deliveries = self.subscription.poll(timeout_ms).await?;

        let mut messages = Vec::with_capacity(deliveries.len());
        for delivery in &deliveries {
            match self.monitor.filter(&delivery.payload) {
                Filtered::Application(payload) => {
                    let message = String::from_utf8_lossy(payload).into_owned();
                    tracing::debug!(client = %self.name, topic = %delivery.topic, payload = %message, "received");
                    messages.push(message);
                }
                Filtered::Heartbeat(record) => {
                    tracing::debug!(
                        client = %self.name,
                        topic = %delivery.topic,
                        from = record.client_id.as_deref().unwrap_or_default(),
                        "heartbeat"
                    );
                    if let Some(dir) = &self.heartbeat_dir {
                        if let Err(e) = write_heartbeat_file(dir, &record) {
                            tracing::error!(client = %self.name, error = %e, "heartbeat file write failed");
                        }
                    }
                }
                Filtered::Foreign(record) => {
                    tracing::debug!(
                        client = %self.name,
                        topic = record.topic.as_deref().unwrap_or_default(),
                        "heartbeat for unsubscribed topic"
                    );
                }
                Filtered::Invalid { errors, .. } => {
                    tracing::warn!(
                        client = %self.name,
                        topic = %delivery.topic,
                        errors = %errors.join(" "),
                        "dropped invalid heartbeat"
                    );
                }
            }
        }
        Ok(messages)
    }

    /// Liveness check for this cycle; warns once per silent interval.
    pub fn check_liveness(&mut self) -> Liveness {
        let state = self.monitor.check_liveness();
        if let Liveness::Stale { silent_for } = state {
            tracing::warn!(
                client = %self.name,
                silent_secs = silent_for.num_seconds(),
                "no heartbeat within interval"
            );
        }
        state
    }
}

// ═══════════════════════════════════════════════════════════════
//  Consumer client: subscription → batch → rotated files
// ═══════════════════════════════════════════════════════════════

/// Запустить consumer client: poll → фильтр heartbeat'ов → очередь →
/// flush в новый файл по количеству или по времени.
pub async fn spawn_consumer_client(
    config: ConsumerClientConfig,
    subscriber: &Arc<dyn ChannelSubscriber>,
    buffer: usize,
    overflow: OverflowPolicy,
    token: CancellationToken,
) -> Result<JoinHandle<()>, ClientError> {
    config.validate()?;

    let mut consumer = Consumer::subscribe(
        config.name.clone(),
        subscriber,
        &config.topics,
        buffer,
        overflow,
        config.heartbeat_interval,
        config.heartbeat_dir.clone(),
    )
    .await?;

    let sink = RotatedFileSink::new(&config.output_dir, config.file_name.clone(), config.file_extension.clone());
    let policy = FlushPolicy::new(config.messages_per_file, config.time_per_file);
    let mut batcher = BatchFlushController::new(policy, sink);

    Ok(tokio::spawn(async move {
        let name = config.name;
        tracing::info!(
            client = %name,
            dir = %config.output_dir.display(),
            max_messages = policy.max_messages_per_file,
            max_seconds = ?policy.max_seconds_per_file,
            "consumer started"
        );

        loop {
            tokio::select! {
                polled = consumer.poll(config.poll_timeout_ms) => {
                    match polled {
                        Ok(messages) => {
                            for m in messages {
                                batcher.enqueue(m);
                            }
                        }
                        Err(e) => {
                            tracing::error!(client = %name, error = %e, "poll error");
                            tokio::select! {
                                _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                                _ = token.cancelled() => break,
                            }
                        }
                    }
                }
                _ = token.cancelled() => break,
            }

            consumer.check_liveness();
            if let Some(report) = batcher.tick() {
                log_flush(&name, report);
            }
        }

        tracing::info!(client = %name, pending = batcher.len(), "stopped");
    }))
}

fn log_flush(client: &str, report: FlushReport) {
    match report.result {
        Ok(path) => tracing::info!(
            client = %client,
            trigger = %report.trigger,
            messages = report.messages,
            path = %path.display(),
            "wrote batch"
        ),
        Err(e) => tracing::error!(
            client = %client,
            trigger = %report.trigger,
            messages = report.messages,
            error = %e,
            "batch write failed, messages lost"
        ),
    }
}
