use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use heartbeat::{HeartbeatEmitter, HeartbeatPolicy};
use relay_api::{ChannelPublisher, RelayError};

use crate::config::ProducerClientConfig;
use crate::ClientError;

/// Wait between cycles when no input file was found and no pace is set.
const IDLE_WAIT: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════
//  Producer: publisher + heartbeat emitter
// ═══════════════════════════════════════════════════════════════

/// Publishes to one topic and piggybacks throttled heartbeats on sends.
pub struct Producer {
    topic: String,
    publisher: Arc<dyn ChannelPublisher>,
    emitter: HeartbeatEmitter,
}

impl Producer {
    pub fn new(
        topic: impl Into<String>,
        client_id: impl Into<String>,
        heartbeat_interval: Option<i64>,
        publisher: Arc<dyn ChannelPublisher>,
    ) -> Self {
        Self {
            topic: topic.into(),
            publisher,
            emitter: HeartbeatEmitter::new(client_id, HeartbeatPolicy::from_interval_secs(heartbeat_interval)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one message, then offer a heartbeat. A heartbeat failure is
    /// logged and does not fail the send.
    pub async fn send(&mut self, message: &str) -> Result<(), RelayError> {
        self.publisher
            .publish(&self.topic, message.as_bytes().to_vec())
            .await?;
        tracing::debug!(topic = %self.topic, payload = %message, "sent");

        if let Err(e) = self.send_heartbeat().await {
            tracing::warn!(topic = %self.topic, error = %e, "heartbeat failed");
        }
        Ok(())
    }

    /// Emit a heartbeat if the throttle allows it.
    pub async fn send_heartbeat(&mut self) -> Result<bool, RelayError> {
        self.emitter
            .maybe_emit(&self.topic, self.publisher.as_ref())
            .await
    }
}

// ═══════════════════════════════════════════════════════════════
//  Input files
// ═══════════════════════════════════════════════════════════════

/// Первый (по имени) файл в `dir`, имя которого оканчивается на `extension`.
pub fn next_input_file(dir: &Path, extension: &str) -> std::io::Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(extension) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Non-empty lines of the file, in order. Invalid UTF-8 is replaced
/// with U+FFFD per line, so one bad byte does not lose the whole file.
pub fn read_messages(path: &Path) -> std::io::Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Move the processed file into `archive_dir`, or delete it.
pub fn retire_file(path: &Path, archive_dir: Option<&Path>) -> std::io::Result<()> {
    match (archive_dir, path.file_name()) {
        (Some(dir), Some(name)) => std::fs::rename(path, dir.join(name)),
        _ => std::fs::remove_file(path),
    }
}

/// Publish every line of `path`, then retire it. A file that cannot be
/// read is left in place and reported as `false`.
async fn process_file(client: &str, producer: &mut Producer, path: &Path, archive_dir: Option<&Path>) -> bool {
    let messages = match read_messages(path) {
        Ok(messages) => messages,
        Err(e) => {
            tracing::error!(client = %client, path = %path.display(), error = %e, "read failed, file kept");
            return false;
        }
    };

    let mut sent = 0usize;
    for m in &messages {
        match producer.send(m).await {
            Ok(()) => sent += 1,
            Err(e) => tracing::error!(client = %client, error = %e, "send failed"),
        }
    }
    tracing::info!(client = %client, path = %path.display(), sent, total = messages.len(), "processed file");

    if let Err(e) = retire_file(path, archive_dir) {
        tracing::error!(client = %client, path = %path.display(), error = %e, "could not remove input file");
    }
    true
}

// ═══════════════════════════════════════════════════════════════
//  Producer client: input dir → topic
// ═══════════════════════════════════════════════════════════════

/// Запустить producer client: один файл за цикл, каждая строка = сообщение.
/// Если файлов нет, отправляется idle heartbeat (с учётом throttle).
pub fn spawn_producer_client(
    config: ProducerClientConfig,
    publisher: &Arc<dyn ChannelPublisher>,
    token: CancellationToken,
) -> Result<JoinHandle<()>, ClientError> {
    config.validate()?;

    let mut producer = Producer::new(
        config.topic.clone(),
        config.client_id.clone(),
        config.heartbeat_interval,
        publisher.clone(),
    );

    Ok(tokio::spawn(async move {
        let name = config.name;
        tracing::info!(
            client = %name,
            topic = %config.topic,
            dir = %config.input_dir.display(),
            "producer started"
        );

        loop {
            let found = match next_input_file(&config.input_dir, &config.file_extension) {
                // an unreadable file is retried after the idle wait
                Ok(Some(path)) => process_file(&name, &mut producer, &path, config.archive_dir.as_deref()).await,
                Ok(None) => {
                    if let Err(e) = producer.send_heartbeat().await {
                        tracing::warn!(client = %name, error = %e, "idle heartbeat failed");
                    }
                    false
                }
                Err(e) => {
                    tracing::error!(client = %name, dir = %config.input_dir.display(), error = %e, "input scan failed");
                    false
                }
            };

            let wait = match (config.time_per_file, found) {
                (Some(secs), _) => Duration::from_secs(secs),
                (None, true) => Duration::ZERO,
                (None, false) => IDLE_WAIT,
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = token.cancelled() => break,
            }
        }

        tracing::info!(client = %name, "stopped");
    }))
}
