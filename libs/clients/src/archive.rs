use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use batching::{DailyFileSink, FileSink};
use relay_api::{ChannelSubscriber, OverflowPolicy};

use crate::config::ArchiveClientConfig;
use crate::consumer::{Consumer, POLL_ERROR_BACKOFF};
use crate::ClientError;

/// Запустить archive client: всё, что пришло за один poll, дописывается
/// в файл текущего UTC-дня.
pub async fn spawn_archive_client(
    config: ArchiveClientConfig,
    subscriber: &Arc<dyn ChannelSubscriber>,
    buffer: usize,
    overflow: OverflowPolicy,
    token: CancellationToken,
) -> Result<JoinHandle<()>, ClientError> {
    config.validate()?;

    let mut sink = DailyFileSink::open(
        &config.output_dir,
        config.file_name.clone(),
        config.file_extension.clone(),
        relay_api::now(),
    )
    .map_err(|e| ClientError::Sink { client: config.name.clone(), source: e })?;

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

    let timeout_ms = i64::try_from(config.poll_timeout_secs.saturating_mul(1000)).unwrap_or(i64::MAX);

    Ok(tokio::spawn(async move {
        let name = config.name;
        tracing::info!(client = %name, path = %sink.current_path().display(), "archive started");

        loop {
            tokio::select! {
                polled = consumer.poll(timeout_ms) => {
                    match polled {
                        Ok(messages) if messages.is_empty() => {}
                        Ok(messages) => match sink.write_batch(&messages, relay_api::now()) {
                            Ok(path) => tracing::info!(
                                client = %name,
                                messages = messages.len(),
                                path = %path.display(),
                                "updated archive file"
                            ),
                            Err(e) => tracing::error!(
                                client = %name,
                                messages = messages.len(),
                                error = %e,
                                "archive write failed, messages lost"
                            ),
                        },
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
        }

        tracing::info!(client = %name, "stopped");
    }))
}
