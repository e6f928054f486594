use std::path::PathBuf;

use serde::Deserialize;

use relay_api::OverflowPolicy;

use crate::ClientError;

// ═══════════════════════════════════════════════════════════════
//  Topic Config
// ═══════════════════════════════════════════════════════════════

/// Topic in the in-process channel, plus subscription defaults for it.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    /// Размер буфера по умолчанию для подписчиков этого topic'а.
    #[serde(default = "default_topic_buffer")]
    pub buffer: usize,
    /// Стратегия переполнения по умолчанию для подписчиков.
    #[serde(default = "default_topic_overflow")]
    pub overflow: OverflowPolicy,
}

fn default_topic_buffer() -> usize {
    4096
}
fn default_topic_overflow() -> OverflowPolicy {
    OverflowPolicy::BackPressure
}

// ═══════════════════════════════════════════════════════════════
//  Producer Client Config
// ═══════════════════════════════════════════════════════════════

/// Reads files from `input_dir` and publishes every line to `topic`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerClientConfig {
    #[serde(default = "default_producer_name")]
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub client_id: String,
    pub input_dir: PathBuf,
    pub file_extension: String,
    /// Processed files are moved here; deleted when unset.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
    /// Pause between files, seconds.
    #[serde(default)]
    pub time_per_file: Option<u64>,
    /// Seconds between heartbeats; negative sends one every time.
    #[serde(default)]
    pub heartbeat_interval: Option<i64>,
}

fn default_producer_name() -> String {
    "producer".into()
}

impl ProducerClientConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.topic.is_empty() {
            return Err(ClientError::config(&self.name, "topic is empty"));
        }
        if self.file_extension.is_empty() {
            return Err(ClientError::config(&self.name, "file_extension is empty"));
        }
        if self.input_dir.as_os_str().is_empty() {
            return Err(ClientError::config(&self.name, "input_dir is empty"));
        }
        if self.heartbeat_interval.is_some() && self.client_id.is_empty() {
            return Err(ClientError::config(&self.name, "client_id is required when heartbeats are enabled"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Consumer Client Config
// ═══════════════════════════════════════════════════════════════

/// Batches messages from `topics` into new files under `output_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerClientConfig {
    #[serde(default = "default_consumer_name")]
    pub name: String,
    pub topics: Vec<String>,
    pub output_dir: PathBuf,
    pub file_extension: String,
    /// Fragment appended after the millisecond timestamp in file names.
    #[serde(default)]
    pub file_name: String,
    #[serde(default = "default_messages_per_file")]
    pub messages_per_file: u64,
    #[serde(default)]
    pub time_per_file: Option<u64>,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: i64,
    #[serde(default)]
    pub heartbeat_interval: Option<u64>,
    #[serde(default)]
    pub heartbeat_dir: Option<PathBuf>,
    /// Overrides the topic's subscription buffer.
    #[serde(default)]
    pub buffer: Option<usize>,
    #[serde(default)]
    pub overflow: Option<OverflowPolicy>,
}

fn default_consumer_name() -> String {
    "consumer".into()
}
fn default_messages_per_file() -> u64 {
    1
}
fn default_poll_timeout_ms() -> i64 {
    500
}

impl ConsumerClientConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        validate_intake(&self.name, &self.topics, &self.output_dir, &self.file_extension)?;
        if self.messages_per_file < 1 {
            return Err(ClientError::config(&self.name, "messages_per_file must be at least 1"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Archive Client Config
// ═══════════════════════════════════════════════════════════════

/// Appends messages from `topics` to one file per UTC day.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveClientConfig {
    #[serde(default = "default_archive_name")]
    pub name: String,
    pub topics: Vec<String>,
    pub output_dir: PathBuf,
    pub file_extension: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default)]
    pub heartbeat_interval: Option<u64>,
    #[serde(default)]
    pub heartbeat_dir: Option<PathBuf>,
    #[serde(default)]
    pub buffer: Option<usize>,
    #[serde(default)]
    pub overflow: Option<OverflowPolicy>,
}

fn default_archive_name() -> String {
    "archive".into()
}
fn default_poll_timeout_secs() -> u64 {
    10
}

impl ArchiveClientConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        validate_intake(&self.name, &self.topics, &self.output_dir, &self.file_extension)
    }
}

fn validate_intake(
    name: &str,
    topics: &[String],
    output_dir: &std::path::Path,
    file_extension: &str,
) -> Result<(), ClientError> {
    if topics.is_empty() {
        return Err(ClientError::config(name, "no topics"));
    }
    if topics.iter().any(String::is_empty) {
        return Err(ClientError::config(name, "empty topic name"));
    }
    if output_dir.as_os_str().is_empty() {
        return Err(ClientError::config(name, "output_dir is empty"));
    }
    if file_extension.is_empty() {
        return Err(ClientError::config(name, "file_extension is empty"));
    }
    Ok(())
}
