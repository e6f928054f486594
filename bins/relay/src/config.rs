use std::collections::HashMap;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use clients::{ArchiveClientConfig, ConsumerClientConfig, ProducerClientConfig, TopicConfig};
use relay_api::OverflowPolicy;

use crate::error::RelayAppError;

#[derive(Parser)]
#[command(name = "relay", version, about = "Батчинг сообщений из topic'ов в файлы с heartbeat-контролем")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить все сконфигурированные клиенты
    Run(RunArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "relay.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
    #[serde(default)]
    pub producers: Vec<ProducerClientConfig>,
    #[serde(default)]
    pub consumers: Vec<ConsumerClientConfig>,
    #[serde(default)]
    pub archives: Vec<ArchiveClientConfig>,
}

impl RelayConfig {
    pub fn load(path: &str) -> Result<Self, RelayAppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayAppError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        let config = Self::parse(&content)
            .map_err(|e| RelayAppError::Config { context: "parse", detail: format!("'{path}': {e}") })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Cross-checks that serde cannot express: every client validates and
    /// every topic it names is declared under `[[topics]]`.
    pub fn validate(&self) -> Result<(), RelayAppError> {
        if self.topics.is_empty() {
            return Err(RelayAppError::NoComponents("[[topics]]"));
        }
        if self.producers.is_empty() && self.consumers.is_empty() && self.archives.is_empty() {
            return Err(RelayAppError::NoComponents("clients"));
        }

        let known = self.topic_index();
        let check = |client: &str, topic: &str| {
            if known.contains_key(topic) {
                Ok(())
            } else {
                Err(RelayAppError::UnknownTopic { client: client.to_string(), topic: topic.to_string() })
            }
        };

        for p in &self.producers {
            p.validate()?;
            check(&p.name, &p.topic)?;
        }
        for c in &self.consumers {
            c.validate()?;
            for t in &c.topics {
                check(&c.name, t)?;
            }
        }
        for a in &self.archives {
            a.validate()?;
            for t in &a.topics {
                check(&a.name, t)?;
            }
        }
        Ok(())
    }

    fn topic_index(&self) -> HashMap<&str, &TopicConfig> {
        self.topics.iter().map(|t| (t.name.as_str(), t)).collect()
    }

    /// Buffer and overflow for a subscription: client overrides first,
    /// then the defaults of the first subscribed topic.
    pub fn subscription_settings(
        &self,
        topics: &[String],
        buffer: Option<usize>,
        overflow: Option<OverflowPolicy>,
    ) -> (usize, OverflowPolicy) {
        let first = topics
            .first()
            .and_then(|name| self.topics.iter().find(|t| &t.name == name));
        let buffer = buffer.or(first.map(|t| t.buffer)).unwrap_or(4096);
        let overflow = overflow
            .or(first.map(|t| t.overflow))
            .unwrap_or(OverflowPolicy::BackPressure);
        (buffer, overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = r#"
        [[topics]]
        name = "quakes"
        buffer = 128
        overflow = "drop"

        [[topics]]
        name = "picks"

        [[producers]]
        name = "ingest"
        topic = "quakes"
        client_id = "ingest-1"
        input_dir = "/data/in"
        file_extension = "json"
        heartbeat_interval = 30

        [[consumers]]
        name = "batcher"
        topics = ["quakes", "picks"]
        output_dir = "/data/out"
        file_extension = "json"
        messages_per_file = 10
        time_per_file = 60
        heartbeat_interval = 90

        [[archives]]
        name = "daily"
        topics = ["picks"]
        output_dir = "/data/archive"
        file_extension = "json"
        buffer = 16
    "#;

    #[test]
    fn parses_full_config() {
        let cfg = RelayConfig::parse(FULL).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.topics.len(), 2);
        assert_eq!(cfg.producers[0].heartbeat_interval, Some(30));
        assert_eq!(cfg.consumers[0].messages_per_file, 10);
        assert_eq!(cfg.archives[0].poll_timeout_secs, 10);
    }

    #[test]
    fn subscription_settings_prefer_client_overrides() {
        let cfg = RelayConfig::parse(FULL).unwrap();

        let c = &cfg.consumers[0];
        assert_eq!(cfg.subscription_settings(&c.topics, c.buffer, c.overflow), (128, OverflowPolicy::Drop));

        let a = &cfg.archives[0];
        assert_eq!(
            cfg.subscription_settings(&a.topics, a.buffer, a.overflow),
            (16, OverflowPolicy::BackPressure)
        );
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let cfg = RelayConfig::parse(
            r#"
            [[topics]]
            name = "quakes"

            [[consumers]]
            name = "batcher"
            topics = ["picks"]
            output_dir = "/out"
            file_extension = "json"
            "#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, RelayAppError::UnknownTopic { ref topic, .. } if topic == "picks"));
    }

    #[test]
    fn config_without_topics_is_rejected() {
        let cfg = RelayConfig::parse("").unwrap();
        assert!(matches!(cfg.validate(), Err(RelayAppError::NoComponents("[[topics]]"))));
    }

    #[test]
    fn load_reports_missing_file_and_bad_toml() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = RelayConfig::load(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, RelayAppError::Config { context: "read", .. }));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[[topics]\nname =").unwrap();
        let err = RelayConfig::load(bad.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, RelayAppError::Config { context: "parse", .. }));
    }
}
