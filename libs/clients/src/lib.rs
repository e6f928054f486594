//! Client loops that connect the channel to the file system: producers
//! read input files, consumers batch into rotated files, archives append
//! into one file per day.

pub mod archive;
pub mod config;
pub mod consumer;
pub mod error;
pub mod producer;

pub use archive::spawn_archive_client;
pub use config::{ArchiveClientConfig, ConsumerClientConfig, ProducerClientConfig, TopicConfig};
pub use consumer::{spawn_consumer_client, Consumer};
pub use error::ClientError;
pub use producer::{spawn_producer_client, Producer};
