#[derive(Debug, thiserror::Error)]
pub enum RelayAppError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("no {0} configured")]
    NoComponents(&'static str),

    #[error("topic '{topic}' referenced by '{client}' is not configured")]
    UnknownTopic { client: String, topic: String },

    #[error("create dir '{path}': {source}")]
    CreateDir { path: String, source: std::io::Error },

    #[error("{0}")]
    Client(#[from] clients::ClientError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
