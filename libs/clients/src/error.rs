use relay_api::RelayError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("config ({client}): {reason}")]
    Config { client: String, reason: String },

    #[error("subscription ({client}): {source}")]
    Subscription { client: String, source: RelayError },

    #[error("sink ({client}): {source}")]
    Sink { client: String, source: RelayError },
}

impl ClientError {
    pub(crate) fn config(client: &str, reason: impl Into<String>) -> Self {
        ClientError::Config { client: client.to_string(), reason: reason.into() }
    }
}
