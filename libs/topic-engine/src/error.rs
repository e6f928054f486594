#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    #[error("topic '{0}' not found")]
    NotFound(String),

    #[error("subscription has no topics")]
    EmptySubscription,
}

impl TopicError {
    /// Convert to RelayError. Every topic-engine failure is a transport
    /// failure from the point of view of the client loops.
    pub fn into_relay_error(self) -> relay_api::RelayError {
        relay_api::RelayError::transport(self.to_string())
    }
}
