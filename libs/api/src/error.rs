/// Category of a relay error. Lets the owning poll loop decide whether to
/// log and continue or to drop the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Publish/poll failure on the channel; logged, not retried.
    Transport,
    /// Structurally parseable, but required fields are missing or empty.
    Validation,
    /// File write / rotation failure; the batch is lost, clock advances.
    Sink,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => f.write_str("transport"),
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::Sink => f.write_str("sink"),
        }
    }
}

/// Unified error type for everything crossing the channel and sink seams.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
#[derive(Clone)]
pub struct RelayError {
    kind: ErrorKind,
    message: String,
}

impl RelayError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Transport, message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Validation, message: msg.into() }
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Sink, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RelayError {}
