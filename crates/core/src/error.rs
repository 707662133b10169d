use thiserror::Error;

/// Failure reported by an assistant backend. The message is diagnostic only
/// and is never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    status: Option<u16>,
}

impl BackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Workflow failures. `Display` renders the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Please fill in: {}", .labels.join(", "))]
    MissingFields { labels: Vec<&'static str> },
    #[error("Please connect to a database first.")]
    NotConnected,
    #[error("No schema data received from the server.")]
    MissingSchema,
    #[error("An error occurred while connecting to the database. Please try again.")]
    Connect(#[source] BackendError),
    #[error("An error occurred while processing your request. Please try again.")]
    Query(#[source] BackendError),
    #[error("request was superseded by a newer one")]
    Superseded,
}

impl WorkflowError {
    /// Validation and precondition failures are handled before any request
    /// leaves the client.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::MissingFields { .. } | Self::NotConnected)
    }
}
