use thiserror::Error;

/// Errors surfaced by the hub and its handle.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub's dispatch loop has exited; submissions are dropped.
    #[error("hub is shut down")]
    Closed,

    /// The hub command queue is full. Transient; the submission is dropped
    /// rather than blocking the producer.
    #[error("hub command queue is full")]
    Saturated,

    /// An inbound handler reported an application-level failure.
    #[error("handler failed: {0}")]
    Handler(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
