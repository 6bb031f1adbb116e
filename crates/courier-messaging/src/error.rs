use thiserror::Error;

/// Failures surfaced by the messaging service. Nothing here is swallowed
/// into an empty result: callers can always tell "no messages" apart from
/// "the operation failed".
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The store has neither a direct nor a conversation message schema.
    #[error("no recognizable message schema in the backing store")]
    SchemaUndetected,

    #[error("storage error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
