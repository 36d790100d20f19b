use thiserror::Error;

/// Failures of the persistence layer that callers may want to tell apart.
///
/// A missing blob is not an error: it loads as
/// [`LoadOutcome::NoPriorState`](crate::persistence::LoadOutcome::NoPriorState).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("stored data under `{key}` is unreadable")]
    CorruptState {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write `{key}` to the backing store")]
    PersistenceUnavailable {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to encode `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
