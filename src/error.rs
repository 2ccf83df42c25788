use thiserror::Error;

/// Failure kinds surfaced by the agent and its profile store.
///
/// Storage reads are deliberately absent: a missing or corrupt profile
/// document degrades to an empty profile inside the store and never
/// escapes the public API.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("utterance is empty")]
    EmptyUtterance,

    #[error("GOOGLE_API_KEY not found in environment")]
    MissingApiKey,

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("profile write failed: {0}")]
    StorageWriteFailed(String),

    /// The turn produced a reply, but persisting the merged profile failed.
    /// The reply is carried so the caller can still show it to the user.
    #[error("reply generated but profile not persisted: {detail}")]
    ProfileNotPersisted { reply: String, detail: String },
}
