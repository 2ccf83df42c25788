use crate::history::Turn;
use std::future::Future;
use thiserror::Error;

/// Errors from the model capability. Converted to
/// [`AgentError::ModelUnavailable`](crate::error::AgentError) at the agent boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned no text")]
    EmptyResponse,
}

/// The opaque language-model capability behind one conversational turn.
///
/// One call produces the complete raw output for a turn: the natural reply
/// plus whatever structured payload the system instruction asked for.
pub trait ModelProvider: Send {
    fn generate(
        &self,
        system_instruction: &str,
        history: &[Turn],
        utterance: &str,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}
