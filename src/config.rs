use crate::error::AgentError;
use crate::gemini::GEMINI_FLASH;
use crate::profile::ListEquality;

/// Configuration for a companion agent instance.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    /// How many recent transcript entries are sent to the model each turn.
    pub history_window: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Document namespace the personality profile is stored under.
    pub profile_namespace: String,
    /// Whether list-valued traits compare order-sensitively during merge.
    pub list_equality: ListEquality,
}

impl AgentConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: GEMINI_FLASH.to_string(),
            history_window: 12,
            temperature: 0.7,
            max_output_tokens: 1024,
            profile_namespace: "personality".to_string(),
            list_equality: ListEquality::Ordered,
        }
    }

    /// Build a config from the environment (`GOOGLE_API_KEY`).
    pub fn from_env() -> Result<Self, AgentError> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }
}
