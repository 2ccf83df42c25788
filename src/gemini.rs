use crate::config::AgentConfig;
use crate::history::{Speaker, Turn};
use crate::model::{ModelError, ModelProvider};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// Model constants
pub const GEMINI_FLASH: &str = "gemini-2.0-flash";

// Request timeout covers the full round trip including connect
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize, Clone)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize, Clone)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    status: String,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: GEMINI_FLASH.to_string(),
            temperature: 0.7,
            max_output_tokens: 1024,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    fn build_request(
        &self,
        system_instruction: &str,
        history: &[Turn],
        utterance: &str,
    ) -> GenerateContentRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: match turn.speaker {
                    Speaker::User => "user".to_string(),
                    Speaker::Agent => "model".to_string(),
                },
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: utterance.to_string(),
            }],
        });

        GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    async fn send_request(&self, request: GenerateContentRequest) -> Result<String, ModelError> {
        let url = format!("{}/{}:generateContent", GEMINI_API_URL, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();

            // Try to parse structured error
            if let Ok(parsed_error) = serde_json::from_str::<GeminiError>(&error_text) {
                return Err(ModelError::Api {
                    status,
                    message: format!(
                        "{} - {}",
                        parsed_error.error.status, parsed_error.error.message
                    ),
                });
            }

            return Err(ModelError::Api {
                status,
                message: error_text,
            });
        }

        let completion: GenerateContentResponse = response.json().await?;

        // Concatenate text parts of the first candidate
        let text = completion
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        Ok(text)
    }

    /// Validate the Gemini API key with a minimal generation request
    pub async fn validate_api_key(&self) -> Result<bool, ModelError> {
        let request = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "Reply with the single word: ok".to_string(),
                }],
            },
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "ok?".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 10,
            },
        };

        match self.send_request(request).await {
            Ok(_) => Ok(true),
            Err(ModelError::Api { status, message }) if status == 400 || status == 403 => {
                Err(ModelError::Api {
                    status,
                    message: format!("Invalid Gemini API key: {}", message),
                })
            }
            Err(e) => Err(e),
        }
    }
}

impl ModelProvider for GeminiClient {
    fn generate(
        &self,
        system_instruction: &str,
        history: &[Turn],
        utterance: &str,
    ) -> impl Future<Output = Result<String, ModelError>> + Send {
        let request = self.build_request(system_instruction, history, utterance);
        async move { self.send_request(request).await }
    }
}
