//! Hearth - Empathetic AI Companion
//!
//! A conversational companion that learns durable personality facts about
//! its user, one turn at a time. Each processed utterance goes through a
//! single model call that yields both the visible reply and a structured
//! payload of newly inferred traits; the traits are merged into a
//! persistent profile, and the system instruction for the next turn is
//! rebuilt so the model always speaks with everything learned so far.
//!
//! ```no_run
//! use hearth::{AgentConfig, CompanionAgent, GeminiClient, SqliteDocumentStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentConfig::from_env()?;
//! let model = GeminiClient::from_config(&config);
//! let store = SqliteDocumentStore::open("hearth.db")?;
//!
//! let mut agent = CompanionAgent::new(config, model, Box::new(store));
//! let reply = agent.process("I spent the morning in the garden").await?;
//! println!("{}", reply);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod gemini;
pub mod history;
pub mod logging;
pub mod model;
pub mod parser;
pub mod profile;
pub mod prompt;

pub use agent::CompanionAgent;
pub use config::AgentConfig;
pub use db::{DocumentStore, SqliteDocumentStore, StoreError};
pub use error::AgentError;
pub use gemini::GeminiClient;
pub use history::{HistoryBuffer, Speaker, Turn};
pub use model::{ModelError, ModelProvider};
pub use parser::{split_response, ParsedResponse, PayloadStatus};
pub use profile::{ListEquality, ProfileStore, TraitProfile, TraitValue};
