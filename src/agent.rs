//! Turn processing pipeline
//!
//! One `process` call is one sequential run to completion or failure:
//! compose the message list, call the model once, split the raw response,
//! record the turn, merge any newly extracted traits, and rebuild the
//! system instruction when the profile changed. The reply and the trait
//! payload come out of the same generation - there is no second
//! extraction call.

use crate::config::AgentConfig;
use crate::db::DocumentStore;
use crate::error::AgentError;
use crate::history::{HistoryBuffer, Speaker};
use crate::logging;
use crate::model::ModelProvider;
use crate::parser::{self, PayloadStatus};
use crate::profile::{ProfileStore, TraitProfile};
use crate::prompt::{self, PERSONA_END, PERSONA_START};
use uuid::Uuid;

/// A companion agent bound to one conversation.
///
/// Holds all per-conversation state: the transcript, the profile store
/// handle, and the cached system instruction. `process` takes `&mut self`,
/// so one call is in flight at a time per instance; independent agents
/// share nothing and may run in parallel.
pub struct CompanionAgent<M: ModelProvider> {
    config: AgentConfig,
    model: M,
    profile: ProfileStore,
    history: HistoryBuffer,
    system_instruction: String,
    session_id: String,
}

impl<M: ModelProvider> CompanionAgent<M> {
    pub fn new(config: AgentConfig, model: M, store: Box<dyn DocumentStore>) -> Self {
        let mut profile = ProfileStore::new(
            store,
            config.profile_namespace.clone(),
            config.list_equality,
        );
        let system_instruction = prompt::build_system_instruction(&profile.summarize());
        let session_id = Uuid::new_v4().to_string();

        logging::log_conversation(Some(&session_id), "Companion session started");

        Self {
            config,
            model,
            profile,
            history: HistoryBuffer::new(),
            system_instruction,
            session_id,
        }
    }

    /// Process one user utterance and return the visible reply.
    ///
    /// On model failure nothing is mutated: either both transcript entries
    /// are recorded and the profile evaluated, or neither is.
    pub async fn process(&mut self, utterance: &str) -> Result<String, AgentError> {
        if utterance.trim().is_empty() {
            return Err(AgentError::EmptyUtterance);
        }

        let recent = self.history.recent(self.config.history_window);
        let raw = self
            .model
            .generate(&self.system_instruction, recent, utterance)
            .await
            .map_err(|e| {
                logging::log_error(Some(&self.session_id), &format!("Model call failed: {}", e));
                AgentError::ModelUnavailable(e.to_string())
            })?;

        let parsed = parser::split_response(&raw, PERSONA_START, PERSONA_END);
        match parsed.status {
            PayloadStatus::Extracted => logging::log_parser(
                Some(&self.session_id),
                &format!("Extracted {} candidate trait(s)", parsed.payload.len()),
            ),
            PayloadStatus::Malformed => logging::log_error(
                Some(&self.session_id),
                "Malformed personality payload, ignoring",
            ),
            PayloadStatus::MarkersAbsent => logging::log_parser(
                Some(&self.session_id),
                "No payload markers in model response",
            ),
            PayloadStatus::Empty => {}
        }

        // A failed turn must never look like a successful empty reply
        if parsed.visible.is_empty() {
            logging::log_error(Some(&self.session_id), "Model response had no visible reply");
            return Err(AgentError::ModelUnavailable(
                "model response had no visible reply".to_string(),
            ));
        }

        self.history.append(Speaker::User, utterance);
        self.history.append(Speaker::Agent, parsed.visible.clone());
        logging::log_turn(
            Some(&self.session_id),
            &format!("Turn processed, transcript length {}", self.history.len()),
        );

        // An empty per-turn payload is a no-op; the clear path is reserved
        // for reset_all
        if !parsed.payload.is_empty() {
            match self.profile.merge(parsed.payload) {
                Ok(true) => {
                    self.rebuild_system_instruction();
                    logging::log_profile(
                        Some(&self.session_id),
                        "Profile changed, system instruction rebuilt",
                    );
                }
                Ok(false) => {}
                Err(AgentError::StorageWriteFailed(detail)) => {
                    return Err(AgentError::ProfileNotPersisted {
                        reply: parsed.visible,
                        detail,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(parsed.visible)
    }

    /// Snapshot of the current personality profile.
    pub fn get_profile(&mut self) -> TraitProfile {
        self.profile.load().clone()
    }

    /// Clear the transcript. The personality profile is user-scoped and
    /// survives conversation resets.
    pub fn reset_conversation(&mut self) {
        self.history.clear();
        logging::log_conversation(Some(&self.session_id), "Conversation history cleared");
    }

    /// Clear the transcript and the personality profile.
    pub fn reset_all(&mut self) -> Result<(), AgentError> {
        self.history.clear();
        if self.profile.merge(TraitProfile::new())? {
            self.rebuild_system_instruction();
        }
        logging::log_conversation(Some(&self.session_id), "Conversation and profile cleared");
        Ok(())
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn rebuild_system_instruction(&mut self) {
        self.system_instruction = prompt::build_system_instruction(&self.profile.summarize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteDocumentStore, StoreError};
    use crate::history::Turn;
    use crate::model::ModelError;
    use crate::profile::TraitValue;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;

    /// Model fake that replays a fixed script of outcomes.
    struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String, ModelError>>>,
        seen_history_lens: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String, ModelError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen_history_lens: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen_history_lens.lock().unwrap().len()
        }
    }

    impl ModelProvider for &ScriptedModel {
        fn generate(
            &self,
            _system_instruction: &str,
            history: &[Turn],
            _utterance: &str,
        ) -> impl Future<Output = Result<String, ModelError>> + Send {
            self.seen_history_lens.lock().unwrap().push(history.len());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ModelError::EmptyResponse));
            async move { next }
        }
    }

    struct FailingStore;

    impl DocumentStore for FailingStore {
        fn get(&self, _namespace: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }
        fn put(&self, _namespace: &str, _body: &str) -> Result<(), StoreError> {
            Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
        }
    }

    fn with_payload(reply: &str, json: &str) -> String {
        format!("{}\n{}\n{}\n{}", reply, PERSONA_START, json, PERSONA_END)
    }

    fn agent_with(model: &ScriptedModel) -> CompanionAgent<&ScriptedModel> {
        CompanionAgent::new(
            AgentConfig::new("test-key"),
            model,
            Box::new(SqliteDocumentStore::open_in_memory().unwrap()),
        )
    }

    fn text(s: &str) -> TraitValue {
        TraitValue::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_process_returns_reply_and_records_turns() {
        let model = ScriptedModel::new(vec![Ok(with_payload("Hello! How was your day?", "{}"))]);
        let mut agent = agent_with(&model);

        let reply = agent.process("Hi there").await.unwrap();

        assert_eq!(reply, "Hello! How was your day?");
        assert_eq!(agent.history.len(), 2);
        assert_eq!(agent.history.recent(2)[0].text, "Hi there");
        assert_eq!(agent.history.recent(2)[1].text, "Hello! How was your day?");
    }

    #[tokio::test]
    async fn test_new_traits_merge_and_rebuild_instruction() {
        let model = ScriptedModel::new(vec![Ok(with_payload(
            "Gardening sounds wonderful!",
            r#"{"hobbies": ["gardening"]}"#,
        ))]);
        let mut agent = agent_with(&model);
        let instruction_before = agent.system_instruction().to_string();

        agent.process("I spent the morning gardening").await.unwrap();

        assert_eq!(
            agent.get_profile().get("hobbies"),
            Some(&TraitValue::List(vec!["gardening".to_string()]))
        );
        let instruction_after = agent.system_instruction();
        assert_ne!(instruction_before, instruction_after);
        assert!(instruction_after.contains("- hobbies: gardening"));
    }

    #[tokio::test]
    async fn test_no_change_turn_keeps_instruction_identical() {
        let model = ScriptedModel::new(vec![
            Ok(with_payload("Lovely!", r#"{"hobbies": ["gardening"]}"#)),
            Ok(with_payload("Again!", r#"{"hobbies": ["gardening"]}"#)),
        ]);
        let mut agent = agent_with(&model);

        agent.process("I garden a lot").await.unwrap();
        let instruction_after_first = agent.system_instruction().to_string();

        agent.process("Did I mention I garden?").await.unwrap();
        assert_eq!(agent.system_instruction(), instruction_after_first);
    }

    #[tokio::test]
    async fn test_model_failure_leaves_state_untouched() {
        let model = ScriptedModel::new(vec![Err(ModelError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })]);
        let mut agent = agent_with(&model);

        let result = agent.process("Hello?").await;

        assert!(matches!(result, Err(AgentError::ModelUnavailable(_))));
        assert_eq!(agent.history.len(), 0);
        assert!(agent.get_profile().is_empty());
    }

    #[tokio::test]
    async fn test_empty_utterance_rejected_before_model_call() {
        let model = ScriptedModel::new(vec![Ok(with_payload("unused", "{}"))]);
        let mut agent = agent_with(&model);

        assert!(matches!(
            agent.process("   ").await,
            Err(AgentError::EmptyUtterance)
        ));
        assert_eq!(model.calls(), 0);
        assert_eq!(agent.history.len(), 0);
    }

    #[tokio::test]
    async fn test_empty_visible_reply_is_model_unavailable() {
        // Markers only, no natural reply around them
        let model = ScriptedModel::new(vec![Ok(with_payload("", r#"{"mood": "curious"}"#))]);
        let mut agent = agent_with(&model);

        let result = agent.process("Hello").await;

        assert!(matches!(result, Err(AgentError::ModelUnavailable(_))));
        assert_eq!(agent.history.len(), 0);
        assert!(agent.get_profile().is_empty());
    }

    #[tokio::test]
    async fn test_empty_per_turn_payload_does_not_clear_profile() {
        let model = ScriptedModel::new(vec![
            Ok(with_payload("Noted!", r#"{"location": "seaside town"}"#)),
            Ok(with_payload("Nothing new today.", "{}")),
        ]);
        let mut agent = agent_with(&model);

        agent.process("I live by the sea").await.unwrap();
        agent.process("How are you?").await.unwrap();

        assert_eq!(
            agent.get_profile().get("location"),
            Some(&text("seaside town"))
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_degrades_to_plain_reply() {
        let model = ScriptedModel::new(vec![Ok(with_payload("Still a fine reply.", "not json"))]);
        let mut agent = agent_with(&model);

        let reply = agent.process("Hello").await.unwrap();

        assert_eq!(reply, "Still a fine reply.");
        assert_eq!(agent.history.len(), 2);
        assert!(agent.get_profile().is_empty());
    }

    #[tokio::test]
    async fn test_reset_conversation_keeps_profile() {
        let model = ScriptedModel::new(vec![Ok(with_payload(
            "Noted!",
            r#"{"hobbies": ["chess"]}"#,
        ))]);
        let mut agent = agent_with(&model);
        agent.process("I play chess").await.unwrap();

        agent.reset_conversation();

        assert_eq!(agent.history.len(), 0);
        assert!(!agent.get_profile().is_empty());
    }

    #[tokio::test]
    async fn test_reset_all_clears_both() {
        let model = ScriptedModel::new(vec![Ok(with_payload(
            "Noted!",
            r#"{"hobbies": ["chess"]}"#,
        ))]);
        let mut agent = agent_with(&model);
        agent.process("I play chess").await.unwrap();

        agent.reset_all().unwrap();

        assert_eq!(agent.history.len(), 0);
        assert!(agent.get_profile().is_empty());
        assert!(agent
            .system_instruction()
            .contains("No personality information recorded yet."));
    }

    #[tokio::test]
    async fn test_profile_write_failure_carries_reply() {
        let model = ScriptedModel::new(vec![Ok(with_payload(
            "I'll remember that.",
            r#"{"hobbies": ["chess"]}"#,
        ))]);
        let mut agent = CompanionAgent::new(
            AgentConfig::new("test-key"),
            &model,
            Box::new(FailingStore),
        );

        let result = agent.process("I play chess").await;

        match result {
            Err(AgentError::ProfileNotPersisted { reply, .. }) => {
                assert_eq!(reply, "I'll remember that.");
            }
            other => panic!("expected ProfileNotPersisted, got {:?}", other.map(|_| ())),
        }
        // The turn itself was recorded; only persistence failed
        assert_eq!(agent.history.len(), 2);
    }

    #[tokio::test]
    async fn test_history_window_bounds_model_context() {
        let responses = (0..5)
            .map(|i| Ok(with_payload(&format!("Reply {}", i), "{}")))
            .collect();
        let model = ScriptedModel::new(responses);

        let mut config = AgentConfig::new("test-key");
        config.history_window = 4;
        let mut agent = CompanionAgent::new(
            config,
            &model,
            Box::new(SqliteDocumentStore::open_in_memory().unwrap()),
        );

        for i in 0..5 {
            agent.process(&format!("Message {}", i)).await.unwrap();
        }

        let seen = model.seen_history_lens.lock().unwrap().clone();
        assert_eq!(seen, vec![0, 2, 4, 4, 4]);
        // The full transcript is retained even though the window is bounded
        assert_eq!(agent.history.len(), 10);
    }
}
