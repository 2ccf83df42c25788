use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

/// One transcript entry: who spoke and what they said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// In-memory conversation transcript, scoped to one agent instance.
///
/// The buffer keeps every turn; only the recent window is ever sent to the
/// model, which bounds token cost without deleting anything.
#[derive(Debug, Default)]
pub struct HistoryBuffer {
    turns: Vec<Turn>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.turns.push(Turn::new(speaker, text));
    }

    /// The last `n` turns in chronological order, or all turns if fewer exist.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
