//! Personality profile store
//!
//! This module owns:
//! - The trait-name → trait-value mapping learned about the user
//! - Merge semantics: a write happens only when something actually changed
//! - The cached, single-document persistence of the whole profile

use crate::db::DocumentStore;
use crate::error::AgentError;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A trait value is either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraitValue {
    Text(String),
    List(Vec<String>),
}

impl TraitValue {
    fn render(&self) -> String {
        match self {
            TraitValue::Text(s) => s.clone(),
            TraitValue::List(items) => items.join(", "),
        }
    }
}

/// The personality profile: trait name → trait value.
pub type TraitProfile = BTreeMap<String, TraitValue>;

/// Whether element order matters when comparing list-valued traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEquality {
    Ordered,
    Unordered,
}

fn values_equal(a: &TraitValue, b: &TraitValue, mode: ListEquality) -> bool {
    match (a, b) {
        (TraitValue::Text(x), TraitValue::Text(y)) => x == y,
        (TraitValue::List(x), TraitValue::List(y)) => match mode {
            ListEquality::Ordered => x == y,
            ListEquality::Unordered => {
                let mut xs = x.clone();
                let mut ys = y.clone();
                xs.sort();
                ys.sort();
                xs == ys
            }
        },
        _ => false,
    }
}

/// Durable store for the personality profile.
///
/// Every successful merge persists the full profile as one document write,
/// so the backing record is always a complete snapshot. An in-memory cache
/// avoids re-reading the document on every turn.
pub struct ProfileStore {
    store: Box<dyn DocumentStore>,
    namespace: String,
    list_equality: ListEquality,
    cache: Option<TraitProfile>,
}

impl ProfileStore {
    pub fn new(
        store: Box<dyn DocumentStore>,
        namespace: impl Into<String>,
        list_equality: ListEquality,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            list_equality,
            cache: None,
        }
    }

    /// Current profile, served from cache when possible. A missing or
    /// corrupt backing document degrades to an empty profile.
    pub fn load(&mut self) -> &TraitProfile {
        if self.cache.is_none() {
            let loaded = self.read_backing();
            self.cache = Some(loaded);
        }
        self.cache.as_ref().expect("profile cache populated")
    }

    fn read_backing(&self) -> TraitProfile {
        match self.store.get(&self.namespace) {
            Ok(Some(body)) => match serde_json::from_str::<TraitProfile>(&body) {
                Ok(profile) => profile,
                Err(e) => {
                    logging::log_error(
                        None,
                        &format!(
                            "Corrupt profile document in '{}', starting empty: {}",
                            self.namespace, e
                        ),
                    );
                    TraitProfile::new()
                }
            },
            Ok(None) => TraitProfile::new(),
            Err(e) => {
                logging::log_error(
                    None,
                    &format!(
                        "Profile read failed in '{}', starting empty: {}",
                        self.namespace, e
                    ),
                );
                TraitProfile::new()
            }
        }
    }

    /// Merge newly extracted traits into the profile.
    ///
    /// Returns `Ok(true)` if anything changed and was persisted. An empty
    /// `new_facts` against a non-empty profile is the explicit clear path;
    /// against an already-empty profile it is a no-op returning `Ok(false)`.
    pub fn merge(&mut self, new_facts: TraitProfile) -> Result<bool, AgentError> {
        let current = self.load().clone();

        if new_facts.is_empty() {
            if current.is_empty() {
                return Ok(false);
            }
            let cleared = TraitProfile::new();
            self.persist(&cleared)?;
            self.cache = Some(cleared);
            logging::log_profile(None, "Profile cleared");
            return Ok(true);
        }

        let mut merged = current;
        let mut staged: Vec<String> = Vec::new();
        for (key, value) in new_facts {
            if key.trim().is_empty() {
                continue;
            }
            let changed = match merged.get(&key) {
                Some(existing) => !values_equal(existing, &value, self.list_equality),
                None => true,
            };
            if changed {
                staged.push(key.clone());
                merged.insert(key, value);
            }
        }

        if staged.is_empty() {
            return Ok(false);
        }

        self.persist(&merged)?;
        self.cache = Some(merged);
        logging::log_profile(None, &format!("Merged traits: {}", staged.join(", ")));
        Ok(true)
    }

    fn persist(&self, profile: &TraitProfile) -> Result<(), AgentError> {
        let body = serde_json::to_string(profile)
            .map_err(|e| AgentError::StorageWriteFailed(e.to_string()))?;
        self.store
            .put(&self.namespace, &body)
            .map_err(|e| AgentError::StorageWriteFailed(e.to_string()))
    }

    /// Render the profile as one line per trait, for prompt inclusion.
    pub fn summarize(&mut self) -> String {
        let profile = self.load();
        if profile.is_empty() {
            return "No personality information recorded yet.".to_string();
        }

        profile
            .iter()
            .map(|(key, value)| format!("- {}: {}", key, value.render()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
