//! Extraction of the structured personality payload from model output
//!
//! The model is instructed to append a JSON object between two marker
//! strings after its natural reply. This module splits one raw response
//! into the visible reply and that payload, degrading gracefully when the
//! model omits or mangles the protocol.

use crate::logging;
use crate::profile::TraitProfile;

/// How the payload was (or was not) recovered from the raw response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStatus {
    /// Both markers present, payload parsed, at least one trait.
    Extracted,
    /// Both markers present, payload was an empty object or blank.
    Empty,
    /// One or both markers missing; the whole response is the visible reply.
    MarkersAbsent,
    /// Payload text present but not a JSON object of strings/string lists.
    Malformed,
}

#[derive(Debug)]
pub struct ParsedResponse {
    pub visible: String,
    pub payload: TraitProfile,
    pub status: PayloadStatus,
}

/// Split a raw model response into the visible reply and the trait payload.
///
/// Never fails: any malformed payload degrades to an empty mapping and the
/// reason is carried in [`PayloadStatus`] for the caller to log.
pub fn split_response(raw: &str, start_marker: &str, end_marker: &str) -> ParsedResponse {
    let start_idx = match raw.find(start_marker) {
        Some(idx) => idx,
        None => return markers_absent(raw),
    };
    let after_start = start_idx + start_marker.len();
    let end_idx = match raw[after_start..].find(end_marker) {
        Some(idx) => after_start + idx,
        None => return markers_absent(raw),
    };

    // The visible reply excludes the markers and everything between them
    let visible = format!(
        "{}{}",
        &raw[..start_idx],
        &raw[end_idx + end_marker.len()..]
    )
    .trim()
    .to_string();

    // Strip any code fences the model wrapped around the JSON
    let payload_text = raw[after_start..end_idx]
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if payload_text.is_empty() || payload_text == "{}" {
        return ParsedResponse {
            visible,
            payload: TraitProfile::new(),
            status: PayloadStatus::Empty,
        };
    }

    match serde_json::from_str::<TraitProfile>(payload_text) {
        Ok(mut payload) => {
            payload.retain(|key, _| !key.trim().is_empty());
            let status = if payload.is_empty() {
                PayloadStatus::Empty
            } else {
                PayloadStatus::Extracted
            };
            ParsedResponse {
                visible,
                payload,
                status,
            }
        }
        Err(e) => {
            let excerpt: String = payload_text.chars().take(200).collect();
            logging::log_parser(
                None,
                &format!("Failed to parse personality payload: {}. Payload: {}", e, excerpt),
            );
            ParsedResponse {
                visible,
                payload: TraitProfile::new(),
                status: PayloadStatus::Malformed,
            }
        }
    }
}

fn markers_absent(raw: &str) -> ParsedResponse {
    ParsedResponse {
        visible: raw.trim().to_string(),
        payload: TraitProfile::new(),
        status: PayloadStatus::MarkersAbsent,
    }
}
