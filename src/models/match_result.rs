use serde::{Deserialize, Serialize};

use crate::models::{Classification, MatchMethod};

/// Confidence at or above which a match is confirmed existing.
pub const CONFIRM_THRESHOLD: f64 = 0.85;
/// Confidence at or below which an entry is classified as new.
pub const NEW_THRESHOLD: f64 = 0.70;

/// Outcome of classifying one catalog entry against the stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub classification: Classification,
    pub confidence: f64,
    pub matched_record_id: Option<String>,
    pub method: MatchMethod,
    pub rationale: String,
}

impl MatchResult {
    /// Build a result for a strategy hit, deriving the classification from
    /// the monotonic confidence thresholds.
    pub fn matched(
        confidence: f64,
        matched_record_id: Option<String>,
        method: MatchMethod,
        rationale: impl Into<String>,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let classification = if confidence >= CONFIRM_THRESHOLD {
            Classification::ConfirmedExisting
        } else if confidence <= NEW_THRESHOLD {
            Classification::New
        } else {
            Classification::SuspectedDuplicate
        };
        Self {
            classification,
            confidence,
            matched_record_id,
            method,
            rationale: rationale.into(),
        }
    }

    /// Build a result for an entry no strategy matched. `best_partial` is
    /// the strongest near-miss score seen during the cascade (0.0 if none).
    pub fn unmatched(best_partial: f64, rationale: impl Into<String>) -> Self {
        Self {
            classification: Classification::New,
            confidence: (1.0 - best_partial).clamp(0.0, 1.0),
            matched_record_id: None,
            method: MatchMethod::NoMatch,
            rationale: rationale.into(),
        }
    }

    pub fn is_uncertain(&self) -> bool {
        self.classification == Classification::SuspectedDuplicate
    }
}
