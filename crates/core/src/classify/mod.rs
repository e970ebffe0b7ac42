//! Site classification.
//!
//! Two tiers: [`HeuristicClassifier`] is local, deterministic and always
//! runs; [`RemoteClassifier`] is an optional external service whose label,
//! when it answers, is the one displayed. A remote failure leaves the
//! heuristic label in place.

pub mod heuristic;
pub mod keywords;
pub mod remote;

use serde::Serialize;

pub use heuristic::HeuristicClassifier;
pub use remote::{RemoteClassifier, coerce_label};

/// Label for sites with no suspicious signal.
pub const CLEAN: &str = "clean";

/// Label for remote replies outside the vocabulary.
pub const SUSPECT: &str = "suspect";

/// Closed vocabulary accepted from the remote classifier.
pub const ALLOWED_LABELS: &[&str] = &[CLEAN, "adult", "gambling", "pharma", "crypto", "malware", "spam", SUSPECT];

/// Outcome of a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub label: String,
    pub suspicious: bool,
}

impl Verdict {
    pub fn clean() -> Self {
        Self { label: CLEAN.to_string(), suspicious: false }
    }

    /// A non-clean label.
    pub fn flagged(label: impl Into<String>) -> Self {
        Self { label: label.into(), suspicious: true }
    }

    /// Verdict for a label from either tier.
    pub fn from_label(label: impl Into<String>) -> Self {
        let label = label.into();
        if label == CLEAN { Self::clean() } else { Self::flagged(label) }
    }
}

/// Combines both tiers: the remote label wins whenever there is one.
pub fn resolve(heuristic: Verdict, remote: Option<String>) -> Verdict {
    match remote {
        Some(label) => Verdict::from_label(label),
        None => heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_takes_precedence() {
        let verdict = resolve(Verdict::flagged("gambling"), Some("clean".to_string()));
        assert_eq!(verdict, Verdict::clean());

        let verdict = resolve(Verdict::clean(), Some("adult".to_string()));
        assert_eq!(verdict, Verdict::flagged("adult"));
    }

    #[test]
    fn test_heuristic_kept_without_remote() {
        assert_eq!(resolve(Verdict::flagged("spam"), None), Verdict::flagged("spam"));
    }

    #[test]
    fn test_vocabulary_contains_markers() {
        assert!(ALLOWED_LABELS.contains(&CLEAN));
        assert!(ALLOWED_LABELS.contains(&SUSPECT));
    }
}
