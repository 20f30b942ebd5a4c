//! Response classification
//!
//! Decides whether a response is usable, retriable, fatal, or a benign
//! end-of-data sentinel. The upstream API overloads 400 to mean both
//! "bad request" and "you asked past the last page", so 4xx handling
//! requires body inspection, not status inspection alone.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Body fragment the upstream returns on a 400 that actually means
/// "no more data for this filter"
pub const NO_ITEMS_FOUND: &str = "No items found with given filter.";

/// Statuses retried in addition to 5xx
static DEFAULT_RETRY_STATUSES: Lazy<HashSet<u16>> = Lazy::new(|| [429].into_iter().collect());

/// Outcome of classifying one HTTP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Usable response, hand the body to the record extractor
    Ok,
    /// Transient failure, retry per policy
    Retriable,
    /// Permanent failure, abort the partition
    Fatal,
    /// Error-shaped response that signals legitimate end of data
    BenignEmpty,
}

/// Trait for validating responses; stream definitions may supply their own
/// implementation to override the default rules
pub trait ResponseValidator: Send + Sync {
    /// Classify a response by status and body text
    fn validate(&self, status: u16, body: &str) -> ResponseOutcome;
}

/// Default response classifier
///
/// Rules, in priority order:
/// 1. status in the extra-retry set, or >= 500: retriable
/// 2. 400..=499: benign-empty if the body carries the no-items message,
///    fatal otherwise
/// 3. below 400: ok
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    extra_retry_statuses: HashSet<u16>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self {
            extra_retry_statuses: DEFAULT_RETRY_STATUSES.clone(),
        }
    }
}

impl FailureClassifier {
    /// Create a classifier with additional retriable statuses on top of the
    /// defaults
    pub fn with_extra_statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        let mut extra = DEFAULT_RETRY_STATUSES.clone();
        extra.extend(statuses);
        Self {
            extra_retry_statuses: extra,
        }
    }

    /// Classify a response
    pub fn classify(&self, status: u16, body: &str) -> ResponseOutcome {
        if self.extra_retry_statuses.contains(&status) || status >= 500 {
            return ResponseOutcome::Retriable;
        }

        if (400..500).contains(&status) {
            if body.contains(NO_ITEMS_FOUND) {
                return ResponseOutcome::BenignEmpty;
            }
            return ResponseOutcome::Fatal;
        }

        ResponseOutcome::Ok
    }
}

impl ResponseValidator for FailureClassifier {
    fn validate(&self, status: u16, body: &str) -> ResponseOutcome {
        self.classify(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(200, "" => ResponseOutcome::Ok; "success")]
    #[test_case(204, "" => ResponseOutcome::Ok; "no content")]
    #[test_case(500, "" => ResponseOutcome::Retriable; "server error")]
    #[test_case(502, "" => ResponseOutcome::Retriable; "bad gateway")]
    #[test_case(503, "upstream busy" => ResponseOutcome::Retriable; "unavailable")]
    #[test_case(429, "" => ResponseOutcome::Retriable; "rate limited")]
    #[test_case(400, "bad request" => ResponseOutcome::Fatal; "plain bad request")]
    #[test_case(401, "" => ResponseOutcome::Fatal; "unauthorized")]
    #[test_case(404, "" => ResponseOutcome::Fatal; "not found")]
    fn test_default_rules(status: u16, body: &str) -> ResponseOutcome {
        FailureClassifier::default().classify(status, body)
    }

    #[test]
    fn test_benign_empty_requires_body_match() {
        let classifier = FailureClassifier::default();

        let body = r#"{"Message": "No items found with given filter."}"#;
        assert_eq!(classifier.classify(400, body), ResponseOutcome::BenignEmpty);

        // The same body on a 5xx is still retriable
        assert_eq!(classifier.classify(500, body), ResponseOutcome::Retriable);
    }

    #[test]
    fn test_extra_retry_statuses() {
        let classifier = FailureClassifier::with_extra_statuses([408, 425]);
        assert_eq!(classifier.classify(408, ""), ResponseOutcome::Retriable);
        assert_eq!(classifier.classify(425, ""), ResponseOutcome::Retriable);
        // Defaults still apply
        assert_eq!(classifier.classify(429, ""), ResponseOutcome::Retriable);
        assert_eq!(classifier.classify(400, ""), ResponseOutcome::Fatal);
    }
}
