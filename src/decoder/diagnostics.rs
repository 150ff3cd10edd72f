//! Classification of receiver diagnostics that must reach the operator

use thiserror::Error;

/// Substrings that mark a receiver line as a failure report
const FAILURE_MARKERS: &[&str] = &["fail", "fatal", "error", "cannot open", "device not found"];

/// Routine statistics lines that contain failure markers but are harmless
const BENIGN_DIAGNOSTICS: &[&str] = &[
    "cpr attempts that failed the range check",
    "cpr attempts that failed the speed check",
    "cpr messages that look like transponder failures filtered",
    "accepted with 1-bit error repaired",
];

/// A problem with the receiver itself, as opposed to a message it decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamFailure {
    #[error("receiver reported: {0}")]
    Diagnostic(String),

    #[error("receiver exited: {0}")]
    Exited(String),
}

/// Returns a failure when `line` reports a receiver problem that is not on
/// the benign allow-list
pub fn classify(line: &str) -> Option<UpstreamFailure> {
    let lower = line.to_lowercase();
    let flagged = FAILURE_MARKERS.iter().any(|marker| lower.contains(marker));
    if !flagged || BENIGN_DIAGNOSTICS.iter().any(|benign| lower.contains(benign)) {
        return None;
    }
    Some(UpstreamFailure::Diagnostic(line.trim().to_string()))
}
