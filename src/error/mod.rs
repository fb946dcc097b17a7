// Error types for the beatsync analysis service
//
// This module defines the error taxonomy surfaced by the loader, the analyzer
// and the keyframe generators, with stable numeric codes so callers at the
// editing-layer boundary can branch on them without string matching.

mod analysis;

pub use analysis::{log_analysis_error, AnalysisError, AnalysisErrorCodes};

/// Stable numeric code plus a human-readable message for an error value
///
/// Codes are grouped per error family (1000-range for analysis) and never
/// reused, so they can be logged and compared across releases.
pub trait ErrorCode {
    fn code(&self) -> i32;

    /// Message without the code or variant prefix
    fn message(&self) -> String;
}
