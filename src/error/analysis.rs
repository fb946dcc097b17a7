// Analysis error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Analysis error code constants
///
/// Single source of truth for the numeric codes reported by the CLI and
/// carried in serialized error payloads.
///
/// Error code range: 1001-1007
pub struct AnalysisErrorCodes {}

impl AnalysisErrorCodes {
    /// Audio file does not exist
    pub const FILE_NOT_FOUND: i32 = 1001;

    /// Audio file exists but could not be read
    pub const IO: i32 = 1002;

    /// Container or codec is not supported
    pub const UNSUPPORTED_FORMAT: i32 = 1003;

    /// Stream is corrupt or produced no samples
    pub const DECODE: i32 = 1004;

    /// Configuration or call argument is malformed
    pub const INVALID_ARGUMENT: i32 = 1005;

    /// Caller-level timeout elapsed before analysis finished
    pub const TIMEOUT: i32 = 1006;

    /// An analysis worker thread panicked
    pub const WORKER_PANICKED: i32 = 1007;
}

/// Log an analysis error with structured context
///
/// Emits the numeric code, the failing component and the message so log
/// scrapers can group failures without parsing free text.
pub fn log_analysis_error(err: &AnalysisError, context: &str) {
    error!(
        "Analysis error in {}: code={}, component=AudioAnalyzer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Analysis-related errors
///
/// Loader failures (`FileNotFound`, `Io`, `UnsupportedFormat`, `Decode`)
/// abort the whole analysis. `InvalidArgument` is raised before any
/// computation starts. Degenerate audio (silence, no rhythm) is never an
/// error: it yields empty result collections instead.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Audio file does not exist
    FileNotFound { path: String },

    /// Audio file could not be opened or read
    Io { path: String, details: String },

    /// No decoder or demuxer for the file
    UnsupportedFormat { path: String, details: String },

    /// Corrupt stream or empty decode
    Decode { path: String, details: String },

    /// Malformed configuration or per-call argument
    InvalidArgument { name: String, reason: String },

    /// Analysis exceeded the caller-supplied timeout
    Timeout { seconds: u64 },

    /// A worker thread panicked while analysing
    WorkerPanicked { component: String },
}

impl AnalysisError {
    /// Shorthand for building an [`AnalysisError::InvalidArgument`].
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for every failure caused by the input file (missing, unreadable, undecodable).
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            AnalysisError::FileNotFound { .. }
                | AnalysisError::Io { .. }
                | AnalysisError::UnsupportedFormat { .. }
                | AnalysisError::Decode { .. }
        )
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, AnalysisError::InvalidArgument { .. })
    }
}

impl ErrorCode for AnalysisError {
    fn code(&self) -> i32 {
        match self {
            AnalysisError::FileNotFound { .. } => AnalysisErrorCodes::FILE_NOT_FOUND,
            AnalysisError::Io { .. } => AnalysisErrorCodes::IO,
            AnalysisError::UnsupportedFormat { .. } => AnalysisErrorCodes::UNSUPPORTED_FORMAT,
            AnalysisError::Decode { .. } => AnalysisErrorCodes::DECODE,
            AnalysisError::InvalidArgument { .. } => AnalysisErrorCodes::INVALID_ARGUMENT,
            AnalysisError::Timeout { .. } => AnalysisErrorCodes::TIMEOUT,
            AnalysisError::WorkerPanicked { .. } => AnalysisErrorCodes::WORKER_PANICKED,
        }
    }

    fn message(&self) -> String {
        match self {
            AnalysisError::FileNotFound { path } => {
                format!("Audio file not found: {}", path)
            }
            AnalysisError::Io { path, details } => {
                format!("Failed to read {}: {}", path, details)
            }
            AnalysisError::UnsupportedFormat { path, details } => {
                format!("Unsupported audio format for {}: {}", path, details)
            }
            AnalysisError::Decode { path, details } => {
                format!("Failed to decode {}: {}", path, details)
            }
            AnalysisError::InvalidArgument { name, reason } => {
                format!("Invalid argument '{}': {}", name, reason)
            }
            AnalysisError::Timeout { seconds } => {
                format!("Analysis did not finish within {}s", seconds)
            }
            AnalysisError::WorkerPanicked { component } => {
                format!("Analysis worker panicked in {}", component)
            }
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AnalysisError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AnalysisError {}
