//! Unified error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Configuration,
    Storage,
    Serialization,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Run the interactive authorization flow again.
    Reauthorize,
    RetryWithBackoff,
    CheckConfiguration,
    /// The credential file location is unreadable or unwritable.
    CheckStorage,
    ContactSupport,
}
