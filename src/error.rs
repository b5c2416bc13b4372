//! Error types for the call-session orchestration layer

use thiserror::Error;

/// Result type for call-session-core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the orchestration core
///
/// Nothing in this crate is allowed to raise an unhandled fault that kills the
/// event loop: every external callback handler catches, logs, and degrades.
/// These variants exist for the narrow set of fallible control operations
/// (registration, engine control) and for surfacing failures to callers that
/// asked for them explicitly.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The VoIP engine rejected or failed a control operation
    #[error("Engine error: {message}")]
    Engine { message: String },

    /// Registration with the signaling server failed
    #[error("Registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// An operation was requested in a state that does not allow it
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Audio route negotiation failed
    #[error("Audio route error: {message}")]
    AudioRoute { message: String },

    /// An operation did not complete within its deadline
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Invalid configuration
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Create an engine error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Create a registration failure
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an audio route error
    pub fn audio_route(message: impl Into<String>) -> Self {
        Self::AudioRoute {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the failed operation can reasonably succeed
    ///
    /// Registration failures, timeouts, and transient engine errors are
    /// retried by the recovery helpers; configuration and state errors are
    /// not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Engine { .. } | Self::RegistrationFailed { .. } | Self::Timeout { .. }
        )
    }

    /// Coarse category used in log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::Engine { .. } => "engine",
            Self::RegistrationFailed { .. } => "registration",
            Self::InvalidState { .. } => "state",
            Self::AudioRoute { .. } => "audio",
            Self::Timeout { .. } => "timeout",
            Self::InvalidConfiguration { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(CoreError::registration_failed("503").is_recoverable());
        assert!(CoreError::Timeout { seconds: 5 }.is_recoverable());
        assert!(!CoreError::invalid_state("no call").is_recoverable());
        assert!(!CoreError::internal("bug").is_recoverable());
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(CoreError::engine("x").category(), "engine");
        assert_eq!(CoreError::audio_route("x").category(), "audio");
    }
}
