//! Error types for livefeed
//!
//! A single `Error` enum covers every failure the change-feed layer can
//! observe. Only a small part of it ever reaches a caller as an `Err`:
//!
//! - **Caller errors**: `InvalidDescriptor`, `DuplicateSubscription`. These
//!   are programming bugs and fail fast at `open`/`supervise` time.
//! - **Transport errors**: `Transport`. These are recoverable; the
//!   supervisor turns them into a scheduled reconnection and a `last_error`
//!   string rather than propagating them.
//! - **Payload errors**: `MalformedEvent`, `UnknownChangeKind`,
//!   `Serialization`. Raised by the codec and swallowed (logged and dropped)
//!   by the connection, never fatal to it.
//!
//! # Examples
//!
//! ```rust
//! use livefeed_core::Error;
//!
//! let error = Error::DuplicateSubscription("daily-42-2024-05-01".into());
//! assert!(!error.is_recoverable());
//!
//! let error = Error::Transport("socket reset".into());
//! assert!(error.is_recoverable());
//! ```

use thiserror::Error;

/// Result type for livefeed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for livefeed operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A subscription with this name is already open (or supervised) locally.
    ///
    /// Names are derived by callers from screen type, owner id and time
    /// bucket; two live connections under one name would leak, so the second
    /// request is rejected instead of overwriting the first.
    #[error("Subscription already open: {0}")]
    DuplicateSubscription(String),

    /// The subscription descriptor failed validation
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The remote change-feed transport reported a failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A change event arrived without the data needed to apply it
    ///
    /// Typically a missing identity field or a record that does not
    /// deserialize into the screen's record type.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A change event carried a kind tag other than insert/update/delete
    #[error("Unknown change kind: {0}")]
    UnknownChangeKind(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The supervision task for a handle is no longer running
    #[error("Supervisor stopped")]
    SupervisorStopped,

    /// Building a supervisor or its telemetry failed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Returns true if a fresh connection attempt may succeed after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DuplicateSubscription("weekly-7".into());
        assert_eq!(err.to_string(), "Subscription already open: weekly-7");

        let err = Error::UnknownChangeKind("TRUNCATE".into());
        assert_eq!(err.to_string(), "Unknown change kind: TRUNCATE");

        assert_eq!(Error::SupervisorStopped.to_string(), "Supervisor stopped");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Transport("timeout".into()).is_recoverable());
        assert!(!Error::InvalidDescriptor("empty name".into()).is_recoverable());
        assert!(!Error::DuplicateSubscription("x".into()).is_recoverable());
        assert!(!Error::SupervisorStopped.is_recoverable());
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = serde_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
