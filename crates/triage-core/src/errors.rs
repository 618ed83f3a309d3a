//! Error hierarchy for call coordination.
//!
//! [`CallError`] covers everything that can go wrong while routing a call's
//! traffic. None of these errors are fatal to the server: handlers log them at
//! the level returned by [`CallError::severity`] and keep serving.

use std::fmt;

use thiserror::Error;

use crate::ids::CallId;

/// Coarse classification used for log fields and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or unexpected client input.
    Protocol,
    /// Session-table conflicts.
    Session,
    /// A message addressed to a party that is not connected.
    Routing,
    /// Model call failed or returned garbage.
    Inference,
    /// Media payload could not be decoded.
    Media,
    /// Work stopped because the call ended.
    Lifecycle,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protocol => "protocol",
            Self::Session => "session",
            Self::Routing => "routing",
            Self::Inference => "inference",
            Self::Media => "media",
            Self::Lifecycle => "lifecycle",
        })
    }
}

/// How loudly an error should be logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected during normal operation; debug-level.
    Expected,
    /// Worth a warning but recoverable.
    Warning,
}

/// Errors raised while coordinating a call.
#[derive(Debug, Error)]
pub enum CallError {
    /// Client sent something that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A `call_initiated` arrived for an identifier that is already live.
    #[error("call {0} already exists")]
    DuplicateSession(CallId),

    /// Message for a call, or a call's party, that is not present.
    #[error("no route for call {call_id}: {detail}")]
    RoutingMiss {
        /// The addressed call.
        call_id: CallId,
        /// What was missing.
        detail: &'static str,
    },

    /// The inference collaborator failed; `class` names the failure kind.
    #[error("inference failed ({class}): {message}")]
    Inference {
        /// Short failure class, surfaced in degraded reports.
        class: String,
        /// Human-readable detail.
        message: String,
    },

    /// A camera frame payload was not valid base64 image data.
    #[error("frame decode failed: {0}")]
    FrameDecode(String),

    /// Work was abandoned because the call ended.
    #[error("cancelled")]
    Cancelled,
}

impl CallError {
    /// Shorthand for a routing miss.
    #[must_use]
    pub fn routing(call_id: CallId, detail: &'static str) -> Self {
        Self::RoutingMiss { call_id, detail }
    }

    /// Classification for metrics and log fields.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::DuplicateSession(_) => ErrorCategory::Session,
            Self::RoutingMiss { .. } => ErrorCategory::Routing,
            Self::Inference { .. } => ErrorCategory::Inference,
            Self::FrameDecode(_) => ErrorCategory::Media,
            Self::Cancelled => ErrorCategory::Lifecycle,
        }
    }

    /// Suggested log level.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::RoutingMiss { .. } | Self::Cancelled => ErrorSeverity::Expected,
            _ => ErrorSeverity::Warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            CallError::DuplicateSession(CallId::from("X")).to_string(),
            "call X already exists"
        );
        assert_eq!(
            CallError::routing(CallId::from("X"), "no dispatcher").to_string(),
            "no route for call X: no dispatcher"
        );
        let err = CallError::Inference {
            class: "Timeout".into(),
            message: "deadline elapsed".into(),
        };
        assert_eq!(err.to_string(), "inference failed (Timeout): deadline elapsed");
    }

    #[test]
    fn categories_and_severity() {
        assert_eq!(
            CallError::Protocol("x".into()).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(CallError::Cancelled.category().to_string(), "lifecycle");
        assert_eq!(
            CallError::routing(CallId::from("X"), "gone").severity(),
            ErrorSeverity::Expected
        );
        assert_eq!(
            CallError::FrameDecode("bad".into()).severity(),
            ErrorSeverity::Warning
        );
    }
}
