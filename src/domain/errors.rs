//! Errors surfaced by flow sessions and the coordinator
//!
//! Every variant is a local, deterministic logic error. Nothing here is
//! retried and nothing is swallowed: callers get the error back unchanged.

use crate::domain::types::{EventId, FlowKind, SessionId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("unknown flow kind '{0}'")]
    InvalidKind(String),

    #[error("session {0} is not active")]
    SessionNotActive(SessionId),

    #[error("session {0} already completed")]
    AlreadyCompleted(SessionId),

    #[error("session {session} has kind {actual}, expected {expected}")]
    WrongKind { session: SessionId, expected: FlowKind, actual: FlowKind },

    #[error("event belongs to session {event_session}, not {session}")]
    SessionMismatch { session: SessionId, event_session: SessionId },

    #[error("event {event} already recorded in session {session}")]
    DuplicateEvent { session: SessionId, event: EventId },

    #[error("arrival session {0} has no feedback item")]
    MissingItem(SessionId),
}

impl FlowError {
    /// Short snake_case label for structured logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::InvalidKind(_) => "invalid_kind",
            FlowError::SessionNotActive(_) => "session_not_active",
            FlowError::AlreadyCompleted(_) => "already_completed",
            FlowError::WrongKind { .. } => "wrong_kind",
            FlowError::SessionMismatch { .. } => "session_mismatch",
            FlowError::DuplicateEvent { .. } => "duplicate_event",
            FlowError::MissingItem(_) => "missing_item",
        }
    }
}
