//! Feedback values produced by the detailed and arrival flows

use crate::domain::types::{epoch_ms, EventId, FlowKind, SessionId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// One piece of feedback captured mid-flow during a detailed feedback flow.
///
/// Immutable once built. The buffer of the owning session holds it until the
/// flow finishes and the whole sequence is handed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFeedbackEvent {
    pub id: EventId,
    pub session_id: SessionId,
    pub ts: u64, // epoch ms
    /// Reason code, e.g. "wrong_route" or "no_voice"
    pub category: String,
    /// Free-text detail entered by the user
    pub description: String,
    /// Optional sub-reason codes
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub sub_types: SmallVec<[String; 2]>,
}

impl CachedFeedbackEvent {
    /// Create a new event for a session, stamped with a fresh id and the current time.
    ///
    /// # Example
    ///
    /// ```
    /// use feedback_flow::domain::feedback::CachedFeedbackEvent;
    /// use feedback_flow::domain::types::SessionId;
    ///
    /// let session = SessionId::new();
    /// let event = CachedFeedbackEvent::new(session, "wrong_route", "took a closed road")
    ///     .with_sub_type("road_closed");
    /// assert_eq!(event.session_id, session);
    /// assert_eq!(event.sub_types.as_slice(), ["road_closed"]);
    /// ```
    pub fn new(session_id: SessionId, category: &str, description: &str) -> Self {
        Self {
            id: EventId::new(),
            session_id,
            ts: epoch_ms(),
            category: category.to_string(),
            description: description.to_string(),
            sub_types: SmallVec::new(),
        }
    }

    pub fn with_sub_type(mut self, sub_type: &str) -> Self {
        self.sub_types.push(sub_type.to_string());
        self
    }

    pub fn with_timestamp(mut self, ts: u64) -> Self {
        self.ts = ts;
        self
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }
}

/// Outcome of the single-step arrival experience flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Rating or selection code chosen on the arrival screen
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub ts: u64, // epoch ms
}

impl FeedbackItem {
    pub fn new(rating: u8) -> Self {
        Self { rating, comment: None, ts: epoch_ms() }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn with_timestamp(mut self, ts: u64) -> Self {
        self.ts = ts;
        self
    }
}

/// Ordered events of a finished detailed flow, shared by every listener
pub type FeedbackEvents = Arc<[CachedFeedbackEvent]>;

/// What a completed session hands over for dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum FinalPayload {
    Detailed(FeedbackEvents),
    Arrival(FeedbackItem),
}

impl FinalPayload {
    pub fn kind(&self) -> FlowKind {
        match self {
            FinalPayload::Detailed(_) => FlowKind::Detailed,
            FinalPayload::Arrival(_) => FlowKind::Arrival,
        }
    }
}
