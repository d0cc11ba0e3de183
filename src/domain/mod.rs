//! Domain models - feedback values, identifiers and errors
//!
//! This module contains the canonical data types used throughout the crate:
//! - `CachedFeedbackEvent` - one unit of feedback captured during a detailed flow
//! - `FeedbackItem` - the single result of an arrival experience flow
//! - `SessionId` / `EventId` / `FlowKind` - identity and kind of a flow
//! - `FlowError` - errors surfaced to callers of the coordinator

pub mod errors;
pub mod feedback;
pub mod types;

// Re-export commonly used types at module level
pub use errors::FlowError;
pub use feedback::{CachedFeedbackEvent, FeedbackEvents, FeedbackItem, FinalPayload};
pub use types::{EventId, FlowKind, SessionId};
