//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `coordinator` - Flow lifecycle entry point and listener dispatch
//! - `session` - Per-flow state machine and the session table
//! - `buffer` - Ordered, de-duplicated event cache of a detailed flow
//! - `registry` - Listener trait and registration set

pub mod buffer;
pub mod coordinator;
pub mod registry;
pub mod session;

// Re-export commonly used types
pub use buffer::CachedFeedbackBuffer;
pub use coordinator::FeedbackCoordinator;
pub use registry::{DispatchReport, FeedbackFlowListener, ListenerRegistry};
pub use session::{FlowSession, SessionState, SessionStore};
