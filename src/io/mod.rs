//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `egress` - Finished flows to file (JSONL format)
//! - `replay` - JSONL flow scripts driving a coordinator

pub mod egress;
pub mod replay;

// Re-export commonly used types
pub use egress::FeedbackEgress;
pub use replay::{load_script, parse_script, ReplaySummary, Replayer, ScriptAction};
