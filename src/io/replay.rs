//! Flow script replay
//!
//! Drives a coordinator from a JSONL script, one action per line:
//!
//! ```text
//! {"op":"start","flow":"trip","kind":"detailed"}
//! {"op":"record","flow":"trip","category":"wrong_route","description":"missed exit"}
//! {"op":"finish","flow":"trip"}
//! {"op":"arrival","rating":5,"comment":"smooth trip"}
//! ```
//!
//! Flows are addressed by script labels. A label that was never started maps
//! to a fresh session id, so actions on it are rejected like any unknown
//! session. Rejected actions are logged and counted; they never stop a replay.

use crate::domain::errors::FlowError;
use crate::domain::feedback::{CachedFeedbackEvent, FeedbackItem};
use crate::domain::types::SessionId;
use crate::services::coordinator::FeedbackCoordinator;
use anyhow::Context;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// One scripted coordinator call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptAction {
    Start {
        flow: String,
        #[serde(default = "default_kind")]
        kind: String,
    },
    Record {
        flow: String,
        category: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        sub_types: Vec<String>,
    },
    Finish {
        flow: String,
    },
    Arrival {
        rating: u8,
        #[serde(default)]
        comment: Option<String>,
    },
    ArrivalStart {
        flow: String,
    },
    ArrivalFinish {
        flow: String,
        rating: u8,
        #[serde(default)]
        comment: Option<String>,
    },
}

fn default_kind() -> String {
    "detailed".to_string()
}

impl ScriptAction {
    pub fn op(&self) -> &'static str {
        match self {
            ScriptAction::Start { .. } => "start",
            ScriptAction::Record { .. } => "record",
            ScriptAction::Finish { .. } => "finish",
            ScriptAction::Arrival { .. } => "arrival",
            ScriptAction::ArrivalStart { .. } => "arrival_start",
            ScriptAction::ArrivalFinish { .. } => "arrival_finish",
        }
    }
}

/// Outcome counts of one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Parse a script. Blank lines and lines starting with `#` are skipped.
pub fn parse_script(content: &str) -> anyhow::Result<Vec<ScriptAction>> {
    let mut actions = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let action: ScriptAction = serde_json::from_str(line)
            .with_context(|| format!("Invalid script action on line {}", idx + 1))?;
        actions.push(action);
    }
    Ok(actions)
}

/// Read and parse a script file
pub fn load_script<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<ScriptAction>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&content).with_context(|| format!("Failed to parse script {}", path.display()))
}

/// Applies script actions to a coordinator
pub struct Replayer<'a> {
    coordinator: &'a FeedbackCoordinator,
    flows: FxHashMap<String, SessionId>,
}

impl<'a> Replayer<'a> {
    pub fn new(coordinator: &'a FeedbackCoordinator) -> Self {
        Self { coordinator, flows: FxHashMap::default() }
    }

    /// Session id bound to a label, if the label was started
    pub fn session(&self, flow: &str) -> Option<SessionId> {
        self.flows.get(flow).copied()
    }

    pub fn run(&mut self, actions: &[ScriptAction]) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        for (idx, action) in actions.iter().enumerate() {
            match self.apply(action) {
                Ok(()) => {
                    summary.applied += 1;
                    debug!(step = %idx, op = %action.op(), "script_action_applied");
                }
                Err(e) => {
                    summary.rejected += 1;
                    warn!(
                        step = %idx,
                        op = %action.op(),
                        reason = %e.kind(),
                        error = %e,
                        "script_action_rejected"
                    );
                }
            }
        }
        summary
    }

    fn apply(&mut self, action: &ScriptAction) -> Result<(), FlowError> {
        match action {
            ScriptAction::Start { flow, kind } => {
                let session_id = self.coordinator.start_flow(kind)?;
                self.flows.insert(flow.clone(), session_id);
            }
            ScriptAction::Record { flow, category, description, sub_types } => {
                let session_id = self.resolve(flow);
                let mut event = CachedFeedbackEvent::new(session_id, category, description);
                for sub_type in sub_types {
                    event = event.with_sub_type(sub_type);
                }
                self.coordinator.record_feedback(session_id, event)?;
            }
            ScriptAction::Finish { flow } => {
                self.coordinator.finish_detailed_flow(self.resolve(flow))?;
            }
            ScriptAction::Arrival { rating, comment } => {
                self.coordinator.submit_arrival_feedback(item(*rating, comment.as_deref()))?;
            }
            ScriptAction::ArrivalStart { flow } => {
                let session_id = self.coordinator.start_arrival_flow();
                self.flows.insert(flow.clone(), session_id);
            }
            ScriptAction::ArrivalFinish { flow, rating, comment } => {
                let session_id = self.resolve(flow);
                self.coordinator.finish_arrival_flow(session_id, item(*rating, comment.as_deref()))?;
            }
        }
        Ok(())
    }

    fn resolve(&mut self, flow: &str) -> SessionId {
        *self.flows.entry(flow.to_string()).or_default()
    }
}

fn item(rating: u8, comment: Option<&str>) -> FeedbackItem {
    let item = FeedbackItem::new(rating);
    match comment {
        Some(comment) => item.with_comment(comment),
        None => item,
    }
}
