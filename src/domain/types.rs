//! Shared identifier and kind types for feedback flows

use crate::domain::errors::FlowError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for flow session IDs (UUIDv7, time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for cached feedback event IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two feedback UX flows a session can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    /// Multi-step flow that accumulates cached events until finished
    Detailed,
    /// Single-step flow producing one feedback item
    Arrival,
}

impl FlowKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Detailed => "detailed",
            FlowKind::Arrival => "arrival",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detailed" => Ok(FlowKind::Detailed),
            "arrival" => Ok(FlowKind::Arrival),
            _ => Err(FlowError::InvalidKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_kind_parse() {
        assert_eq!("detailed".parse::<FlowKind>().unwrap(), FlowKind::Detailed);
        assert_eq!("Arrival".parse::<FlowKind>().unwrap(), FlowKind::Arrival);
        assert_eq!(" detailed ".parse::<FlowKind>().unwrap(), FlowKind::Detailed);
    }

    #[test]
    fn test_flow_kind_parse_invalid() {
        let err = "survey".parse::<FlowKind>().unwrap_err();
        assert!(matches!(err, FlowError::InvalidKind(ref k) if k == "survey"));
    }

    #[test]
    fn test_flow_kind_round_trips_through_as_str() {
        for kind in [FlowKind::Detailed, FlowKind::Arrival] {
            assert_eq!(kind.as_str().parse::<FlowKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_session_ids_are_unique_and_sortable() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_flow_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&FlowKind::Arrival).unwrap(), "\"arrival\"");
    }
}
