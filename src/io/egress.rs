//! Feedback egress - writes finished flows to file
//!
//! Each finished flow becomes one JSON object per line (JSONL) in the file
//! specified in config. The writer is an ordinary listener: register it with
//! the coordinator and it receives every finished flow.

use crate::domain::feedback::{CachedFeedbackEvent, FeedbackEvents, FeedbackItem};
use crate::domain::types::FlowKind;
use crate::services::registry::FeedbackFlowListener;
use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// One egress line
#[derive(Debug, Serialize)]
struct EgressRecord<'a> {
    app: &'a str,
    kind: FlowKind,
    written_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<&'a [CachedFeedbackEvent]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<&'a FeedbackItem>,
}

/// Listener that appends finished flows to a JSONL file
pub struct FeedbackEgress {
    file_path: String,
    app_id: String,
    /// Serializes appends so lines from concurrent dispatches never interleave
    write_lock: Mutex<()>,
}

impl FeedbackEgress {
    pub fn new(file_path: &str, app_id: &str) -> Self {
        info!(file_path = %file_path, app_id = %app_id, "egress_initialized");
        Self {
            file_path: file_path.to_string(),
            app_id: app_id.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    fn write_record(&self, record: &EgressRecord<'_>) -> anyhow::Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize egress record")?;
        self.append_line(&line)
            .with_context(|| format!("Failed to append to {}", self.file_path))
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);
        let _guard = self.write_lock.lock();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}

impl FeedbackFlowListener for FeedbackEgress {
    fn on_detailed_feedback_flow_finished(&self, events: FeedbackEvents) -> anyhow::Result<()> {
        self.write_record(&EgressRecord {
            app: &self.app_id,
            kind: FlowKind::Detailed,
            written_at: Utc::now().to_rfc3339(),
            events: Some(&events[..]),
            item: None,
        })?;
        info!(events = %events.len(), "detailed_feedback_egressed");
        Ok(())
    }

    fn on_arrival_experience_feedback_finished(&self, item: &FeedbackItem) -> anyhow::Result<()> {
        self.write_record(&EgressRecord {
            app: &self.app_id,
            kind: FlowKind::Arrival,
            written_at: Utc::now().to_rfc3339(),
            events: None,
            item: Some(item),
        })?;
        info!(rating = %item.rating, "arrival_feedback_egressed");
        Ok(())
    }

    fn name(&self) -> &str {
        "feedback_egress"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SessionId;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn events(session_id: SessionId) -> FeedbackEvents {
        vec![
            CachedFeedbackEvent::new(session_id, "wrong_route", "missed the exit")
                .with_sub_type("highway"),
            CachedFeedbackEvent::new(session_id, "no_voice", "no guidance at the roundabout"),
        ]
        .into()
    }

    #[test]
    fn test_egress_new() {
        let egress = FeedbackEgress::new("test.jsonl", "navigation");
        assert_eq!(egress.file_path(), "test.jsonl");
        assert_eq!(egress.name(), "feedback_egress");
    }

    #[test]
    fn test_write_detailed_flow() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("feedback.jsonl");
        let egress = FeedbackEgress::new(file_path.to_str().unwrap(), "navigation");

        let session_id = SessionId::new();
        egress.on_detailed_feedback_flow_finished(events(session_id)).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["app"], "navigation");
        assert_eq!(parsed["kind"], "detailed");
        assert!(parsed["written_at"].is_string());
        assert!(parsed.get("item").is_none());

        let written = parsed["events"].as_array().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0]["category"], "wrong_route");
        assert_eq!(written[0]["sub_types"][0], "highway");
        assert_eq!(written[1]["category"], "no_voice");
        assert_eq!(written[1]["session_id"], session_id.to_string());
    }

    #[test]
    fn test_write_arrival_feedback() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("feedback.jsonl");
        let egress = FeedbackEgress::new(file_path.to_str().unwrap(), "navigation");

        let item = FeedbackItem::new(5).with_comment("smooth trip");
        egress.on_arrival_experience_feedback_finished(&item).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["kind"], "arrival");
        assert_eq!(parsed["item"]["rating"], 5);
        assert_eq!(parsed["item"]["comment"], "smooth trip");
        assert!(parsed.get("events").is_none());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("feedback.jsonl");
        let egress = FeedbackEgress::new(nested_path.to_str().unwrap(), "navigation");

        egress.on_arrival_experience_feedback_finished(&FeedbackItem::new(3)).unwrap();
        assert!(nested_path.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("feedback.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = FeedbackEgress::new(file_path.to_str().unwrap(), "navigation");
        egress.on_arrival_experience_feedback_finished(&FeedbackItem::new(4)).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains("arrival"));
    }

    #[test]
    fn test_unwritable_path_reports_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending
        let egress = FeedbackEgress::new(dir.path().to_str().unwrap(), "navigation");

        let err = egress.on_arrival_experience_feedback_finished(&FeedbackItem::new(1)).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to append"));
    }

    #[test]
    fn test_concurrent_writes_keep_lines_whole() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("feedback.jsonl");
        let egress = Arc::new(FeedbackEgress::new(file_path.to_str().unwrap(), "navigation"));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let egress = egress.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        egress.on_detailed_feedback_flow_finished(events(SessionId::new())).unwrap();
                    }
                    t
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 100);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["events"].as_array().unwrap().len(), 2);
        }
    }
}
