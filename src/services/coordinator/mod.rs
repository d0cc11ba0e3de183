//! Feedback flow coordination
//!
//! The coordinator is the single entry point for flow-driving UI code. It
//! ties the session lifecycle to listener dispatch:
//! - detailed flows: start, record cached events, finish, dispatch the events
//! - arrival flows: submit one item, dispatch it immediately
//!
//! It is an explicit instance owned by the navigation session owner and
//! shared by reference (`Arc<FeedbackCoordinator>`) with flow-driving code.


use crate::domain::errors::FlowError;
use crate::domain::feedback::{CachedFeedbackEvent, FeedbackItem, FinalPayload};
use crate::domain::types::{FlowKind, SessionId};
use crate::infra::metrics::Metrics;
use crate::services::registry::{DispatchReport, FeedbackFlowListener, ListenerRegistry};
use crate::services::session::{FlowSession, SessionStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Owns the flow sessions and the listener registry of one navigation session
pub struct FeedbackCoordinator {
    /// Open sessions plus a bounded tail of completed ones
    sessions: SessionStore,
    /// Observers notified when a flow finishes
    listeners: ListenerRegistry,
    /// Metrics collector
    metrics: Arc<Metrics>,
}

impl FeedbackCoordinator {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    /// Create a coordinator reporting into a shared metrics collector
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self { sessions: SessionStore::new(), listeners: ListenerRegistry::new(), metrics }
    }

    /// Keep at most `limit` finished flows for `AlreadyCompleted` reporting.
    ///
    /// Older finished flows are forgotten automatically. Call before any flow
    /// is started; sessions opened earlier are dropped.
    pub fn with_retained_completed(mut self, limit: usize) -> Self {
        self.sessions = SessionStore::with_retained_completed(limit);
        self
    }

    /// Open a detailed feedback flow
    pub fn start_detailed_flow(&self) -> SessionId {
        let session_id = self.sessions.open(FlowKind::Detailed);
        self.metrics.record_detailed_started();

        info!(session_id = %session_id, kind = "detailed", "flow_started");
        session_id
    }

    /// Open an arrival flow whose item is supplied later by `finish_arrival_flow`
    pub fn start_arrival_flow(&self) -> SessionId {
        let session_id = self.sessions.open(FlowKind::Arrival);
        self.metrics.record_arrival_started();

        info!(session_id = %session_id, kind = "arrival", "flow_started");
        session_id
    }

    /// Open a flow by kind name ("detailed" or "arrival")
    pub fn start_flow(&self, kind: &str) -> Result<SessionId, FlowError> {
        let kind: FlowKind = kind.parse().map_err(|e| self.rejected("start_flow", e))?;
        Ok(match kind {
            FlowKind::Detailed => self.start_detailed_flow(),
            FlowKind::Arrival => self.start_arrival_flow(),
        })
    }

    /// Buffer one cached feedback event in an active detailed flow
    pub fn record_feedback(
        &self,
        session_id: SessionId,
        event: CachedFeedbackEvent,
    ) -> Result<(), FlowError> {
        let category = event.category.clone();
        let buffered = self
            .sessions
            .append_event(session_id, event)
            .map_err(|e| self.rejected("record_feedback", e))?;
        self.metrics.record_event();

        debug!(
            session_id = %session_id,
            category = %category,
            buffered = %buffered,
            "feedback_recorded"
        );
        Ok(())
    }

    /// Complete a detailed flow and hand its events to every listener.
    ///
    /// The events are moved out of the session; the coordinator keeps no
    /// reference to them once listeners have been notified.
    pub fn finish_detailed_flow(&self, session_id: SessionId) -> Result<DispatchReport, FlowError> {
        let events = self
            .sessions
            .complete_detailed(session_id)
            .map_err(|e| self.rejected("finish_detailed_flow", e))?;

        Ok(self.dispatch(session_id, FinalPayload::Detailed(events)))
    }

    /// Submit arrival feedback as one atomic open-complete-dispatch step.
    ///
    /// Nothing is buffered and no session is retained afterwards.
    pub fn submit_arrival_feedback(&self, item: FeedbackItem) -> Result<DispatchReport, FlowError> {
        let mut session = FlowSession::arrival(item);
        let session_id = session.id();
        self.metrics.record_arrival_started();

        let item = session
            .complete_arrival()
            .map_err(|e| self.rejected("submit_arrival_feedback", e))?;

        Ok(self.dispatch(session_id, FinalPayload::Arrival(item)))
    }

    /// Complete an arrival flow opened with `start_arrival_flow`
    pub fn finish_arrival_flow(
        &self,
        session_id: SessionId,
        item: FeedbackItem,
    ) -> Result<DispatchReport, FlowError> {
        let item = self
            .sessions
            .complete_with_item(session_id, item)
            .map_err(|e| self.rejected("finish_arrival_flow", e))?;

        Ok(self.dispatch(session_id, FinalPayload::Arrival(item)))
    }

    /// Notify listeners of a completed flow and record the outcome
    fn dispatch(&self, session_id: SessionId, payload: FinalPayload) -> DispatchReport {
        let kind = payload.kind();
        let start = Instant::now();
        let report = match &payload {
            FinalPayload::Detailed(events) => self.listeners.notify_detailed_finished(events),
            FinalPayload::Arrival(item) => self.listeners.notify_arrival_finished(item),
        };
        let latency_us = start.elapsed().as_micros() as u64;

        match payload {
            FinalPayload::Detailed(events) => {
                self.metrics.record_detailed_finished(report.delivered, report.failed, latency_us);
                info!(
                    session_id = %session_id,
                    kind = %kind,
                    events = %events.len(),
                    delivered = %report.delivered,
                    failed = %report.failed,
                    dispatch_us = %latency_us,
                    "flow_finished"
                );
            }
            FinalPayload::Arrival(item) => {
                self.metrics.record_arrival_finished(report.delivered, report.failed, latency_us);
                info!(
                    session_id = %session_id,
                    kind = %kind,
                    rating = %item.rating,
                    has_comment = %item.comment.is_some(),
                    delivered = %report.delivered,
                    failed = %report.failed,
                    dispatch_us = %latency_us,
                    "arrival_feedback_finished"
                );
            }
        }
        report
    }

    /// Register a listener. Registering the same instance twice is a no-op.
    pub fn register_listener(&self, listener: Arc<dyn FeedbackFlowListener>) -> bool {
        self.listeners.register(listener)
    }

    /// Unregister a listener. Unknown listeners are ignored.
    pub fn unregister_listener(&self, listener: &Arc<dyn FeedbackFlowListener>) -> bool {
        self.listeners.unregister(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Check whether a flow is open and accepting feedback
    pub fn is_active(&self, session_id: SessionId) -> bool {
        self.sessions.is_active(session_id)
    }

    /// Number of flows started but not yet finished
    pub fn active_flow_count(&self) -> usize {
        self.sessions.active_count()
    }

    /// Drop every retained finished flow now. Returns how many were dropped.
    ///
    /// Afterwards those ids are unknown and report `SessionNotActive`.
    pub fn prune_completed(&self) -> usize {
        let removed = self.sessions.prune_completed();
        if removed > 0 {
            info!(removed = %removed, "completed_flows_pruned");
        }
        removed
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn rejected(&self, op: &'static str, err: FlowError) -> FlowError {
        self.metrics.record_rejected();
        debug!(op = %op, reason = %err.kind(), error = %err, "call_rejected");
        err
    }
}

impl Default for FeedbackCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
