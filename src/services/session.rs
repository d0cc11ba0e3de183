//! Flow session lifecycle and the per-session locked session table

use crate::domain::errors::FlowError;
use crate::domain::feedback::{CachedFeedbackEvent, FeedbackEvents, FeedbackItem};
use crate::domain::types::{epoch_ms, FlowKind, SessionId};
use crate::services::buffer::CachedFeedbackBuffer;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Session lifecycle state. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
}

/// One feedback flow instance, detailed or arrival
#[derive(Debug)]
pub struct FlowSession {
    id: SessionId,
    kind: FlowKind,
    state: SessionState,
    opened_at: u64,            // epoch ms
    completed_at: Option<u64>, // epoch ms
    /// Detailed flows only; released at completion
    buffer: Option<CachedFeedbackBuffer>,
    /// Arrival flows only
    item: Option<FeedbackItem>,
}

impl FlowSession {
    /// Open a new active session of the given kind
    pub fn open(kind: FlowKind) -> Self {
        let buffer = match kind {
            FlowKind::Detailed => Some(CachedFeedbackBuffer::new()),
            FlowKind::Arrival => None,
        };
        Self {
            id: SessionId::new(),
            kind,
            state: SessionState::Active,
            opened_at: epoch_ms(),
            completed_at: None,
            buffer,
            item: None,
        }
    }

    /// Open an arrival session with its item already attached
    pub fn arrival(item: FeedbackItem) -> Self {
        let mut session = Self::open(FlowKind::Arrival);
        session.item = Some(item);
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn opened_at(&self) -> u64 {
        self.opened_at
    }

    pub fn completed_at(&self) -> Option<u64> {
        self.completed_at
    }

    /// Number of events buffered so far (0 for arrival or completed sessions)
    pub fn event_count(&self) -> usize {
        self.buffer.as_ref().map_or(0, CachedFeedbackBuffer::len)
    }

    /// Append an event to the buffer of an active detailed session
    pub fn append_event(&mut self, event: CachedFeedbackEvent) -> Result<(), FlowError> {
        if !self.is_active() {
            return Err(FlowError::SessionNotActive(self.id));
        }
        self.expect_kind(FlowKind::Detailed)?;
        if event.session_id != self.id {
            return Err(FlowError::SessionMismatch {
                session: self.id,
                event_session: event.session_id,
            });
        }

        let buffer = self.buffer.as_mut().ok_or(FlowError::SessionNotActive(self.id))?;
        let event_id = event.id;
        if !buffer.push(event) {
            return Err(FlowError::DuplicateEvent { session: self.id, event: event_id });
        }
        Ok(())
    }

    /// Attach (or replace) the item of an active arrival session
    pub fn attach_item(&mut self, item: FeedbackItem) -> Result<(), FlowError> {
        if !self.is_active() {
            return Err(FlowError::SessionNotActive(self.id));
        }
        self.expect_kind(FlowKind::Arrival)?;
        self.item = Some(item);
        Ok(())
    }

    /// Complete a detailed session, releasing its buffer.
    ///
    /// Like every completion, succeeds at most once.
    pub fn complete_detailed(&mut self) -> Result<FeedbackEvents, FlowError> {
        self.ensure_not_completed()?;
        self.expect_kind(FlowKind::Detailed)?;

        let buffer = self.buffer.take().unwrap_or_default();
        self.mark_completed();
        Ok(buffer.into_events())
    }

    /// Attach the item and complete an arrival session in one step
    pub fn complete_with_item(&mut self, item: FeedbackItem) -> Result<FeedbackItem, FlowError> {
        self.ensure_not_completed()?;
        self.attach_item(item)?;
        self.complete_arrival()
    }

    /// Complete an arrival session whose item is already attached.
    ///
    /// Without an item the session stays active and reports `MissingItem`.
    pub fn complete_arrival(&mut self) -> Result<FeedbackItem, FlowError> {
        self.ensure_not_completed()?;
        self.expect_kind(FlowKind::Arrival)?;

        let item = self.item.take().ok_or(FlowError::MissingItem(self.id))?;
        self.mark_completed();
        Ok(item)
    }

    fn mark_completed(&mut self) {
        self.state = SessionState::Completed;
        self.completed_at = Some(epoch_ms());
    }

    fn ensure_not_completed(&self) -> Result<(), FlowError> {
        if !self.is_active() {
            return Err(FlowError::AlreadyCompleted(self.id));
        }
        Ok(())
    }

    fn expect_kind(&self, expected: FlowKind) -> Result<(), FlowError> {
        if self.kind != expected {
            return Err(FlowError::WrongKind { session: self.id, expected, actual: self.kind });
        }
        Ok(())
    }
}

type SessionHandle = Arc<Mutex<FlowSession>>;

/// Completed sessions a store keeps for `AlreadyCompleted` reporting
pub const DEFAULT_RETAINED_COMPLETED: usize = 256;

/// Table of open sessions plus a bounded tail of completed ones.
///
/// The table lock is only held to look up, insert or evict handles. All
/// per-session work happens under that session's own mutex, so different
/// sessions never block each other and append/complete on one session are
/// serialized.
///
/// Completed sessions are retired in completion order; once more than the
/// retention limit are held, the oldest are evicted and their ids become
/// unknown (`SessionNotActive`). Lock order: `completed`, then `sessions`,
/// then a session mutex.
pub struct SessionStore {
    sessions: RwLock<FxHashMap<SessionId, SessionHandle>>,
    /// Completed ids, oldest first
    completed: Mutex<VecDeque<SessionId>>,
    retain_completed: usize,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_retained_completed(DEFAULT_RETAINED_COMPLETED)
    }

    /// Create a store keeping at most `limit` completed sessions
    pub fn with_retained_completed(limit: usize) -> Self {
        Self {
            sessions: RwLock::new(FxHashMap::default()),
            completed: Mutex::new(VecDeque::with_capacity(limit.min(1024))),
            retain_completed: limit,
        }
    }

    pub fn retain_completed(&self) -> usize {
        self.retain_completed
    }

    /// Open a new session and return its id
    pub fn open(&self, kind: FlowKind) -> SessionId {
        let session = FlowSession::open(kind);
        let id = session.id();

        debug!(session_id = %id, kind = %kind, "session_opened");

        self.sessions.write().insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Append an event to a detailed session. Returns the buffered event count.
    pub fn append_event(
        &self,
        id: SessionId,
        event: CachedFeedbackEvent,
    ) -> Result<usize, FlowError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock();
        session.append_event(event)?;
        Ok(session.event_count())
    }

    /// Complete a detailed session and take its events
    pub fn complete_detailed(&self, id: SessionId) -> Result<FeedbackEvents, FlowError> {
        let handle = self.handle(id)?;
        let events = handle.lock().complete_detailed()?;
        self.retire(id);

        debug!(session_id = %id, events = %events.len(), "session_completed");
        Ok(events)
    }

    /// Complete an arrival session with its item
    pub fn complete_with_item(
        &self,
        id: SessionId,
        item: FeedbackItem,
    ) -> Result<FeedbackItem, FlowError> {
        let handle = self.handle(id)?;
        let item = handle.lock().complete_with_item(item)?;
        self.retire(id);

        debug!(session_id = %id, rating = %item.rating, "session_completed");
        Ok(item)
    }

    pub fn is_active(&self, id: SessionId) -> bool {
        self.handle(id).map(|h| h.lock().is_active()).unwrap_or(false)
    }

    /// Number of sessions still active
    pub fn active_count(&self) -> usize {
        let handles: Vec<SessionHandle> = self.sessions.read().values().cloned().collect();
        handles.iter().filter(|h| h.lock().is_active()).count()
    }

    /// Number of sessions tracked, including retained completed ones
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Forget every completed session now. Returns the number removed.
    pub fn prune_completed(&self) -> usize {
        let mut completed = self.completed.lock();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, handle| handle.lock().is_active());
        completed.clear();
        let removed = before - sessions.len();

        if removed > 0 {
            debug!(removed = %removed, remaining = %sessions.len(), "sessions_pruned");
        }
        removed
    }

    /// Queue a just-completed session and evict the oldest past the limit
    fn retire(&self, id: SessionId) {
        let mut completed = self.completed.lock();
        completed.push_back(id);
        if completed.len() <= self.retain_completed {
            return;
        }

        let excess = completed.len() - self.retain_completed;
        let mut sessions = self.sessions.write();
        for evicted in completed.drain(..excess) {
            sessions.remove(&evicted);
        }
        debug!(evicted = %excess, retained = %completed.len(), "sessions_evicted");
    }

    fn handle(&self, id: SessionId) -> Result<SessionHandle, FlowError> {
        self.sessions.read().get(&id).cloned().ok_or(FlowError::SessionNotActive(id))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
