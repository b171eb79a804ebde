//! Streaming accumulation: fragments fold into a placeholder message that is
//! rewritten in place as the response arrives.
//!
//! Each surface carries at most one *current* streaming session. Starting a
//! new session supersedes the previous one without cancelling its provider
//! request; fragments arriving for a superseded session are dropped on the
//! floor, so a stale stream can never overwrite newer conversation state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Message, Part, Surface};
use crate::store::MessageStore;

// === Types ===

/// Lifecycle of one streaming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    AwaitingFirstChunk,
    Accumulating,
    Settled,
    Errored,
}

/// One streaming response bound to a placeholder message. The session is
/// owned by the task driving the provider stream; the accumulator only keeps
/// enough to decide whether the session is still current.
#[derive(Debug)]
#[must_use]
pub struct StreamingSession {
    id: Uuid,
    surface: Surface,
    message_index: usize,
    buffer: String,
    phase: StreamPhase,
    timestamp: DateTime<Utc>,
}

impl StreamingSession {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn surface(&self) -> Surface {
        self.surface
    }

    #[must_use]
    pub fn message_index(&self) -> usize {
        self.message_index
    }

    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Full text accumulated so far.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveStream {
    id: Uuid,
    message_index: usize,
}

/// Registry of the current streaming session per surface.
#[derive(Debug, Default)]
pub struct StreamingAccumulator {
    active: HashMap<Surface, ActiveStream>,
}

// === StreamingAccumulator ===

impl StreamingAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a streaming session on a surface: appends an empty model
    /// placeholder and registers the session as current, superseding any
    /// session already active there.
    pub fn begin(&mut self, store: &mut MessageStore, surface: Surface) -> StreamingSession {
        let placeholder = Message::model(vec![Part::text("")]);
        let timestamp = placeholder.timestamp;
        let message_index = store.append(surface, placeholder);
        let id = Uuid::new_v4();

        if let Some(previous) = self.active.insert(surface, ActiveStream { id, message_index }) {
            tracing::debug!(
                surface = %surface,
                superseded = %previous.id,
                "superseding active streaming session"
            );
        }

        StreamingSession {
            id,
            surface,
            message_index,
            buffer: String::new(),
            phase: StreamPhase::AwaitingFirstChunk,
            timestamp,
        }
    }

    /// Fold a fragment into the session's buffer and rewrite the placeholder
    /// with the full accumulated text. Returns `Ok(false)` without touching
    /// the store when the session has been superseded.
    pub fn apply(
        &mut self,
        store: &mut MessageStore,
        session: &mut StreamingSession,
        fragment: &str,
    ) -> Result<bool, StoreError> {
        if !self.is_current(session) {
            tracing::debug!(
                surface = %session.surface,
                session = %session.id,
                "dropping fragment for superseded session"
            );
            return Ok(false);
        }

        session.buffer.push_str(fragment);
        session.phase = StreamPhase::Accumulating;

        let mut message = Message::model(vec![Part::text(session.buffer.clone())]);
        message.timestamp = session.timestamp;
        store.replace_at(session.surface, session.message_index, message)?;
        Ok(true)
    }

    /// Finish a session. Returns the accumulated text when the session was
    /// still current; a superseded session settles silently.
    pub fn settle(&mut self, session: &mut StreamingSession) -> Option<String> {
        let current = self.is_current(session);
        session.phase = StreamPhase::Settled;
        if current {
            self.active.remove(&session.surface);
            Some(session.buffer.clone())
        } else {
            None
        }
    }

    /// Mark a session as failed, rewriting its placeholder with the fixed
    /// failure text when the session is still current.
    pub fn fail(
        &mut self,
        store: &mut MessageStore,
        session: &mut StreamingSession,
        failure_text: &str,
    ) -> Result<(), StoreError> {
        let current = self.is_current(session);
        session.phase = StreamPhase::Errored;
        if !current {
            return Ok(());
        }
        self.active.remove(&session.surface);

        let mut message = Message::model_text(failure_text);
        message.timestamp = session.timestamp;
        store.replace_at(session.surface, session.message_index, message)
    }

    /// Drop the current session on a surface, if any. Used when the surface's
    /// history is cleared while a stream is still in flight.
    pub fn invalidate(&mut self, surface: Surface) {
        if let Some(previous) = self.active.remove(&surface) {
            tracing::debug!(
                surface = %surface,
                session = %previous.id,
                "invalidating active streaming session"
            );
        }
    }

    /// Index of the in-flight placeholder on a surface, if one exists.
    #[must_use]
    pub fn pending_index(&self, surface: Surface) -> Option<usize> {
        self.active.get(&surface).map(|active| active.message_index)
    }

    fn is_current(&self, session: &StreamingSession) -> bool {
        self.active
            .get(&session.surface)
            .is_some_and(|active| active.id == session.id)
    }
}
