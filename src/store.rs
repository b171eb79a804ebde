//! Per-surface message histories with guarded in-place replacement.

use crate::error::StoreError;
use crate::models::{ConversationSet, Message, Role, Surface};

// === Types ===

/// Owns every surface's conversation. The only way streaming code mutates an
/// existing message is through [`MessageStore::replace_at`], which refuses to
/// touch anything but a model-authored entry.
#[derive(Debug, Default)]
#[must_use]
pub struct MessageStore {
    conversations: ConversationSet,
}

// === MessageStore ===

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all histories wholesale, as on identity switch or initial load.
    pub fn from_set(conversations: ConversationSet) -> Self {
        Self { conversations }
    }

    /// Append a message to a surface and return its index.
    pub fn append(&mut self, surface: Surface, message: Message) -> usize {
        let messages = self.conversations.get_mut(surface);
        messages.push(message);
        messages.len() - 1
    }

    /// Replace the message at `index` in place. Fails if the index is out of
    /// range or the existing message is not model-authored; user messages are
    /// immutable once appended.
    pub fn replace_at(
        &mut self,
        surface: Surface,
        index: usize,
        message: Message,
    ) -> Result<(), StoreError> {
        let messages = self.conversations.get_mut(surface);
        let slot = messages
            .get_mut(index)
            .ok_or(StoreError::IndexOutOfRange { surface, index })?;
        if slot.role != Role::Model {
            return Err(StoreError::RoleMismatch { surface, index });
        }
        *slot = message;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, surface: Surface) -> &[Message] {
        self.conversations.get(surface)
    }

    pub fn clear(&mut self, surface: Surface) {
        self.conversations.clear(surface);
    }

    /// Clone of the full conversation set, for persistence.
    #[must_use]
    pub fn snapshot(&self) -> ConversationSet {
        self.conversations.clone()
    }
}
