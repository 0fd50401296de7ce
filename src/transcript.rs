//! Transcript store
//!
//! Ordered list of chat messages. Pure data: no I/O and no knowledge of the
//! transport.

use crate::llm::{ConversationTurn, MessageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(id: MessageId, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            content: content.into(),
            timestamp,
        }
    }

    /// Empty assistant entry that receives the reply
    pub fn placeholder(id: MessageId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            content: String::new(),
            timestamp,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn to_turn(&self) -> ConversationTurn {
        ConversationTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Last message is not an assistant reply")]
    LastNotAssistant,
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),
}

/// Ordered conversation transcript
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Overwrite the content of the trailing assistant message
    pub fn replace_last_assistant_content(
        &mut self,
        text: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        match self.messages.last_mut() {
            Some(last) if last.is_assistant() => {
                last.content = text.into();
                Ok(())
            }
            _ => Err(TranscriptError::LastNotAssistant),
        }
    }

    pub fn remove_by_id(&mut self, id: MessageId) -> Result<Message, TranscriptError> {
        let index = self
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(TranscriptError::MessageNotFound(id))?;
        Ok(self.messages.remove(index))
    }

    pub fn truncate_last(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Read-only view for presentation
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The `[user, assistant]` pair at the tail, if the transcript ends in one
    pub fn trailing_exchange(&self) -> Option<(&Message, &Message)> {
        match self.messages.as_slice() {
            [.., user, assistant] if user.is_user() && assistant.is_assistant() => {
                Some((user, assistant))
            }
            _ => None,
        }
    }

    /// Turns to send for a new prompt when the whole history is included.
    ///
    /// Empty assistant entries (placeholders, empty cancelled replies) are
    /// skipped.
    pub fn history_turns(&self) -> Vec<ConversationTurn> {
        history_turns(&self.messages)
    }
}

/// Request turns for a run of messages, skipping empty assistant entries
pub fn history_turns(messages: &[Message]) -> Vec<ConversationTurn> {
    messages
        .iter()
        .filter(|m| !(m.is_assistant() && m.content.is_empty()))
        .map(Message::to_turn)
        .collect()
}
