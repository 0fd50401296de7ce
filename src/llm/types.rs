//! Common types for chat exchanges with the remote endpoint

use super::ApiError;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One turn of the conversation as sent to the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Chat request
///
/// Model and sampling parameters are owned by the transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub turns: Vec<ConversationTurn>,
}

impl ChatRequest {
    /// A request carrying only the latest user turn
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            turns: vec![ConversationTurn::user(text)],
        }
    }
}

/// Complete reply from the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub model: Option<String>,
    pub usage: Usage,
}

impl ChatReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            usage: Usage::default(),
        }
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One item of a streamed reply.
///
/// A well-formed stream is one or more `Fragment`s carrying successively
/// longer prefixes of the reply, then exactly one `Complete`; or a single
/// `Failed` at any point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Complete,
    Failed(ApiError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Failed(_))
    }
}

pub type ReplyStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;
