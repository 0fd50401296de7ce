//! Effects produced by state transitions

use super::state::ExchangeId;
use crate::llm::{ApiError, ChatRequest};
use crate::transcript::{Message, MessageId};

/// Effects to be executed after state transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append a message at the tail of the transcript
    AppendMessage { message: Message },

    /// Overwrite the trailing assistant message's content
    ReplaceAssistantContent { text: String },

    /// Remove one message by id
    RemoveMessage { id: MessageId },

    /// Drop the last transcript entry
    TruncateLast,

    ClearTranscript,

    /// Start the streamed reply for an exchange
    StartStream {
        exchange_id: ExchangeId,
        request: ChatRequest,
    },

    /// Start the blocking call after a failed stream
    StartFallback {
        exchange_id: ExchangeId,
        request: ChatRequest,
        /// Why streaming failed
        cause: ApiError,
    },

    /// Stop delivering transport results for an exchange
    AbortExchange { exchange_id: ExchangeId },

    /// Run the connectivity probe
    ProbeConnectivity,

    /// Push the new view to observers
    PublishView,
}

impl Effect {
    pub fn append(message: Message) -> Self {
        Effect::AppendMessage { message }
    }

    pub fn replace_content(text: impl Into<String>) -> Self {
        Effect::ReplaceAssistantContent { text: text.into() }
    }
}
