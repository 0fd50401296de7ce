//! Exchange state types

use crate::config::HistoryMode;
use crate::llm::ChatRequest;
use crate::transcript::{MessageId, Transcript};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic identifier of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Result of the connectivity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Checking,
    Connected,
    Disconnected,
}

/// How a settled exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { message: String },
    /// Stopped by the user; partial content kept
    Cancelled,
}

/// Where the current (or most recent) exchange stands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    /// No exchange since start-up or the last clear
    #[default]
    Idle,

    /// Streamed reply in progress; fragments overwrite the placeholder
    StreamingReply {
        exchange_id: ExchangeId,
        placeholder_id: MessageId,
        /// Kept for the fallback call
        request: ChatRequest,
    },

    /// Streaming failed, waiting on the blocking call
    FallbackReply {
        exchange_id: ExchangeId,
        placeholder_id: MessageId,
    },

    /// Exchange finished; nothing will touch its messages again
    Settled { outcome: Outcome },
}

impl ExchangePhase {
    /// Whether an exchange is between submission and settlement
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ExchangePhase::StreamingReply { .. } | ExchangePhase::FallbackReply { .. }
        )
    }

    pub fn exchange_id(&self) -> Option<ExchangeId> {
        match self {
            ExchangePhase::StreamingReply { exchange_id, .. }
            | ExchangePhase::FallbackReply { exchange_id, .. } => Some(*exchange_id),
            ExchangePhase::Idle | ExchangePhase::Settled { .. } => None,
        }
    }

    /// The open assistant entry, while an exchange is in flight
    pub fn placeholder_id(&self) -> Option<MessageId> {
        match self {
            ExchangePhase::StreamingReply { placeholder_id, .. }
            | ExchangePhase::FallbackReply { placeholder_id, .. } => Some(*placeholder_id),
            ExchangePhase::Idle | ExchangePhase::Settled { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExchangePhase::Idle => "idle",
            ExchangePhase::StreamingReply { .. } => "streaming_reply",
            ExchangePhase::FallbackReply { .. } => "fallback_reply",
            ExchangePhase::Settled {
                outcome: Outcome::Success,
            } => "settled_success",
            ExchangePhase::Settled {
                outcome: Outcome::Failure { .. },
            } => "settled_failure",
            ExchangePhase::Settled {
                outcome: Outcome::Cancelled,
            } => "settled_cancelled",
        }
    }
}

/// Status flags for presentation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExchangeStatus {
    /// From submission until the exchange settles
    pub sending: bool,
    /// While reply content may still arrive; gates cancellation
    pub generating: bool,
    pub last_error: Option<String>,
}

/// Full state of the orchestrator, minus the transcript
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatState {
    pub phase: ExchangePhase,
    pub last_error: Option<String>,
    pub connectivity: Connectivity,
}

impl ChatState {
    pub fn status(&self) -> ExchangeStatus {
        let in_flight = self.phase.is_in_flight();
        ExchangeStatus {
            sending: in_flight,
            generating: in_flight,
            last_error: self.last_error.clone(),
        }
    }
}

/// Read-only inputs to a transition
#[derive(Debug, Clone, Copy)]
pub struct ExchangeContext<'a> {
    pub transcript: &'a Transcript,
    pub history: HistoryMode,
}

impl<'a> ExchangeContext<'a> {
    pub fn new(transcript: &'a Transcript, history: HistoryMode) -> Self {
        Self {
            transcript,
            history,
        }
    }
}
