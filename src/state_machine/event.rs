//! Events that drive the exchange state machine

use super::state::ExchangeId;
use crate::llm::{ApiError, ChatReply};
use crate::transcript::MessageId;
use chrono::{DateTime, Utc};

/// Identifiers allocated for a new exchange before it is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeIds {
    pub exchange_id: ExchangeId,
    pub user_message_id: MessageId,
    pub placeholder_id: MessageId,
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    Submit {
        text: String,
        ids: ExchangeIds,
        at: DateTime<Utc>,
    },
    RetryLast {
        ids: ExchangeIds,
        at: DateTime<Utc>,
    },
    Cancel,
    Clear,
    DismissError,

    // Connectivity
    ProbeRequested,
    ProbeFinished {
        reachable: bool,
    },

    // Transport events, tagged with the exchange they belong to
    Fragment {
        exchange_id: ExchangeId,
        text: String,
    },
    StreamComplete {
        exchange_id: ExchangeId,
    },
    StreamFailed {
        exchange_id: ExchangeId,
        error: ApiError,
    },
    FallbackReply {
        exchange_id: ExchangeId,
        reply: ChatReply,
    },
    FallbackFailed {
        exchange_id: ExchangeId,
        error: ApiError,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Submit { .. } => "submit",
            Event::RetryLast { .. } => "retry_last",
            Event::Cancel => "cancel",
            Event::Clear => "clear",
            Event::DismissError => "dismiss_error",
            Event::ProbeRequested => "probe_requested",
            Event::ProbeFinished { .. } => "probe_finished",
            Event::Fragment { .. } => "fragment",
            Event::StreamComplete { .. } => "stream_complete",
            Event::StreamFailed { .. } => "stream_failed",
            Event::FallbackReply { .. } => "fallback_reply",
            Event::FallbackFailed { .. } => "fallback_failed",
        }
    }
}
