//! Pure state transition function

use super::event::ExchangeIds;
use super::state::{ChatState, Connectivity, ExchangeContext, ExchangePhase, Outcome};
use super::{Effect, Event};
use crate::config::HistoryMode;
use crate::llm::{ChatRequest, ConversationTurn};
use crate::transcript::{history_turns, Message, Transcript};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Recorded as `last_error` when the connectivity probe fails
pub const OFFLINE_ADVISORY: &str = "Cannot reach the chat service";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Operations refused in the current state. Nothing is changed when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("An exchange is already in progress")]
    Busy,
    #[error("The chat service is unreachable")]
    Offline,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Nothing to retry: transcript does not end in a reply")]
    NothingToRetry,
    #[error("No reply is being generated")]
    NotGenerating,
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs. Transport
/// events for an exchange other than the one in flight leave the state
/// unchanged and produce no effects.
#[allow(clippy::too_many_lines)]
pub fn transition(
    state: &ChatState,
    context: &ExchangeContext<'_>,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&state.phase, event) {
        // ============================================================
        // User operations
        // ============================================================

        // Submit while in flight -> Reject
        (phase, Event::Submit { .. } | Event::RetryLast { .. }) if phase.is_in_flight() => {
            Err(TransitionError::Busy)
        }

        // Idle/Settled + Submit -> StreamingReply
        (_, Event::Submit { text, ids, at }) => {
            check_online(state)?;
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            let prior = match context.history {
                HistoryMode::LatestTurn => vec![],
                HistoryMode::FullTranscript => context.transcript.history_turns(),
            };
            Ok(start_exchange(state, prior, text, ids, at, None))
        }

        // Idle/Settled + RetryLast -> drop trailing reply, then submit its prompt again
        (_, Event::RetryLast { ids, at }) => {
            let Some((user, _)) = context.transcript.trailing_exchange() else {
                return Err(TransitionError::NothingToRetry);
            };
            check_online(state)?;
            let text = user.content.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            let prior = match context.history {
                HistoryMode::LatestTurn => vec![],
                HistoryMode::FullTranscript => without_last(context.transcript),
            };
            Ok(start_exchange(
                state,
                prior,
                text,
                ids,
                at,
                Some(Effect::TruncateLast),
            ))
        }

        // In flight + Cancel -> Settled(Cancelled), partial content kept
        (phase, Event::Cancel) if phase.is_in_flight() => {
            let exchange_id = phase.exchange_id().ok_or(TransitionError::NotGenerating)?;
            Ok(TransitionResult::new(ChatState {
                phase: ExchangePhase::Settled {
                    outcome: Outcome::Cancelled,
                },
                ..state.clone()
            })
            .with_effect(Effect::AbortExchange { exchange_id })
            .with_effect(Effect::PublishView))
        }

        (_, Event::Cancel) => Err(TransitionError::NotGenerating),

        (phase, Event::Clear) if phase.is_in_flight() => Err(TransitionError::Busy),

        (_, Event::Clear) => Ok(TransitionResult::new(ChatState {
            phase: ExchangePhase::Idle,
            last_error: None,
            connectivity: state.connectivity,
        })
        .with_effect(Effect::ClearTranscript)
        .with_effect(Effect::PublishView)),

        (_, Event::DismissError) => Ok(TransitionResult::new(ChatState {
            last_error: None,
            ..state.clone()
        })
        .with_effect(Effect::PublishView)),

        // ============================================================
        // Connectivity
        // ============================================================
        (_, Event::ProbeRequested) => Ok(TransitionResult::new(ChatState {
            connectivity: Connectivity::Checking,
            ..state.clone()
        })
        .with_effect(Effect::ProbeConnectivity)
        .with_effect(Effect::PublishView)),

        (_, Event::ProbeFinished { reachable: true }) => {
            let last_error = match &state.last_error {
                Some(e) if e == OFFLINE_ADVISORY => None,
                other => other.clone(),
            };
            Ok(TransitionResult::new(ChatState {
                connectivity: Connectivity::Connected,
                last_error,
                ..state.clone()
            })
            .with_effect(Effect::PublishView))
        }

        (_, Event::ProbeFinished { reachable: false }) => Ok(TransitionResult::new(ChatState {
            connectivity: Connectivity::Disconnected,
            last_error: Some(OFFLINE_ADVISORY.to_string()),
            ..state.clone()
        })
        .with_effect(Effect::PublishView)),

        // ============================================================
        // Streaming reply
        // ============================================================

        // Fragment -> overwrite placeholder content
        (
            ExchangePhase::StreamingReply { exchange_id, .. },
            Event::Fragment {
                exchange_id: id,
                text,
            },
        ) if *exchange_id == id => {
            Ok(TransitionResult::new(state.clone())
                .with_effect(Effect::replace_content(text))
                .with_effect(Effect::PublishView))
        }

        // Success keeps any advisory recorded while the exchange ran
        (
            ExchangePhase::StreamingReply { exchange_id, .. },
            Event::StreamComplete { exchange_id: id },
        ) if *exchange_id == id => {
            Ok(TransitionResult::new(settled(
                state,
                Outcome::Success,
                state.last_error.clone(),
            ))
            .with_effect(Effect::PublishView))
        }

        // Stream failure -> FallbackReply with the same request
        (
            ExchangePhase::StreamingReply {
                exchange_id,
                placeholder_id,
                request,
            },
            Event::StreamFailed {
                exchange_id: id,
                error,
            },
        ) if *exchange_id == id => Ok(TransitionResult::new(ChatState {
            phase: ExchangePhase::FallbackReply {
                exchange_id: *exchange_id,
                placeholder_id: *placeholder_id,
            },
            ..state.clone()
        })
        .with_effect(Effect::StartFallback {
            exchange_id: *exchange_id,
            request: request.clone(),
            cause: error,
        })
        .with_effect(Effect::PublishView)),

        // ============================================================
        // Fallback reply
        // ============================================================
        (
            ExchangePhase::FallbackReply { exchange_id, .. },
            Event::FallbackReply {
                exchange_id: id,
                reply,
            },
        ) if *exchange_id == id => {
            Ok(TransitionResult::new(settled(
                state,
                Outcome::Success,
                state.last_error.clone(),
            ))
            .with_effect(Effect::replace_content(reply.text))
            .with_effect(Effect::PublishView))
        }

        // Double failure -> remove the placeholder and surface the error
        (
            ExchangePhase::FallbackReply {
                exchange_id,
                placeholder_id,
            },
            Event::FallbackFailed { exchange_id: id, error },
        ) if *exchange_id == id => {
            let message = error.message;
            Ok(TransitionResult::new(settled(
                state,
                Outcome::Failure {
                    message: message.clone(),
                },
                Some(message),
            ))
            .with_effect(Effect::RemoveMessage {
                id: *placeholder_id,
            })
            .with_effect(Effect::PublishView))
        }

        // Stale or out-of-phase transport events are dropped
        (
            _,
            Event::Fragment { .. }
            | Event::StreamComplete { .. }
            | Event::StreamFailed { .. }
            | Event::FallbackReply { .. }
            | Event::FallbackFailed { .. },
        ) => Ok(TransitionResult::new(state.clone())),
    }
}

// ============================================================
// Helper Functions
// ============================================================

fn check_online(state: &ChatState) -> Result<(), TransitionError> {
    if state.connectivity == Connectivity::Disconnected {
        Err(TransitionError::Offline)
    } else {
        Ok(())
    }
}

/// Append the user turn and the placeholder, then start streaming
fn start_exchange(
    state: &ChatState,
    mut turns: Vec<ConversationTurn>,
    text: &str,
    ids: ExchangeIds,
    at: DateTime<Utc>,
    before: Option<Effect>,
) -> TransitionResult {
    turns.push(ConversationTurn::user(text));
    let request = ChatRequest { turns };

    TransitionResult::new(ChatState {
        phase: ExchangePhase::StreamingReply {
            exchange_id: ids.exchange_id,
            placeholder_id: ids.placeholder_id,
            request: request.clone(),
        },
        last_error: None,
        connectivity: state.connectivity,
    })
    .with_effects(before)
    .with_effect(Effect::append(Message::user(ids.user_message_id, text, at)))
    .with_effect(Effect::append(Message::placeholder(ids.placeholder_id, at)))
    .with_effect(Effect::StartStream {
        exchange_id: ids.exchange_id,
        request,
    })
    .with_effect(Effect::PublishView)
}

fn settled(state: &ChatState, outcome: Outcome, last_error: Option<String>) -> ChatState {
    ChatState {
        phase: ExchangePhase::Settled { outcome },
        last_error,
        connectivity: state.connectivity,
    }
}

/// History for a retry: everything except the reply being replaced
fn without_last(transcript: &Transcript) -> Vec<ConversationTurn> {
    let messages = transcript.snapshot();
    history_turns(&messages[..messages.len().saturating_sub(1)])
}
