//! Property-based tests for the exchange state machine
//!
//! Random operation sequences are driven through `transition` and the
//! resulting effects applied to a real transcript.

use super::state::*;
use super::transition::*;
use super::*;
use crate::config::HistoryMode;
use crate::llm::{ApiError, ChatReply};
use crate::transcript::{MessageId, Transcript};
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Test Harness
// ============================================================================

/// Applies transcript effects the way the runtime does; transport effects
/// are recorded and otherwise ignored.
struct Harness {
    state: ChatState,
    transcript: Transcript,
    history: HistoryMode,
    next_exchange: u64,
    streams_started: usize,
}

impl Harness {
    fn new(history: HistoryMode) -> Self {
        Self {
            state: ChatState {
                connectivity: Connectivity::Connected,
                ..ChatState::default()
            },
            transcript: Transcript::new(),
            history,
            next_exchange: 0,
            streams_started: 0,
        }
    }

    fn fresh_ids(&mut self) -> ExchangeIds {
        self.next_exchange += 1;
        ExchangeIds {
            exchange_id: ExchangeId(self.next_exchange),
            user_message_id: MessageId::new(),
            placeholder_id: MessageId::new(),
        }
    }

    fn current(&self) -> ExchangeId {
        self.state
            .phase
            .exchange_id()
            .unwrap_or(ExchangeId(self.next_exchange))
    }

    fn event_for(&mut self, op: &Op) -> Event {
        let at = Utc::now();
        match op {
            Op::Submit(text) => Event::Submit {
                text: text.clone(),
                ids: self.fresh_ids(),
                at,
            },
            Op::Retry => Event::RetryLast {
                ids: self.fresh_ids(),
                at,
            },
            Op::Cancel => Event::Cancel,
            Op::Clear => Event::Clear,
            Op::Dismiss => Event::DismissError,
            Op::Probe(reachable) => Event::ProbeFinished {
                reachable: *reachable,
            },
            Op::Fragment { stale, text } => Event::Fragment {
                exchange_id: self.target(*stale),
                text: text.clone(),
            },
            Op::Complete { stale } => Event::StreamComplete {
                exchange_id: self.target(*stale),
            },
            Op::StreamFail { stale } => Event::StreamFailed {
                exchange_id: self.target(*stale),
                error: ApiError::network("reset"),
            },
            Op::FallbackOk { stale, text } => Event::FallbackReply {
                exchange_id: self.target(*stale),
                reply: ChatReply::text(text.clone()),
            },
            Op::FallbackFail { stale } => Event::FallbackFailed {
                exchange_id: self.target(*stale),
                error: ApiError::remote("API request failed: 500"),
            },
        }
    }

    fn target(&self, stale: bool) -> ExchangeId {
        let current = self.current();
        if stale {
            ExchangeId(current.0.wrapping_sub(1))
        } else {
            current
        }
    }

    fn apply(&mut self, event: Event) -> Result<(), TransitionError> {
        let ctx = ExchangeContext::new(&self.transcript, self.history);
        let result = transition(&self.state, &ctx, event)?;
        self.state = result.new_state;
        for effect in result.effects {
            match effect {
                Effect::AppendMessage { message } => self.transcript.append(message),
                Effect::ReplaceAssistantContent { text } => {
                    self.transcript
                        .replace_last_assistant_content(text)
                        .expect("reply target must be the trailing assistant");
                }
                Effect::RemoveMessage { id } => {
                    self.transcript
                        .remove_by_id(id)
                        .expect("placeholder must exist");
                }
                Effect::TruncateLast => {
                    self.transcript.truncate_last();
                }
                Effect::ClearTranscript => self.transcript.clear(),
                Effect::StartStream { .. } => self.streams_started += 1,
                Effect::StartFallback { .. }
                | Effect::AbortExchange { .. }
                | Effect::ProbeConnectivity
                | Effect::PublishView => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Submit(String),
    Retry,
    Cancel,
    Clear,
    Dismiss,
    Probe(bool),
    Fragment { stale: bool, text: String },
    Complete { stale: bool },
    StreamFail { stale: bool },
    FallbackOk { stale: bool, text: String },
    FallbackFail { stale: bool },
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-z ]{0,12}".prop_map(Op::Submit),
        1 => Just(Op::Retry),
        1 => Just(Op::Cancel),
        1 => Just(Op::Clear),
        1 => Just(Op::Dismiss),
        1 => any::<bool>().prop_map(Op::Probe),
        4 => (any::<bool>(), "[A-Za-z]{0,10}")
            .prop_map(|(stale, text)| Op::Fragment { stale, text }),
        2 => any::<bool>().prop_map(|stale| Op::Complete { stale }),
        1 => any::<bool>().prop_map(|stale| Op::StreamFail { stale }),
        1 => (any::<bool>(), "[a-z]{1,10}")
            .prop_map(|(stale, text)| Op::FallbackOk { stale, text }),
        1 => any::<bool>().prop_map(|stale| Op::FallbackFail { stale }),
    ]
}

fn arb_history() -> impl Strategy<Value = HistoryMode> {
    prop_oneof![
        Just(HistoryMode::LatestTurn),
        Just(HistoryMode::FullTranscript)
    ]
}

// ============================================================================
// Invariants
// ============================================================================

fn check_invariants(h: &Harness) -> Result<(), TestCaseError> {
    let messages = h.transcript.snapshot();

    // At most one open assistant entry, and it is always the tail
    if let Some(placeholder_id) = h.state.phase.placeholder_id() {
        let last = messages.last();
        prop_assert!(last.is_some_and(|m| m.id == placeholder_id && m.is_assistant()));
    }

    // An assistant entry always answers a user entry
    for pair in messages.windows(2) {
        prop_assert!(
            !(pair[0].is_assistant() && pair[1].is_assistant()),
            "two consecutive assistant entries"
        );
    }
    prop_assert!(messages.first().is_none_or(|m| m.is_user()));

    let status = h.state.status();
    prop_assert_eq!(status.sending, h.state.phase.is_in_flight());
    prop_assert_eq!(status.generating, status.sending);
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_random_operations_keep_transcript_consistent(
        history in arb_history(),
        ops in prop::collection::vec(arb_op(), 1..60)
    ) {
        let mut h = Harness::new(history);
        for op in &ops {
            let event = h.event_for(op);
            let before_len = h.transcript.len();
            let before_state = h.state.clone();
            let before_transcript = h.transcript.clone();

            match h.apply(event) {
                Ok(()) => prop_assert!(h.transcript.len() <= before_len + 2),
                Err(_) => {
                    // Rejections change nothing
                    prop_assert_eq!(&h.state, &before_state);
                    prop_assert_eq!(&h.transcript, &before_transcript);
                }
            }
            check_invariants(&h)?;
        }
    }

    #[test]
    fn prop_settled_submits_alternate_roles(
        prompts in prop::collection::vec("[a-z]{1,8}", 1..20),
        replies in prop::collection::vec(prop::collection::vec("[A-Za-z]{1,6}", 0..4), 20)
    ) {
        let mut h = Harness::new(HistoryMode::LatestTurn);
        for (prompt, fragments) in prompts.iter().zip(&replies) {
            let submit = h.event_for(&Op::Submit(prompt.clone()));
            h.apply(submit).unwrap();
            for text in fragments {
                let fragment = h.event_for(&Op::Fragment { stale: false, text: text.clone() });
                h.apply(fragment).unwrap();
            }
            let complete = h.event_for(&Op::Complete { stale: false });
            h.apply(complete).unwrap();
        }

        let messages = h.transcript.snapshot();
        prop_assert_eq!(messages.len(), prompts.len() * 2);
        for (i, m) in messages.iter().enumerate() {
            prop_assert_eq!(m.is_user(), i % 2 == 0);
        }
        for (i, fragments) in replies.iter().take(prompts.len()).enumerate() {
            let expected = fragments.last().cloned().unwrap_or_default();
            prop_assert_eq!(&messages[i * 2 + 1].content, &expected);
        }
    }

    #[test]
    fn prop_second_submit_while_sending_appends_nothing(
        first in "[a-z]{1,8}",
        second in "[a-z]{1,8}"
    ) {
        let mut h = Harness::new(HistoryMode::LatestTurn);
        let submit = h.event_for(&Op::Submit(first));
        h.apply(submit).unwrap();
        let len = h.transcript.len();

        let again = h.event_for(&Op::Submit(second));
        prop_assert_eq!(h.apply(again), Err(TransitionError::Busy));
        prop_assert_eq!(h.transcript.len(), len);
        prop_assert_eq!(h.streams_started, 1);
    }

    #[test]
    fn prop_stale_events_never_touch_transcript(
        texts in prop::collection::vec("[a-z]{1,6}", 1..10)
    ) {
        let mut h = Harness::new(HistoryMode::LatestTurn);
        let submit = h.event_for(&Op::Submit("hi".into()));
        h.apply(submit).unwrap();
        let state = h.state.clone();
        let transcript = h.transcript.clone();

        for text in texts {
            let fragment = h.event_for(&Op::Fragment { stale: true, text });
            h.apply(fragment).unwrap();
            let complete = h.event_for(&Op::Complete { stale: true });
            h.apply(complete).unwrap();
        }
        prop_assert_eq!(h.state, state);
        prop_assert_eq!(h.transcript, transcript);
    }
}
