//! Exchange state machine
//!
//! Pure transitions: the runtime feeds events in, applies the returned
//! effects to the transcript and the transport, and publishes the result.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{Event, ExchangeIds};
pub use state::{
    ChatState, Connectivity, ExchangeContext, ExchangeId, ExchangePhase, ExchangeStatus, Outcome,
};
pub use transition::{transition, TransitionError, TransitionResult, OFFLINE_ADVISORY};
