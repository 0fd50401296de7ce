//! Molly - chat exchange orchestration
//!
//! Drives one request/response exchange at a time against a remote chat
//! endpoint: streamed reply with a blocking fallback, cancellation, retry
//! of the last exchange, and a single linear transcript.

#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod llm;
pub mod runtime;
pub mod state_machine;
pub mod transcript;

pub use config::{ChatConfig, ConfigError, HistoryMode, TransportConfig};
pub use llm::{ApiError, ChatTransport, GraphqlTransport, LoggingTransport};
pub use runtime::{ChatError, ChatHandle, ChatView};
pub use state_machine::{Connectivity, ExchangeStatus, TransitionError};
pub use transcript::{Message, MessageId, Transcript};
