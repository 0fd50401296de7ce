//! Runtime for executing exchanges
//!
//! One task owns the transcript and the exchange state. Callers talk to it
//! through a [`ChatHandle`]; presentation observes it through a watch channel
//! of [`ChatView`] snapshots.

mod executor;


use executor::ExchangeRuntime;

use crate::config::HistoryMode;
use crate::llm::ChatTransport;
use crate::state_machine::{Connectivity, ExchangeStatus, TransitionError};
use crate::transcript::Message;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// What presentation renders: the transcript plus status flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatView {
    pub messages: Vec<Message>,
    pub status: ExchangeStatus,
    pub connectivity: Connectivity,
}

impl ChatView {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Chat runtime has stopped")]
    RuntimeStopped,
}

/// User operations accepted by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UserOp {
    Submit(String),
    RetryLast,
    Cancel,
    Clear,
    DismissError,
    RecheckConnectivity,
}

pub(crate) struct Command {
    pub op: UserOp,
    pub reply: oneshot::Sender<Result<(), TransitionError>>,
}

/// Handle to interact with a running chat
///
/// Cheap to clone. The runtime stops once every handle is dropped.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ChatView>,
}

impl ChatHandle {
    /// Start a runtime on the current tokio runtime.
    ///
    /// The connectivity probe runs immediately; its outcome shows up in the
    /// view as `Connected` or `Disconnected`.
    pub fn spawn<T>(transport: T, history: HistoryMode) -> Self
    where
        T: ChatTransport + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (view_tx, view_rx) = watch::channel(ChatView::default());

        let runtime =
            ExchangeRuntime::new(transport, history, command_rx, event_tx, event_rx, view_tx);
        tokio::spawn(runtime.run());

        Self {
            commands: command_tx,
            view: view_rx,
        }
    }

    /// Start an exchange for `text`.
    ///
    /// Returns once the user message and the placeholder are in the
    /// transcript; the reply arrives through the view.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.request(UserOp::Submit(text.into())).await
    }

    /// Stop the exchange in flight, keeping whatever content arrived
    pub async fn cancel(&self) -> Result<(), ChatError> {
        self.request(UserOp::Cancel).await
    }

    pub async fn clear(&self) -> Result<(), ChatError> {
        self.request(UserOp::Clear).await
    }

    /// Drop the trailing reply and submit its prompt again
    pub async fn retry_last(&self) -> Result<(), ChatError> {
        self.request(UserOp::RetryLast).await
    }

    pub async fn dismiss_error(&self) -> Result<(), ChatError> {
        self.request(UserOp::DismissError).await
    }

    pub async fn recheck_connectivity(&self) -> Result<(), ChatError> {
        self.request(UserOp::RecheckConnectivity).await
    }

    /// Current view
    pub fn snapshot(&self) -> ChatView {
        self.view.borrow().clone()
    }

    /// Receiver that is notified on every published view
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.view.clone()
    }

    /// Wait until nothing is in flight and return that view
    pub async fn wait_until_idle(&self) -> Result<ChatView, ChatError> {
        self.wait_for(|view| !view.status.sending).await
    }

    /// Wait for the connectivity probe to finish
    pub async fn wait_for_connectivity(&self) -> Result<Connectivity, ChatError> {
        let view = self
            .wait_for(|view| view.connectivity != Connectivity::Checking)
            .await?;
        Ok(view.connectivity)
    }

    async fn wait_for(
        &self,
        predicate: impl FnMut(&ChatView) -> bool,
    ) -> Result<ChatView, ChatError> {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(predicate)
            .await
            .map_err(|_| ChatError::RuntimeStopped)?;
        Ok(view.clone())
    }

    async fn request(&self, op: UserOp) -> Result<(), ChatError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command { op, reply })
            .await
            .map_err(|_| ChatError::RuntimeStopped)?;
        rx.await.map_err(|_| ChatError::RuntimeStopped)??;
        Ok(())
    }
}
