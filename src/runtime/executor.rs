//! Exchange runtime executor

use super::{ChatView, Command, UserOp};
use crate::config::HistoryMode;
use crate::llm::{ApiError, ChatRequest, ChatTransport, StreamEvent};
use crate::state_machine::{
    transition, ChatState, Effect, Event, ExchangeContext, ExchangeId, ExchangeIds,
    TransitionError,
};
use crate::transcript::{MessageId, Transcript};
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Owns the transcript and the exchange state; the only writer of either
pub(crate) struct ExchangeRuntime<T>
where
    T: ChatTransport + 'static,
{
    state: ChatState,
    transcript: Transcript,
    history: HistoryMode,
    transport: Arc<T>,
    command_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<Event>,
    event_rx: mpsc::Receiver<Event>,
    view_tx: watch::Sender<ChatView>,
    /// Token for the exchange in flight
    exchange_cancel: Option<(ExchangeId, CancellationToken)>,
    next_exchange: u64,
}

impl<T> ExchangeRuntime<T>
where
    T: ChatTransport + 'static,
{
    pub fn new(
        transport: T,
        history: HistoryMode,
        command_rx: mpsc::Receiver<Command>,
        event_tx: mpsc::Sender<Event>,
        event_rx: mpsc::Receiver<Event>,
        view_tx: watch::Sender<ChatView>,
    ) -> Self {
        Self {
            state: ChatState::default(),
            transcript: Transcript::new(),
            history,
            transport: Arc::new(transport),
            command_rx,
            event_tx,
            event_rx,
            view_tx,
            exchange_cancel: None,
            next_exchange: 0,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(transport = %self.transport.name(), "Starting chat runtime");

        if let Err(e) = self.process_event(Event::ProbeRequested) {
            tracing::warn!(error = %e, "Initial connectivity probe not started");
        }

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Every handle dropped
                    None => break,
                },
                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.process_event(event) {
                        tracing::error!(error = %e, "Transport event rejected");
                    }
                }
            }
        }

        if let Some((exchange_id, token)) = self.exchange_cancel.take() {
            tracing::debug!(%exchange_id, "Aborting exchange on shutdown");
            token.cancel();
        }
        tracing::info!("Chat runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        let Command { op, reply } = command;
        let event = self.event_for(op);
        let name = event.name();

        let result = self.process_event(event);
        if let Err(e) = &result {
            tracing::info!(operation = name, reason = %e, "Operation rejected");
        }
        // Caller may have stopped waiting
        let _ = reply.send(result);
    }

    fn event_for(&mut self, op: UserOp) -> Event {
        match op {
            UserOp::Submit(text) => Event::Submit {
                text,
                ids: self.allocate_ids(),
                at: Utc::now(),
            },
            UserOp::RetryLast => Event::RetryLast {
                ids: self.allocate_ids(),
                at: Utc::now(),
            },
            UserOp::Cancel => Event::Cancel,
            UserOp::Clear => Event::Clear,
            UserOp::DismissError => Event::DismissError,
            UserOp::RecheckConnectivity => Event::ProbeRequested,
        }
    }

    fn allocate_ids(&mut self) -> ExchangeIds {
        self.next_exchange += 1;
        ExchangeIds {
            exchange_id: ExchangeId(self.next_exchange),
            user_message_id: MessageId::new(),
            placeholder_id: MessageId::new(),
        }
    }

    fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        let event_name = event.name();
        let context = ExchangeContext::new(&self.transcript, self.history);

        // Pure state transition
        let result = transition(&self.state, &context, event)?;

        let from = self.state.phase.name();
        self.state = result.new_state;
        let to = self.state.phase.name();
        if from != to {
            tracing::debug!(event = event_name, from, to, "Exchange phase changed");
        }

        for effect in result.effects {
            self.execute_effect(effect);
        }

        // A settled exchange has no further use for its token
        if !self.state.phase.is_in_flight() {
            if let Some((_, token)) = self.exchange_cancel.take() {
                token.cancel();
            }
        }

        Ok(())
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::AppendMessage { message } => {
                self.transcript.append(message);
            }

            Effect::ReplaceAssistantContent { text } => {
                if let Err(e) = self.transcript.replace_last_assistant_content(text) {
                    tracing::error!(error = %e, "Failed to write reply content");
                }
            }

            Effect::RemoveMessage { id } => {
                if let Err(e) = self.transcript.remove_by_id(id) {
                    tracing::error!(error = %e, "Failed to remove placeholder");
                }
            }

            Effect::TruncateLast => {
                self.transcript.truncate_last();
            }

            Effect::ClearTranscript => {
                self.transcript.clear();
            }

            Effect::StartStream {
                exchange_id,
                request,
            } => self.start_stream(exchange_id, request),

            Effect::StartFallback {
                exchange_id,
                request,
                cause,
            } => self.start_fallback(exchange_id, request, &cause),

            Effect::AbortExchange { exchange_id } => match self.exchange_cancel.take() {
                Some((id, token)) if id == exchange_id => {
                    tracing::info!(%exchange_id, "Exchange cancelled");
                    token.cancel();
                }
                other => {
                    tracing::warn!(%exchange_id, "No running exchange to abort");
                    self.exchange_cancel = other;
                }
            },

            Effect::ProbeConnectivity => {
                let transport = Arc::clone(&self.transport);
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let reachable = transport.probe_connectivity().await;
                    let _ = event_tx.send(Event::ProbeFinished { reachable }).await;
                });
            }

            Effect::PublishView => {
                self.view_tx.send_replace(self.view());
            }
        }
    }

    /// Token for `exchange_id`, replacing any token of an older exchange
    fn token_for(&mut self, exchange_id: ExchangeId) -> CancellationToken {
        match &self.exchange_cancel {
            Some((id, token)) if *id == exchange_id => token.clone(),
            _ => {
                if let Some((_, stale)) = self.exchange_cancel.take() {
                    stale.cancel();
                }
                let token = CancellationToken::new();
                self.exchange_cancel = Some((exchange_id, token.clone()));
                token
            }
        }
    }

    fn start_stream(&mut self, exchange_id: ExchangeId, request: ChatRequest) {
        let token = self.token_for(exchange_id);
        tracing::info!(%exchange_id, turns = request.turns.len(), "Starting exchange");

        let mut stream = self.transport.send_streaming(request, token.clone());
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    item = stream.next() => item,
                };
                // Late items after cancel are dropped
                if token.is_cancelled() {
                    return;
                }

                let Some(item) = item else {
                    let error = ApiError::unknown("Stream ended before completing");
                    let _ = event_tx.send(Event::StreamFailed { exchange_id, error }).await;
                    return;
                };

                let terminal = item.is_terminal();
                let event = match item {
                    StreamEvent::Fragment(text) => Event::Fragment { exchange_id, text },
                    StreamEvent::Complete => Event::StreamComplete { exchange_id },
                    StreamEvent::Failed(error) => Event::StreamFailed { exchange_id, error },
                };

                if event_tx.send(event).await.is_err() || terminal {
                    return;
                }
            }
        });
    }

    fn start_fallback(&mut self, exchange_id: ExchangeId, request: ChatRequest, cause: &ApiError) {
        let token = self.token_for(exchange_id);
        tracing::warn!(
            %exchange_id,
            kind = ?cause.kind,
            error = %cause.message,
            "Streaming failed, falling back to blocking request"
        );

        let transport = Arc::clone(&self.transport);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return,
                result = transport.send_blocking(&request) => result,
            };
            if token.is_cancelled() {
                return;
            }

            let event = match result {
                Ok(reply) => Event::FallbackReply { exchange_id, reply },
                Err(error) => Event::FallbackFailed { exchange_id, error },
            };
            let _ = event_tx.send(event).await;
        });
    }

    fn view(&self) -> ChatView {
        ChatView {
            messages: self.transcript.snapshot().to_vec(),
            status: self.state.status(),
            connectivity: self.state.connectivity,
        }
    }
}
