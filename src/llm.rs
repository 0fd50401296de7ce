//! Transport client for the remote chat endpoint
//!
//! Provides the connectivity probe, the blocking call and the best-effort
//! streaming call the exchange runtime drives.

mod error;
mod graphql;
mod stream;
mod types;


pub use error::{ApiError, ApiErrorKind, NO_VALID_REPLY};
pub use graphql::GraphqlTransport;
pub use stream::{progressive_prefixes, simulate_stream, FragmentPlan};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Common interface for chat endpoints
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Check that the endpoint is reachable and not failing.
    ///
    /// Never fails; any transport problem or server error is `false`.
    async fn probe_connectivity(&self) -> bool;

    /// Send the request and wait for the complete reply
    async fn send_blocking(&self, request: &ChatRequest) -> Result<ChatReply, ApiError>;

    /// Deliver the reply incrementally.
    ///
    /// Implementations stop yielding once `cancel` fires. Consumers must
    /// still guard against late items: not every transport can abort.
    fn send_streaming(&self, request: ChatRequest, cancel: CancellationToken) -> ReplyStream;

    /// Identifier used in logs
    fn name(&self) -> &str;
}

/// Logging wrapper for transports
pub struct LoggingTransport {
    inner: Arc<dyn ChatTransport>,
    name: String,
}

impl LoggingTransport {
    pub fn new(inner: Arc<dyn ChatTransport>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl ChatTransport for LoggingTransport {
    async fn probe_connectivity(&self) -> bool {
        let start = std::time::Instant::now();
        let reachable = self.inner.probe_connectivity().await;
        tracing::info!(
            transport = %self.name,
            duration_ms = %start.elapsed().as_millis(),
            reachable,
            "Connectivity probe finished"
        );
        reachable
    }

    async fn send_blocking(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let start = std::time::Instant::now();
        let result = self.inner.send_blocking(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    transport = %self.name,
                    duration_ms = %duration.as_millis(),
                    turns = request.turns.len(),
                    prompt_tokens = reply.usage.prompt_tokens,
                    completion_tokens = reply.usage.completion_tokens,
                    "Chat request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    transport = %self.name,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    status = ?e.status,
                    retryable = e.kind.is_retryable(),
                    "Chat request failed"
                );
            }
        }

        result
    }

    fn send_streaming(&self, request: ChatRequest, cancel: CancellationToken) -> ReplyStream {
        let name = self.name.clone();
        let start = std::time::Instant::now();
        tracing::debug!(transport = %name, turns = request.turns.len(), "Starting streamed reply");

        let stream = self.inner.send_streaming(request, cancel).inspect(move |event| match event {
            StreamEvent::Fragment(text) => {
                tracing::trace!(transport = %name, len = text.len(), "Fragment received");
            }
            StreamEvent::Complete => {
                tracing::info!(
                    transport = %name,
                    duration_ms = %start.elapsed().as_millis(),
                    "Streamed reply completed"
                );
            }
            StreamEvent::Failed(e) => {
                tracing::warn!(
                    transport = %name,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    "Streamed reply failed"
                );
            }
        });
        Box::pin(stream)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn probe_connectivity(&self) -> bool {
        (**self).probe_connectivity().await
    }

    async fn send_blocking(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        (**self).send_blocking(request).await
    }

    fn send_streaming(&self, request: ChatRequest, cancel: CancellationToken) -> ReplyStream {
        (**self).send_streaming(request, cancel)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
