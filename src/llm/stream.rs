//! Simulated streaming on top of a single blocking reply
//!
//! The endpoint does not guarantee incremental delivery, so streaming is a
//! behavioral contract: the reply is cut into progressive prefixes and
//! yielded as fragments.

use super::types::{ChatReply, ReplyStream, StreamEvent};
use super::ApiError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// How a complete reply is cut into fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentPlan {
    /// Characters added per fragment; 0 delivers the whole reply at once
    pub chunk_chars: usize,
    /// Pause between fragments
    pub interval: Duration,
}

impl FragmentPlan {
    pub fn whole() -> Self {
        Self::default()
    }

    pub fn chunked(chunk_chars: usize, interval: Duration) -> Self {
        Self {
            chunk_chars,
            interval,
        }
    }
}

/// Cut `text` into successively longer prefixes on char boundaries.
///
/// The last prefix always equals `text`, and there is always at least one
/// prefix (an empty reply yields a single empty fragment).
pub fn progressive_prefixes(text: &str, chunk_chars: usize) -> Vec<String> {
    if chunk_chars == 0 {
        return vec![text.to_string()];
    }

    let mut prefixes = Vec::new();
    let mut current = String::with_capacity(text.len());
    let mut in_chunk = 0;
    for c in text.chars() {
        current.push(c);
        in_chunk += 1;
        if in_chunk == chunk_chars {
            prefixes.push(current.clone());
            in_chunk = 0;
        }
    }
    if in_chunk > 0 || prefixes.is_empty() {
        prefixes.push(current);
    }
    prefixes
}

/// Turn a pending blocking reply into a fragment stream.
///
/// The producer stops as soon as `cancel` fires or the consumer drops the
/// stream; no further events are yielded after cancellation.
pub fn simulate_stream<F>(reply: F, plan: FragmentPlan, cancel: CancellationToken) -> ReplyStream
where
    F: Future<Output = Result<ChatReply, ApiError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = reply => result,
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                let _ = tx.send(StreamEvent::Failed(e)).await;
                return;
            }
        };

        let prefixes = progressive_prefixes(&reply.text, plan.chunk_chars);
        let count = prefixes.len();
        for (i, prefix) in prefixes.into_iter().enumerate() {
            if cancel.is_cancelled() || tx.send(StreamEvent::Fragment(prefix)).await.is_err() {
                return;
            }
            if i + 1 < count && !plan.interval.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(plan.interval) => {}
                }
            }
        }

        if !cancel.is_cancelled() {
            let _ = tx.send(StreamEvent::Complete).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
