//! Streaming substrate (spec §4.8).
//!
//! Grounded on `mofa-foundation::llm::{stream_adapter,stream_bridge}`: a
//! bounded `tokio::sync::mpsc::Receiver<StreamChunk>` wrapped as an `impl
//! Stream`, cancellation threaded through a cloned
//! `tokio_util::sync::CancellationToken` checked once per
//! generation iteration per spec §5 and the Open Question resolution in §9.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use inferno_kernel::{FinishReason, StreamChunk};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A lazy, finite, not-restartable sequence of [`StreamChunk`]s (spec
/// §4.8). Wraps the provider's raw receiver and owns the request's
/// cancellation token so a consumer can cancel without reaching into the
/// session directly.
pub struct ResponseStream {
    receiver: mpsc::Receiver<StreamChunk>,
    cancel: CancellationToken,
    last_sequence: Option<u64>,
}

impl ResponseStream {
    pub fn new(receiver: mpsc::Receiver<StreamChunk>, cancel: CancellationToken) -> Self {
        Self {
            receiver,
            cancel,
            last_sequence: None,
        }
    }

    /// Propagates cancellation to the scheduler/provider session. Idempotent
    /// (spec §5).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for ResponseStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                debug_assert!(
                    self.last_sequence.is_none_or(|prev| chunk.sequence_number > prev),
                    "stream chunks must carry strictly increasing sequence numbers"
                );
                self.last_sequence = Some(chunk.sequence_number);
                Poll::Ready(Some(chunk))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Drains a stream to completion, concatenating `delta` fields. Useful for
/// callers that requested `streaming=false` semantics over a streaming
/// backend, or for tests.
pub async fn collect_content(mut stream: ResponseStream) -> (String, Option<FinishReason>) {
    use futures::StreamExt;
    let mut content = String::new();
    let mut finish_reason = None;
    while let Some(chunk) = stream.next().await {
        content.push_str(&chunk.delta);
        if chunk.is_complete {
            finish_reason = chunk.finish_reason;
        }
    }
    (content, finish_reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn collects_deltas_in_order_until_complete() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for i in 0..3u64 {
                let is_complete = i == 2;
                let _ = tx
                    .send(StreamChunk {
                        request_id: "r1".into(),
                        sequence_number: i,
                        delta: format!("{i}"),
                        is_complete,
                        tool_call_delta: None,
                        finish_reason: is_complete.then_some(FinishReason::Stop),
                    })
                    .await;
            }
        });
        let stream = ResponseStream::new(rx, CancellationToken::new());
        let (content, finish_reason) = collect_content(stream).await;
        assert_eq!(content, "012");
        assert_eq!(finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (_tx, rx) = mpsc::channel(1);
        let stream = ResponseStream::new(rx, CancellationToken::new());
        stream.cancel();
        stream.cancel();
        assert!(stream.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn empty_stream_yields_no_chunks() {
        let (tx, rx) = mpsc::channel::<StreamChunk>(1);
        drop(tx);
        let mut stream = ResponseStream::new(rx, CancellationToken::new());
        assert!(stream.next().await.is_none());
    }
}
