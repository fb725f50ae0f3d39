// ABOUTME: Streaming body adapters for the proxy
// ABOUTME: Request size capping and response byte counting without buffering

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Caps a request body stream at `limit` bytes. Chunks past the limit are
/// truncated and the stream ends, so an oversized body is detectable by
/// the upstream without ever being buffered whole.
pub struct LimitedStream<S> {
    inner: S,
    remaining: u64,
}

impl<S> LimitedStream<S> {
    pub fn new(inner: S, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<S, E> Stream for LimitedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(mut bytes))) => {
                if bytes.len() as u64 > self.remaining {
                    bytes.truncate(self.remaining as usize);
                }
                self.remaining -= bytes.len() as u64;
                Poll::Ready(Some(Ok(bytes)))
            }
            other => other,
        }
    }
}

/// Counts the bytes of a response body stream and invokes a callback with
/// the total once the stream is dropped. Dropping rather than completion
/// is the trigger so a client disconnect still records the transaction
/// with the bytes that were actually streamed.
pub struct MeteredStream<S> {
    inner: S,
    bytes: u64,
    on_done: Option<Box<dyn FnOnce(u64) + Send>>,
}

impl<S> MeteredStream<S> {
    pub fn new(inner: S, on_done: impl FnOnce(u64) + Send + 'static) -> Self {
        Self {
            inner,
            bytes: 0,
            on_done: Some(Box::new(on_done)),
        }
    }
}

impl<S, E> Stream for MeteredStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.bytes += bytes.len() as u64;
                Poll::Ready(Some(Ok(bytes)))
            }
            other => other,
        }
    }
}

impl<S> Drop for MeteredStream<S> {
    fn drop(&mut self) {
        if let Some(on_done) = self.on_done.take() {
            on_done(self.bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect<S, E>(stream: S) -> Vec<u8>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Debug,
    {
        stream
            .fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk.unwrap());
                acc
            })
            .await
    }

    #[tokio::test]
    async fn limited_stream_passes_small_bodies() {
        let limited = LimitedStream::new(chunks(&["hello", " ", "world"]), 100);
        assert_eq!(collect(limited).await, b"hello world");
    }

    #[tokio::test]
    async fn limited_stream_truncates_at_the_cap() {
        let limited = LimitedStream::new(chunks(&["hello", " ", "world"]), 7);
        assert_eq!(collect(limited).await, b"hello w");
    }

    #[tokio::test]
    async fn metered_stream_reports_total_on_drop() {
        let total = Arc::new(AtomicU64::new(0));
        let captured = total.clone();
        let metered = MeteredStream::new(chunks(&["abc", "de"]), move |n| {
            captured.store(n, Ordering::SeqCst);
        });
        assert_eq!(collect(metered).await, b"abcde");
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn metered_stream_reports_partial_bytes_when_abandoned() {
        let total = Arc::new(AtomicU64::new(u64::MAX));
        let captured = total.clone();
        let mut metered = MeteredStream::new(chunks(&["abc", "de"]), move |n| {
            captured.store(n, Ordering::SeqCst);
        });
        // Consume one chunk, then drop mid-stream.
        let first = metered.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"abc");
        drop(metered);
        assert_eq!(total.load(Ordering::SeqCst), 3);
    }
}
