//! Byte metering and connection-scoped body streams.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::engine::ByteStream;
use crate::session::{ConnectionGuard, SessionHandle};

/// Shared counter of bytes delivered to a client.
#[derive(Debug, Clone, Default)]
pub struct ByteMeter {
    bytes: Arc<AtomicU64>,
}

impl ByteMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Wraps `stream` so every chunk it yields is counted by `meter`.
pub fn meter_stream(stream: ByteStream, meter: ByteMeter) -> ByteStream {
    stream
        .inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                meter.record(chunk.len() as u64);
            }
        })
        .boxed()
}

/// Samples a [`ByteMeter`] every `window` and marks the session as serving
/// once more than `threshold` bytes were delivered. Stops when dropped,
/// checking the meter one last time so a transfer that ends between two
/// samples still counts.
#[derive(Debug)]
pub struct ServingMonitor {
    task: JoinHandle<()>,
    meter: ByteMeter,
    threshold: u64,
    session: SessionHandle,
}

impl ServingMonitor {
    pub fn spawn(meter: ByteMeter, threshold: u64, window: Duration, session: SessionHandle) -> Self {
        let task = {
            let meter = meter.clone();
            let session = session.clone();
            tokio::spawn(async move {
                let mut ticker = interval(window);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if meter.total() > threshold {
                        session.mark_serving();
                        break;
                    }
                }
            })
        };
        Self {
            task,
            meter,
            threshold,
            session,
        }
    }
}

impl Drop for ServingMonitor {
    fn drop(&mut self) {
        self.task.abort();
        if self.meter.total() > self.threshold {
            self.session.mark_serving();
        }
    }
}

/// Response body that holds a session connection for its whole lifetime.
///
/// Dropped when the exchange ends, whether the body was fully sent or the
/// client disconnected; either way the connection is detached exactly once.
pub struct AttachedStream {
    inner: ByteStream,
    _connection: ConnectionGuard,
    _monitor: Option<ServingMonitor>,
}

impl AttachedStream {
    pub fn new(inner: ByteStream, connection: ConnectionGuard, monitor: Option<ServingMonitor>) -> Self {
        Self {
            inner,
            _connection: connection,
            _monitor: monitor,
        }
    }
}

impl Stream for AttachedStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn test_meter_counts_delivered_bytes() {
        let chunks = vec![Ok(Bytes::from_static(b"abcd")), Ok(Bytes::from_static(b"ef"))];
        let meter = ByteMeter::new();
        let mut metered = meter_stream(stream::iter(chunks).boxed(), meter.clone());

        assert_eq!(meter.total(), 0);
        while metered.next().await.is_some() {}
        assert_eq!(meter.total(), 6);
    }

    #[tokio::test]
    async fn test_meter_ignores_errors() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("peer went away")),
        ];
        let meter = ByteMeter::new();
        let collected: Vec<_> = meter_stream(stream::iter(chunks).boxed(), meter.clone())
            .collect()
            .await;

        assert_eq!(collected.len(), 2);
        assert_eq!(meter.total(), 3);
    }
}
