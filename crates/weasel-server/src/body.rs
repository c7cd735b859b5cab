use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use tokio::time::{Instant, Sleep};
use tracing::{debug, error, warn};
use weasel_cache::{CachedObject, SharedCache};
use weasel_store::{ByteStream, Meta};

/// Size and lifetime limits for cached objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    /// Largest body, in bytes, that is still written to the cache.
    pub max_item_size: usize,
    /// Lifetime of a cache entry from the moment it is written.
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_item_size: 1 << 20,
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Upper bound on the cache write performed at end of stream.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

enum State {
    Streaming,
    Storing(BoxFuture<'static, ()>),
    Done,
}

/// Body wrapper that mirrors every chunk into a buffer and stores the object
/// in the shared cache once the underlying stream ends cleanly.
///
/// The cache write happens before end-of-stream is reported, so a consumer
/// that has drained the body can rely on the entry being present (unless
/// the write failed, which is logged and otherwise ignored). Nothing is
/// written when the object outgrows `max_item_size`, when the underlying
/// stream errors, or when the body is dropped before its end.
///
/// A body given a deadline fails with [`io::ErrorKind::TimedOut`] once the
/// underlying stream is still waiting for data past that instant.
pub struct CachingBody {
    inner: ByteStream,
    buf: Option<BytesMut>,
    key: String,
    meta: Meta,
    policy: CachePolicy,
    cache: Arc<dyn SharedCache>,
    deadline: Option<Pin<Box<Sleep>>>,
    write_timeout: Duration,
    state: State,
}

impl CachingBody {
    pub fn new(
        inner: ByteStream,
        key: String,
        meta: Meta,
        policy: CachePolicy,
        cache: Arc<dyn SharedCache>,
    ) -> Self {
        Self {
            inner,
            buf: Some(BytesMut::new()),
            key,
            meta,
            policy,
            cache,
            deadline: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            state: State::Streaming,
        }
    }

    /// Fail the read if the underlying stream stalls past `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(Box::pin(tokio::time::sleep_until(deadline)));
        self
    }

    /// Give up on the end-of-stream cache write after `timeout`.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn boxed(self) -> ByteStream {
        StreamExt::boxed(self)
    }

    fn capture(&mut self, chunk: &Bytes) {
        let Some(buf) = self.buf.as_mut() else {
            return;
        };
        if buf.len() + chunk.len() > self.policy.max_item_size {
            debug!(key = %self.key, max = self.policy.max_item_size, "object too large to cache");
            self.buf = None;
        } else {
            buf.extend_from_slice(chunk);
        }
    }

    fn poll_inner(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        if let Poll::Ready(item) = self.inner.poll_next_unpin(cx) {
            return Poll::Ready(item);
        }
        match self.deadline.as_mut().map(|deadline| deadline.poll_unpin(cx).is_ready()) {
            Some(true) => {
                warn!(key = %self.key, "object body stalled past the fetch deadline");
                Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "object body read timed out",
                ))))
            }
            _ => Poll::Pending,
        }
    }

    fn store_future(&mut self, buf: BytesMut) -> BoxFuture<'static, ()> {
        let cache = Arc::clone(&self.cache);
        let key = std::mem::take(&mut self.key);
        let entry = CachedObject::new(std::mem::take(&mut self.meta), buf.to_vec());
        let ttl = self.policy.ttl;
        let write_timeout = self.write_timeout;
        async move {
            let value = match entry.encode() {
                Ok(v) => v,
                Err(e) => {
                    error!(%key, error = %e, "encoding cache entry");
                    return;
                }
            };
            match tokio::time::timeout(write_timeout, cache.set(&key, Bytes::from(value), ttl)).await {
                Ok(Ok(())) => debug!(%key, size = entry.body.len(), "object cached"),
                Ok(Err(e)) => error!(%key, error = %e, "cache set failed"),
                Err(_) => warn!(%key, timeout = ?write_timeout, "cache set timed out"),
            }
        }
        .boxed()
    }
}

impl Stream for CachingBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Streaming => match ready!(this.poll_inner(cx)) {
                    Some(Ok(chunk)) => {
                        this.capture(&chunk);
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    Some(Err(e)) => {
                        this.buf = None;
                        this.state = State::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    None => match this.buf.take() {
                        Some(buf) => this.state = State::Storing(this.store_future(buf)),
                        None => this.state = State::Done,
                    },
                },
                State::Storing(fut) => {
                    ready!(fut.poll_unpin(cx));
                    this.state = State::Done;
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}
