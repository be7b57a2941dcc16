//! Response body relay through a pooled buffer.
//!
//! Upstream data frames are copied into the loaned buffer and emitted to the
//! client when the buffer fills, when the upstream has nothing ready, or when
//! the upstream ends. Bytes and trailers are passed through unchanged. The
//! buffer goes back to the pool when the body is dropped, whether the copy
//! finished, failed, or the client went away.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use hyper::body::{Body as HttpBody, Frame, SizeHint};

use crate::buffers::PooledBuffer;

pub struct RelayBody {
    upstream: Body,
    buffer: PooledBuffer,
    filled: usize,
    carry: Bytes,
    trailers: Option<HeaderMap>,
    upstream_done: bool,
}

impl RelayBody {
    pub fn new(upstream: Body, buffer: PooledBuffer) -> Self {
        Self {
            upstream,
            buffer,
            filled: 0,
            carry: Bytes::new(),
            trailers: None,
            upstream_done: false,
        }
    }

    /// Move as much of `carry` as fits into the buffer.
    fn absorb(&mut self) {
        let room = self.buffer.len() - self.filled;
        let n = room.min(self.carry.len());
        if n == 0 {
            return;
        }
        self.buffer[self.filled..self.filled + n].copy_from_slice(&self.carry[..n]);
        self.filled += n;
        self.carry = self.carry.slice(n..);
    }

    fn flush(&mut self) -> Frame<Bytes> {
        let chunk = Bytes::copy_from_slice(&self.buffer[..self.filled]);
        self.filled = 0;
        Frame::data(chunk)
    }
}

impl HttpBody for RelayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();

        // A zero-sized buffer would never make progress.
        if this.buffer.is_empty() {
            return Pin::new(&mut this.upstream).poll_frame(cx);
        }

        loop {
            this.absorb();
            if this.filled == this.buffer.len() {
                return Poll::Ready(Some(Ok(this.flush())));
            }

            if this.upstream_done {
                if this.filled > 0 {
                    return Poll::Ready(Some(Ok(this.flush())));
                }
                return Poll::Ready(this.trailers.take().map(|t| Ok(Frame::trailers(t))));
            }

            match Pin::new(&mut this.upstream).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => this.carry = data,
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            this.trailers = Some(trailers);
                            this.upstream_done = true;
                        }
                    }
                },
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => this.upstream_done = true,
                Poll::Pending => {
                    if this.filled > 0 {
                        return Poll::Ready(Some(Ok(this.flush())));
                    }
                    return Poll::Pending;
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.upstream_done && self.filled == 0 && self.carry.is_empty() && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        let buffered = (self.filled + self.carry.len()) as u64;
        if self.upstream_done {
            return SizeHint::with_exact(buffered);
        }
        let upstream = self.upstream.size_hint();
        let mut hint = SizeHint::new();
        hint.set_lower(upstream.lower() + buffered);
        if let Some(upper) = upstream.upper() {
            hint.set_upper(upper + buffered);
        }
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferPool;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn relays_bytes_unchanged() {
        let pool = BufferPool::new(1, 1024);
        let data = payload(10 * 1024 + 17);

        let relay = RelayBody::new(Body::from(data.clone()), pool.acquire().await);
        assert_eq!(pool.available(), 0);

        let out = axum::body::to_bytes(Body::new(relay), usize::MAX).await.unwrap();
        assert_eq!(out.as_ref(), data.as_slice());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn empty_body() {
        let pool = BufferPool::new(1, 64);
        let relay = RelayBody::new(Body::empty(), pool.acquire().await);

        let out = axum::body::to_bytes(Body::new(relay), usize::MAX).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn frames_never_exceed_buffer_size() {
        let pool = BufferPool::new(1, 100);
        let data = payload(1000);
        let mut relay = RelayBody::new(Body::from(data.clone()), pool.acquire().await);

        let mut out = Vec::new();
        while let Some(frame) = std::future::poll_fn(|cx| Pin::new(&mut relay).poll_frame(cx)).await {
            let chunk = frame.unwrap().into_data().unwrap();
            assert!(chunk.len() <= 100);
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, data);
        assert!(relay.is_end_stream());
    }

    #[tokio::test]
    async fn dropping_mid_copy_returns_buffer() {
        let pool = BufferPool::new(1, 16);
        let mut relay = RelayBody::new(Body::from(payload(64)), pool.acquire().await);

        let first = std::future::poll_fn(|cx| Pin::new(&mut relay).poll_frame(cx)).await;
        assert!(first.is_some());
        assert_eq!(pool.available(), 0);

        drop(relay);
        assert_eq!(pool.available(), 1);
    }
}
