//! Request body size enforcement.
//!
//! Three modes, chosen per request from the advertised `Content-Length`:
//!
//! * length advertised and over the limit: drain, discard, 413;
//! * length unknown (or memory buffering disabled): the body is wrapped in a
//!   streaming cap that fails reads past the limit, which the shared body
//!   collect helper maps to 413;
//! * length advertised and within the limit: the body is buffered up front,
//!   in memory when it fits `mem_limit`, otherwise spilled to a temp file
//!   under `temp_path` that is removed when the request completes.
//!
//! A short read against the advertised length is a 400 in both buffered
//! modes.
use std::{
    path::{Path, PathBuf},
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::header;
use http_body::{Body as HttpBody, Frame};
use http_body_util::BodyExt;
use hyper::Request;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::core::{
    HttpError,
    error::{ERR_BAD_REQUEST, ERR_ENTITY_TOO_LARGE},
    handler::{BodySizeExceeded, Handler, HandlerResult, Middleware},
};

/// Process-wide monotonic counter for spill file names. Wrap-around is
/// tolerated; uniqueness is secured by the microsecond timestamp.
static SPILL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Body size enforcement middleware.
pub struct BodyLimitMiddleware {
    /// Maximum accepted body size; zero or negative bypasses the middleware.
    max_size: i64,
    /// Largest body buffered in memory; zero or negative forces streaming.
    mem_limit: i64,
    /// Directory for spill files.
    temp_path: PathBuf,
}

impl BodyLimitMiddleware {
    pub fn new(max_size: i64, mem_limit: i64, temp_path: impl Into<PathBuf>) -> Self {
        Self {
            max_size,
            mem_limit,
            temp_path: temp_path.into(),
        }
    }

    fn advertised_length(req: &Request<Body>) -> Option<i64> {
        req.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
    }

    /// Read the advertised number of bytes into memory.
    async fn buffer_in_memory(body: Body, advertised: i64) -> Result<Bytes, HttpError> {
        let collected = body
            .collect()
            .await
            .map_err(|e| HttpError::new(e, ERR_BAD_REQUEST.status()))?
            .to_bytes();
        if collected.len() as i64 != advertised {
            return Err(ERR_BAD_REQUEST.clone());
        }
        Ok(collected)
    }

    /// Stream the body into a temp file, capped at `max_size`, and return a
    /// body reading the file back. The file is removed when the returned
    /// body drops.
    async fn spill_to_file(&self, mut body: Body, advertised: i64) -> Result<Body, HttpError> {
        let name = format!(
            "body-{}-{:020}",
            chrono::Utc::now().format("%Y%m%d%H%M%S%.6f"),
            SPILL_COUNTER.fetch_add(1, Ordering::Relaxed),
        );
        let path = self.temp_path.join(name);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| HttpError::new(e, 500))?;

        let guard = SpillGuard { path: path.clone() };
        let mut written: i64 = 0;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| HttpError::new(e, ERR_BAD_REQUEST.status()))?;
            let Some(data) = frame.data_ref() else {
                continue;
            };
            written += data.len() as i64;
            if written > self.max_size {
                return Err(ERR_ENTITY_TOO_LARGE.clone());
            }
            file.write_all(data)
                .await
                .map_err(|e| HttpError::new(e, 500))?;
        }

        if written != advertised {
            return Err(ERR_BAD_REQUEST.clone());
        }

        file.rewind().await.map_err(|e| HttpError::new(e, 500))?;
        let stream = tokio_util::io::ReaderStream::new(file);
        Ok(Body::new(SpillBody {
            inner: Body::from_stream(stream),
            _guard: guard,
        }))
    }
}

#[async_trait]
impl Middleware for BodyLimitMiddleware {
    async fn handle(&self, req: Request<Body>, next: Arc<dyn Handler>) -> HandlerResult {
        if self.max_size <= 0 {
            return next.handle(req).await;
        }

        let advertised = Self::advertised_length(&req);
        let (mut parts, body) = req.into_parts();

        match advertised {
            // A definite positive advertised length over the limit wins the
            // tie-break: drain, discard, reject.
            Some(len) if len > self.max_size => {
                drain(body).await;
                metrics::counter!(crate::metrics::PORTICO_BODY_LIMIT_REJECTIONS_TOTAL).increment(1);
                Err(ERR_ENTITY_TOO_LARGE.clone())
            }
            Some(len) if self.mem_limit > 0 && len <= self.mem_limit => {
                let buffered = Self::buffer_in_memory(body, len).await?;
                let req = Request::from_parts(parts, Body::from(buffered));
                next.handle(req).await
            }
            Some(len) if self.mem_limit > 0 => {
                let spilled = self.spill_to_file(body, len).await?;
                let req = Request::from_parts(parts, spilled);
                next.handle(req).await
            }
            // Unknown length, or buffering disabled: cap the stream.
            _ => {
                parts.headers.remove(header::CONTENT_LENGTH);
                let capped = Body::new(CappedBody {
                    inner: body,
                    limit: self.max_size,
                    remaining: self.max_size,
                    tripped: false,
                });
                let req = Request::from_parts(parts, capped);
                next.handle(req).await
            }
        }
    }
}

/// Read the body to completion, discarding the bytes, so the peer is not
/// left blocked mid-send.
async fn drain(mut body: Body) {
    while let Some(frame) = body.frame().await {
        if frame.is_err() {
            break;
        }
    }
}

/// Streaming cap: fails the read once cumulative data exceeds the limit.
struct CappedBody {
    inner: Body,
    limit: i64,
    remaining: i64,
    tripped: bool,
}

impl HttpBody for CappedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        if this.tripped {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.remaining -= data.len() as i64;
                    if this.remaining < 0 {
                        this.tripped = true;
                        metrics::counter!(crate::metrics::PORTICO_BODY_LIMIT_REJECTIONS_TOTAL).increment(1);
                        return Poll::Ready(Some(Err(axum::Error::new(BodySizeExceeded {
                            limit: this.limit,
                        }))));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            other => other,
        }
    }
}

/// Removes the spill file when the body is dropped, covering success, error
/// and cancellation paths alike.
struct SpillGuard {
    path: PathBuf,
}

impl Drop for SpillGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "spill file cleanup failed");
        }
    }
}

struct SpillBody {
    inner: Body,
    _guard: SpillGuard,
}

impl HttpBody for SpillBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}

/// Expose the spill file name pattern so operators can match it.
pub fn spill_file_matches(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("body-") else {
        return false;
    };
    // YYYYMMDDhhmmss.uuuuuu-<20 digits>
    let mut parts = rest.splitn(2, '-');
    let stamp = parts.next().unwrap_or_default();
    let counter = parts.next().unwrap_or_default();
    stamp.len() == 21
        && stamp.as_bytes().get(14) == Some(&b'.')
        && counter.len() == 20
        && counter.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use hyper::Response;

    use super::*;
    use crate::core::handler::collect_body;

    /// Terminal handler echoing the request body back.
    struct EchoBody;

    #[async_trait]
    impl Handler for EchoBody {
        async fn handle(&self, req: Request<Body>) -> HandlerResult {
            let bytes = collect_body(req.into_body()).await?;
            Ok(Response::new(Body::from(bytes)))
        }
    }

    fn request(content_length: Option<u64>, body: &'static [u8]) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/x");
        if let Some(len) = content_length {
            builder = builder.header(header::CONTENT_LENGTH, len);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_bypass_when_disabled() {
        let mw = BodyLimitMiddleware::new(0, 0, "./");
        let res = mw
            .handle(request(Some(10), b"1234567890"), Arc::new(EchoBody))
            .await
            .unwrap();
        let bytes = collect_body(res.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"1234567890");
    }

    #[tokio::test]
    async fn test_advertised_over_limit_is_413() {
        let mw = BodyLimitMiddleware::new(5, 5, "./");
        let err = mw
            .handle(request(Some(10), b"1234567890"), Arc::new(EchoBody))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 413);
    }

    #[tokio::test]
    async fn test_memory_path_delivers_exact_bytes() {
        let mw = BodyLimitMiddleware::new(10, 10, "./");
        let res = mw
            .handle(request(Some(10), b"1234567890"), Arc::new(EchoBody))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let bytes = collect_body(res.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"1234567890");
    }

    #[tokio::test]
    async fn test_memory_path_short_read_is_400() {
        let mw = BodyLimitMiddleware::new(100, 100, "./");
        let err = mw
            .handle(request(Some(12), b"1234567890"), Arc::new(EchoBody))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_spill_path_round_trips_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mw = BodyLimitMiddleware::new(100, 5, dir.path());
        let res = mw
            .handle(request(Some(10), b"1234567890"), Arc::new(EchoBody))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let bytes = collect_body(res.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"1234567890");

        // Response body fully consumed: the temp file must be gone.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn test_unknown_length_streaming_cap_is_413() {
        let mw = BodyLimitMiddleware::new(5, 5, "./");
        let err = mw
            .handle(request(None, b"1234567890"), Arc::new(EchoBody))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 413);
    }

    #[tokio::test]
    async fn test_streaming_cap_under_limit_passes() {
        let mw = BodyLimitMiddleware::new(100, 0, "./");
        let res = mw
            .handle(request(None, b"1234567890"), Arc::new(EchoBody))
            .await
            .unwrap();
        let bytes = collect_body(res.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"1234567890");
    }

    #[test]
    fn test_spill_file_name_shape() {
        assert!(spill_file_matches(
            "body-20260830123456.123456-00000000000000000042"
        ));
        assert!(!spill_file_matches("body-oops"));
        assert!(!spill_file_matches("other-20260830123456.123456-0"));
    }
}
