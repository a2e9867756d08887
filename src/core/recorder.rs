//! Response recording for access logging and metrics.
//!
//! A [`ResponseRecord`] captures the status code, whether anything was
//! written, and the total body bytes of a response. The server layer attaches
//! one per request by wrapping the response body, then reads it after the
//! body has been streamed.
use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame};
use hyper::Response;

/// Recorded facts about one response.
#[derive(Debug, Default)]
pub struct ResponseRecord {
    status: AtomicU16,
    written: AtomicBool,
    length: AtomicU64,
}

impl ResponseRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded status. Returns 200 when something was written but no
    /// explicit status was recorded, matching the runtime's implicit header.
    pub fn status_code(&self) -> u16 {
        let status = self.status.load(Ordering::Acquire);
        if status == 0 && self.written() { 200 } else { status }
    }

    pub fn written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    /// Record the status once; later calls are ignored, mirroring the
    /// idempotent `WriteHeader` contract.
    pub fn set_status(&self, status: u16) {
        let _ = self
            .status
            .compare_exchange(0, status, Ordering::AcqRel, Ordering::Acquire);
        self.written.store(true, Ordering::Release);
    }

    fn add_bytes(&self, n: u64) {
        self.length.fetch_add(n, Ordering::AcqRel);
        self.written.store(true, Ordering::Release);
    }
}

type OnComplete = Box<dyn FnOnce(&ResponseRecord) + Send>;

/// Wrap a response so its status and body byte count land in `record`.
pub fn record_response(res: Response<Body>, record: Arc<ResponseRecord>) -> Response<Body> {
    record_response_with(res, record, |_| {})
}

/// As [`record_response`], also invoking `on_complete` once the body has
/// fully streamed. A body dropped mid-stream still fires the callback, so
/// aborted downloads are accounted for.
pub fn record_response_with<F>(
    res: Response<Body>,
    record: Arc<ResponseRecord>,
    on_complete: F,
) -> Response<Body>
where
    F: FnOnce(&ResponseRecord) + Send + 'static,
{
    record.set_status(res.status().as_u16());
    let (parts, body) = res.into_parts();
    let counted = Body::new(RecordingBody {
        inner: body,
        record,
        on_complete: Some(Box::new(on_complete)),
    });
    Response::from_parts(parts, counted)
}

/// Body decorator that counts streamed data bytes.
pub struct RecordingBody<B> {
    inner: B,
    record: Arc<ResponseRecord>,
    on_complete: Option<OnComplete>,
}

impl<B> Drop for RecordingBody<B> {
    fn drop(&mut self) {
        if let Some(complete) = self.on_complete.take() {
            complete(&self.record);
        }
    }
}

impl<B> HttpBody for RecordingBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record.add_bytes(data.len() as u64);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                if let Some(complete) = this.on_complete.take() {
                    complete(&this.record);
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}
