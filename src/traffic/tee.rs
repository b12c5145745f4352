//! Response body tee.
//!
//! Streams every frame through unchanged while keeping a bounded copy of the
//! data. The completion callback fires exactly once: at end of stream, on a
//! body error, or when the body is dropped early (client went away).

use axum::body::{Body, Bytes};
use axum::response::Response;
use http_body::{Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};

type OnComplete = Box<dyn FnOnce(Bytes) + Send + 'static>;

pub struct TeeBody {
    inner: Body,
    captured: Vec<u8>,
    limit: usize,
    on_complete: Option<OnComplete>,
}

impl TeeBody {
    pub fn new<F>(inner: Body, limit: usize, on_complete: F) -> Self
    where
        F: FnOnce(Bytes) + Send + 'static,
    {
        Self {
            inner,
            captured: Vec::new(),
            limit,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn record(&mut self, data: &Bytes) {
        let room = self.limit.saturating_sub(self.captured.len());
        if room > 0 {
            let take = room.min(data.len());
            self.captured.extend_from_slice(&data[..take]);
        }
    }

    fn finish(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(Bytes::from(std::mem::take(&mut self.captured)));
        }
    }
}

impl http_body::Body for TeeBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TeeBody {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Run `on_sent` once the response body has been streamed out (or abandoned).
pub fn on_body_sent<F>(response: Response, on_sent: F) -> Response
where
    F: FnOnce() + Send + 'static,
{
    let (parts, body) = response.into_parts();
    let tee = TeeBody::new(body, 0, move |_| on_sent());
    Response::from_parts(parts, Body::new(tee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn capture() -> (Arc<Mutex<Option<Bytes>>>, impl FnOnce(Bytes) + Send + 'static) {
        let slot = Arc::new(Mutex::new(None));
        let writer = slot.clone();
        (slot, move |bytes| *writer.lock().unwrap() = Some(bytes))
    }

    #[tokio::test]
    async fn test_streams_unchanged_and_captures_prefix() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let inner = Body::from_stream(stream::iter(chunks));
        let (slot, on_complete) = capture();

        let tee = TeeBody::new(inner, 8, on_complete);
        let forwarded = Body::new(tee).collect().await.unwrap().to_bytes();

        assert_eq!(forwarded, Bytes::from_static(b"hello world"));
        assert_eq!(slot.lock().unwrap().as_deref(), Some(&b"hello wo"[..]));
    }

    #[tokio::test]
    async fn test_drop_fires_callback_once() {
        let (slot, on_complete) = capture();
        let tee = TeeBody::new(Body::from("partial"), 1024, on_complete);
        drop(tee);
        assert_eq!(slot.lock().unwrap().as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_empty_body_completes() {
        let (slot, on_complete) = capture();
        let collected = Body::new(TeeBody::new(Body::empty(), 16, on_complete))
            .collect()
            .await
            .unwrap()
            .to_bytes();
        assert!(collected.is_empty());
        assert_eq!(slot.lock().unwrap().as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_on_body_sent_waits_for_last_frame() {
        let (tx, rx) = mpsc::channel::<Bytes>(4);
        let chunks = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
        });
        let sent = Arc::new(AtomicBool::new(false));
        let flag = sent.clone();

        let response = on_body_sent(Response::new(Body::from_stream(chunks)), move || {
            flag.store(true, Ordering::SeqCst)
        });
        let mut body = response.into_body();

        tx.send(Bytes::from_static(b"head")).await.unwrap();
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"head"));
        assert!(!sent.load(Ordering::SeqCst));

        drop(tx);
        assert!(body.frame().await.is_none());
        assert!(sent.load(Ordering::SeqCst));
    }
}
