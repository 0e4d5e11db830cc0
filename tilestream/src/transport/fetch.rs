//! Abortable request/response wrapper.
//!
//! A [`Transport`] describes one request. Starting it spawns the network work
//! on the tokio runtime and returns a [`PendingFetch`] through which the owner
//! receives [`TransportEvent`]s without blocking.
//!
//! ```text
//! Transport::start ──► network task ──(mpsc)──► PendingFetch::try_next
//!                          ▲                          │
//!                          └──── CancellationToken ◄──┘ abort()
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut fetch = Transport::post(backend, "http://localhost:8089/tiles")
//!     .with_json_body(&body)?
//!     .with_mode(CompletionMode::Chunked)
//!     .start(&handle, generation);
//!
//! while let Some(event) = fetch.try_next() {
//!     match event {
//!         TransportEvent::Frame(frame) => queue.push(frame),
//!         TransportEvent::Finished => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::backend::{ByteStream, HttpBackend, HttpMethod, HttpRequest};
use super::error::TransportError;
use crate::protocol::{Frame, FrameDecoder, FrameType};

/// How the response body is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// The whole body once, as bytes.
    #[default]
    Blob,
    /// The body parsed as JSON, together with its raw bytes.
    Json,
    /// Frames as they complete, through a fresh [`FrameDecoder`].
    Chunked,
}

/// A delivery from a running fetch.
#[derive(Debug)]
pub enum TransportEvent {
    /// Complete body ([`CompletionMode::Blob`]).
    Blob(Bytes),
    /// Parsed body and its raw bytes ([`CompletionMode::Json`]).
    Json { value: serde_json::Value, raw: Bytes },
    /// One decoded frame ([`CompletionMode::Chunked`]).
    Frame(Frame),
    /// The request failed. Never sent for aborts.
    Failed(TransportError),
    /// The response was fully delivered.
    Finished,
}

impl TransportEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Failed(_) | TransportEvent::Finished)
    }
}

/// One HTTP request with a chosen completion mode.
pub struct Transport {
    backend: Arc<dyn HttpBackend>,
    request: HttpRequest,
    mode: CompletionMode,
}

impl Transport {
    /// Creates a GET request.
    pub fn get(backend: Arc<dyn HttpBackend>, url: impl Into<String>) -> Self {
        Self::new(backend, HttpMethod::Get, url)
    }

    /// Creates a POST request.
    pub fn post(backend: Arc<dyn HttpBackend>, url: impl Into<String>) -> Self {
        Self::new(backend, HttpMethod::Post, url)
    }

    pub fn new(backend: Arc<dyn HttpBackend>, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            backend,
            request: HttpRequest {
                method,
                url: url.into(),
                body: None,
            },
            mode: CompletionMode::default(),
        }
    }

    /// Serializes `body` as the JSON request body.
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> Result<Self, TransportError> {
        let json =
            serde_json::to_string(body).map_err(|e| TransportError::RequestBody(e.to_string()))?;
        self.request.body = Some(json);
        Ok(self)
    }

    /// Sets the completion mode.
    pub fn with_mode(mut self, mode: CompletionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn body(&self) -> Option<&str> {
        self.request.body.as_deref()
    }

    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    /// Spawns the request on `runtime`.
    ///
    /// `generation` is an opaque tag handed back by
    /// [`PendingFetch::generation`], used by owners to tell fetches apart.
    pub fn start(self, runtime: &Handle, generation: u64) -> PendingFetch {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.request.url.clone();
        runtime.spawn(self.drive(cancel.clone(), tx));
        PendingFetch {
            generation,
            url,
            cancel,
            events: rx,
            aborted: false,
            finished: false,
        }
    }

    /// Performs the request and decodes the whole body as `T`.
    pub async fn fetch_json<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        let bytes = self.fetch_bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Json(e.to_string()))
    }

    /// Performs the request and returns the whole body.
    pub async fn fetch_bytes(self) -> Result<Bytes, TransportError> {
        let stream = self.backend.send(self.request).await?;
        read_body(stream, &CancellationToken::new()).await
    }

    async fn drive(self, cancel: CancellationToken, tx: mpsc::UnboundedSender<TransportEvent>) {
        let url = self.request.url.clone();
        let mode = self.mode;
        let response = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(TransportError::Aborted),
            response = self.backend.send(self.request) => response,
        };

        let outcome = match response {
            Ok(stream) => match mode {
                CompletionMode::Blob => read_body(stream, &cancel)
                    .await
                    .map(|bytes| deliver(&tx, TransportEvent::Blob(bytes))),
                CompletionMode::Json => read_body(stream, &cancel).await.and_then(|raw| {
                    let value = serde_json::from_slice(&raw)
                        .map_err(|e| TransportError::Json(e.to_string()))?;
                    deliver(&tx, TransportEvent::Json { value, raw });
                    Ok(())
                }),
                CompletionMode::Chunked => stream_frames(stream, &cancel, &tx).await,
            },
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) if !cancel.is_cancelled() => deliver(&tx, TransportEvent::Finished),
            Ok(()) => {}
            Err(err) if err.is_abort() || cancel.is_cancelled() => {
                trace!(url = %url, "Fetch aborted");
            }
            Err(err) => {
                debug!(url = %url, error = %err, "Fetch failed");
                deliver(&tx, TransportEvent::Failed(err));
            }
        }
    }
}

fn deliver(tx: &mpsc::UnboundedSender<TransportEvent>, event: TransportEvent) {
    // The receiver is gone once the fetch was aborted or dropped
    let _ = tx.send(event);
}

async fn read_body(mut stream: ByteStream, cancel: &CancellationToken) -> Result<Bytes, TransportError> {
    let mut body = BytesMut::new();
    loop {
        let chunk = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(TransportError::Aborted),
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(chunk) => body.extend_from_slice(&chunk?),
            None => return Ok(body.freeze()),
        }
    }
}

async fn stream_frames(
    mut stream: ByteStream,
    cancel: &CancellationToken,
    tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<(), TransportError> {
    let mut decoder = FrameDecoder::new();
    loop {
        let chunk = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(TransportError::Aborted),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;

        for frame in decoder.push(&chunk) {
            if cancel.is_cancelled() {
                return Err(TransportError::Aborted);
            }
            if frame.kind() == FrameType::EndOfStream {
                trace!("End of stream marker received");
                return Ok(());
            }
            if tx.send(TransportEvent::Frame(frame)).is_err() {
                return Err(TransportError::Aborted);
            }
        }
    }

    if decoder.buffered_len() > 0 {
        debug!(
            trailing_bytes = decoder.buffered_len(),
            "Stream ended inside a frame"
        );
    }
    Ok(())
}

/// Handle to a running fetch.
///
/// Dropping the handle aborts the fetch.
pub struct PendingFetch {
    generation: u64,
    url: String,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    aborted: bool,
    finished: bool,
}

impl PendingFetch {
    /// Tag given to [`Transport::start`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cancels the network operation and suppresses all further delivery,
    /// including events already received but not yet taken.
    ///
    /// Calling it again has no effect.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.cancel.cancel();
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Whether a terminal event was delivered or the task went away.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Takes the next delivered event without waiting.
    pub fn try_next(&mut self) -> Option<TransportEvent> {
        if self.aborted || self.finished {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => Some(self.observe(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }

    /// Waits for the next event. Returns `None` once the fetch is over.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        if self.aborted || self.finished {
            return None;
        }
        match self.events.recv().await {
            Some(event) => Some(self.observe(event)),
            None => {
                self.finished = true;
                None
            }
        }
    }

    fn observe(&mut self, event: TransportEvent) -> TransportEvent {
        if event.is_terminal() {
            self.finished = true;
        }
        event
    }
}

impl Drop for PendingFetch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFetch")
            .field("generation", &self.generation)
            .field("url", &self.url)
            .field("aborted", &self.aborted)
            .field("finished", &self.finished)
            .finish()
    }
}
