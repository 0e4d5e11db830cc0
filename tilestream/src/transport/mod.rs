//! Abortable HTTP transport.
//!
//! The transport issues one request per [`Transport`] and delivers its body in
//! one of three ways (see [`CompletionMode`]). Network access goes through the
//! [`HttpBackend`] trait so the engine can be driven by mock backends in tests.
//!
//! Aborts are first-class: [`PendingFetch::abort`] cancels the network task and
//! silences the fetch for good, and an abort is never surfaced as a
//! [`TransportError`] event.

mod backend;
mod error;
mod fetch;

pub use backend::{
    BoxFuture, ByteStream, HttpBackend, HttpMethod, HttpRequest, ReqwestBackend,
    DEFAULT_TIMEOUT_SECS,
};
pub use error::TransportError;
pub use fetch::{CompletionMode, PendingFetch, Transport, TransportEvent};

#[cfg(test)]
pub(crate) use backend::tests::{MockBackend, MockResponse};
