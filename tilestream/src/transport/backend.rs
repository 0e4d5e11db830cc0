//! HTTP backend abstraction for testability

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::error::TransportError;

/// Default connect timeout for the reqwest backend, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Future returned by object-safe async backend calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body as a stream of network-sized chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A request handed to an [`HttpBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<String>,
}

/// Sends requests to the tile server.
///
/// The engine only holds an `Arc<dyn HttpBackend>`; tests swap in a
/// scripted backend.
pub trait HttpBackend: Send + Sync {
    /// Sends a request and resolves once response headers arrive.
    ///
    /// # Returns
    ///
    /// The response body as a chunk stream, or an error for network
    /// failures and non-success statuses.
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<ByteStream, TransportError>>;
}

/// Real HTTP backend implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Creates a backend with the default connect timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a backend with a custom connect timeout.
    ///
    /// Only connection setup is bounded; a tile stream may legitimately run
    /// for longer than any fixed total timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpBackend for ReqwestBackend {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<ByteStream, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let method = match request.method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
            };
            let mut builder = client.request(method, &request.url);
            if let Some(body) = request.body {
                builder = builder
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body);
            }

            let response = builder.send().await.map_err(|e| TransportError::Network {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

            // Check HTTP status
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Http {
                    status: status.as_u16(),
                    url: request.url,
                });
            }

            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())));
            Ok(Box::pin(stream) as ByteStream)
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Canned response of a [`MockBackend`].
    pub enum MockResponse {
        /// Body delivered as the given chunks.
        Chunks(Vec<Bytes>),
        /// Request fails before any body arrives.
        Error(TransportError),
        /// Body chunks pushed by the test through a channel.
        Live(mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
    }

    /// Mock HTTP backend for testing.
    ///
    /// Answers requests with queued responses in order and records every
    /// request it receives. When the queue is empty the body is empty.
    #[derive(Default)]
    pub struct MockBackend {
        responses: Mutex<VecDeque<MockResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, response: MockResponse) {
            self.responses.lock().unwrap().push_back(response);
        }

        /// Queues a live response and returns its sender.
        pub fn push_live(&self) -> mpsc::UnboundedSender<Result<Bytes, TransportError>> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.push_response(MockResponse::Live(rx));
            tx
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpBackend for MockBackend {
        fn send(
            &self,
            request: HttpRequest,
        ) -> BoxFuture<'static, Result<ByteStream, TransportError>> {
            self.requests.lock().unwrap().push(request);
            let response = self.responses.lock().unwrap().pop_front();
            Box::pin(async move {
                match response {
                    None => Ok(Box::pin(futures::stream::empty()) as ByteStream),
                    Some(MockResponse::Chunks(chunks)) => {
                        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
                            as ByteStream)
                    }
                    Some(MockResponse::Error(err)) => Err(err),
                    Some(MockResponse::Live(rx)) => {
                        let stream = futures::stream::unfold(rx, |mut rx| async move {
                            rx.recv().await.map(|chunk| (chunk, rx))
                        });
                        Ok(Box::pin(stream) as ByteStream)
                    }
                }
            })
        }
    }

    #[tokio::test]
    async fn test_mock_backend_records_requests() {
        let mock = MockBackend::new();
        mock.push_response(MockResponse::Chunks(vec![Bytes::from_static(b"ab")]));

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: "http://localhost/tiles".to_string(),
            body: Some("{}".to_string()),
        };
        let stream = mock.send(request.clone()).await.unwrap();
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks, vec![Ok(Bytes::from_static(b"ab"))]);
        assert_eq!(mock.requests(), vec![request]);
    }

    #[tokio::test]
    async fn test_mock_backend_error() {
        let mock = MockBackend::new();
        mock.push_response(MockResponse::Error(TransportError::Http {
            status: 503,
            url: "http://localhost/tiles".to_string(),
        }));

        let result = mock
            .send(HttpRequest {
                method: HttpMethod::Get,
                url: "http://localhost/tiles".to_string(),
                body: None,
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_reqwest_backend_builds() {
        assert!(ReqwestBackend::with_timeout(Duration::from_secs(5)).is_ok());
    }
}
