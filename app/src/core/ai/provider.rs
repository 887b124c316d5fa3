//! HTTP Transport
//!
//! The gateway talks to providers through [`HttpTransport`] so tests can
//! swap the network for canned responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Transport Trait
// =============================================================================

/// An outbound JSON POST
#[derive(Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpRequest {
    /// Returns a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("headers", &header_names)
            .finish_non_exhaustive()
    }
}

/// Raw status and body of a provider response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one JSON request and returns the raw response.
///
/// Implementations must not put header values in error messages.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Returns the transport name
    fn name(&self) -> &str;

    /// POSTs the request body as JSON
    async fn post_json(&self, request: HttpRequest) -> CoreResult<HttpResponse>;
}

// =============================================================================
// Reqwest Transport
// =============================================================================

/// Transport backed by a shared `reqwest::Client`
#[cfg(feature = "ai-providers")]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "ai-providers")]
impl ReqwestTransport {
    /// Creates a transport whose client gives up after `timeout`
    pub fn new(timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[cfg(feature = "ai-providers")]
fn map_reqwest_error(error: reqwest::Error) -> CoreError {
    let error = error.without_url();
    if error.is_timeout() {
        CoreError::Timeout(format!("Request timed out: {}", error))
    } else {
        CoreError::TransportError(format!("Failed to fetch: {}", error))
    }
}

#[cfg(feature = "ai-providers")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn post_json(&self, request: HttpRequest) -> CoreResult<HttpResponse> {
        let mut builder = self
            .client
            .post(&request.url)
            .header("Content-Type", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .json(&request.body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse { status, body })
    }
}

// =============================================================================
// Mock Transport (for testing)
// =============================================================================

enum MockReply {
    Response(HttpResponse),
    NetworkFailure(String),
}

/// Mock transport that replays queued replies in order
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Creates a mock with no queued replies
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Queues an HTTP response
    pub fn with_response(self, status: u16, body: &str) -> Self {
        self.push(MockReply::Response(HttpResponse::new(status, body)));
        self
    }

    /// Queues a network-level failure
    pub fn with_network_failure(self, message: &str) -> Self {
        self.push(MockReply::NetworkFailure(message.to_string()));
        self
    }

    /// Sleeps before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, if any
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    fn push(&self, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn post_json(&self, request: HttpRequest) -> CoreResult<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .map_err(|_| CoreError::Internal("Mock transport lock poisoned".to_string()))?
            .pop_front();

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::NetworkFailure(message)) => Err(CoreError::TransportError(message)),
            None => Err(CoreError::Internal(
                "Mock transport has no queued reply".to_string(),
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HttpRequest {
        HttpRequest {
            url: "https://example.invalid/chat".to_string(),
            headers: vec![("Authorization".to_string(), "Bearer sk-secret".to_string())],
            body: serde_json::json!({"model": "m"}),
        }
    }

    #[test]
    fn test_request_debug_hides_header_values() {
        let debug = format!("{:?}", request());
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        assert_eq!(request().header("authorization"), Some("Bearer sk-secret"));
        assert_eq!(request().header("x-goog-api-key"), None);
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(!HttpResponse::new(429, "").is_success());
    }

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let mock = MockTransport::new()
            .with_response(200, "first")
            .with_network_failure("Failed to fetch");

        let first = mock.post_json(request()).await.unwrap();
        assert_eq!(first.body, "first");

        let second = mock.post_json(request()).await;
        assert!(matches!(second, Err(CoreError::TransportError(_))));

        let third = mock.post_json(request()).await;
        assert!(matches!(third, Err(CoreError::Internal(_))));

        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.last_request().unwrap().url, "https://example.invalid/chat");
    }
}
