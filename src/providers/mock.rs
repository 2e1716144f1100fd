/*!
 * Mock provider for testing.
 *
 * `MockProvider` answers from a responder closure that receives the prompt
 * and the zero-based number of earlier calls made with that same prompt.
 * The responder returns `None` to simulate a failed call. Counters are shared
 * between clones so a test can keep a handle after moving the provider into a
 * `ProviderBackend`.
 *
 * - `MockProvider::fixed(text)` - Always answers with the same text
 * - `MockProvider::sequence(replies)` - Answers per call number, same script for every prompt
 * - `MockProvider::failing()` - Always fails with an error
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Provider, ProviderBackend};

/// Backend built on the mock provider
pub type MockBackend = ProviderBackend<MockProvider>;

type Responder = dyn Fn(&str, usize) -> Option<String> + Send + Sync;

/// Mock request for testing
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// The full prompt
    pub prompt: String,
    /// Requested model
    pub model: String,
}

/// Mock response for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// The completion text
    pub text: String,
    /// Simulated prompt tokens
    pub prompt_tokens: Option<u64>,
    /// Simulated completion tokens
    pub completion_tokens: Option<u64>,
}

/// Mock provider for testing orchestration behavior
#[derive(Clone)]
pub struct MockProvider {
    /// Produces the reply for (prompt, nth call with this prompt)
    responder: Arc<Responder>,
    /// Total calls
    request_count: Arc<AtomicUsize>,
    /// Calls per distinct prompt
    per_prompt: Arc<Mutex<HashMap<String, usize>>>,
    /// Calls currently awaiting a reply
    in_flight: Arc<AtomicUsize>,
    /// Highest value `in_flight` reached
    max_in_flight: Arc<AtomicUsize>,
    /// Simulated latency
    delay: Option<Duration>,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("request_count", &self.call_count())
            .field("delay", &self.delay)
            .finish()
    }
}

impl MockProvider {
    /// Create a mock provider answering from a responder
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, usize) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            request_count: Arc::new(AtomicUsize::new(0)),
            per_prompt: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Always answer with the same text
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_, _| Some(text.clone()))
    }

    /// Answer the n-th call of each prompt with `replies[n]`; calls past the end fail
    pub fn sequence(replies: Vec<Option<String>>) -> Self {
        Self::new(move |_, n| replies.get(n).cloned().flatten())
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(|_, _| None)
    }

    /// Simulate latency on every call
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(delay_ms));
        self
    }

    /// Total number of calls made
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Number of calls made with prompts containing `needle`
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.per_prompt
            .lock()
            .iter()
            .filter(|(prompt, _)| prompt.contains(needle))
            .map(|(_, count)| *count)
            .sum()
    }

    /// Highest number of concurrent calls observed
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    type Request = MockRequest;
    type Response = MockResponse;

    fn build_request(&self, prompt: &str, model: &str) -> Self::Request {
        MockRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
        }
    }

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        let nth = {
            let mut per_prompt = self.per_prompt.lock();
            let count = per_prompt.entry(request.prompt.clone()).or_insert(0);
            let nth = *count;
            *count += 1;
            nth
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = (self.responder)(&request.prompt, nth);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(text) => Ok(MockResponse {
                prompt_tokens: Some((request.prompt.len() / 4) as u64),
                completion_tokens: Some((text.len() / 4) as u64),
                text,
            }),
            None => Err(ProviderError::ApiError {
                status_code: 503,
                message: "Mock provider failure".to_string(),
            }),
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.text.clone()
    }

    fn extract_usage(response: &Self::Response) -> (Option<u64>, Option<u64>) {
        (response.prompt_tokens, response.completion_tokens)
    }
}
