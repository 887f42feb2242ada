//! Mock backend for testing without a live model.
//!
//! [`MockBackend`] plays back a script of [`MockReply`]s in order, cycling
//! when the script runs out, and counts the calls it receives.
//!
//! # Example
//!
//! ```
//! use report_extract::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::replies(vec![MockReply::Status(503), MockReply::text("{}")]);
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::{ExtractError, Result};

/// One scripted backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// A successful response with this text.
    Text(String),
    /// An HTTP error with this status.
    Status(u16),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }
}

/// A test backend that returns scripted replies in order.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<MockReply>,
    index: AtomicUsize,
}

impl MockBackend {
    /// Successful text responses, returned in order and cycled.
    pub fn new(responses: Vec<String>) -> Self {
        Self::replies(responses.into_iter().map(MockReply::Text).collect())
    }

    /// A mock that always returns the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// A script mixing successes and HTTP failures. An empty script yields
    /// empty text.
    pub fn replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            index: AtomicUsize::new(0),
        }
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        if self.replies.is_empty() {
            return MockReply::Text(String::new());
        }
        self.replies[idx % self.replies.len()].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        _request: &LlmRequest,
    ) -> Result<LlmResponse> {
        match self.next_reply() {
            MockReply::Text(text) => Ok(LlmResponse {
                text,
                status: 200,
                metadata: None,
            }),
            MockReply::Status(status) => Err(ExtractError::HttpError {
                status,
                body: format!("mock status {}", status),
                retry_after: None,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
