//! Scripted provider for tests and offline use.
//!
//! Produces the same `StreamEvent` sequence a streaming backend would,
//! so callers can be exercised without HTTP.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use mp_protocol::{ModelResult, QueryRequest, StreamEvent};
use tokio::time::sleep;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::error::{BackendError, ProviderError};
use crate::normalize::Normalization;
use crate::pricing::Pricing;
use crate::provider::{usage, validate_request, write_answer, ModelProvider, Sink};
use crate::registry::ProviderKind;
use crate::tokens::TokenSizer;

/// Configurable mock responses for testing.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emit a text delta.
    Text { content: String },
    /// Emit an error.
    Error { message: String },
    /// Delay before next event (for timing tests).
    Delay { ms: u64 },
}

/// Configuration for mock stream.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Sequence of responses to emit.
    pub responses: Vec<MockResponse>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }
}

/// Create a stream of StreamEvents from mock config.
pub fn mock_stream(config: MockConfig) -> impl Stream<Item = StreamEvent> + Send {
    stream! {
        for response in config.responses {
            match response {
                MockResponse::Text { content } => {
                    yield StreamEvent::TextDelta(content);
                }
                MockResponse::Error { message } => {
                    yield StreamEvent::Error(message);
                    return;
                }
                MockResponse::Delay { ms } => {
                    sleep(Duration::from_millis(ms)).await;
                }
            }
        }

        yield StreamEvent::Done;
    }
}

/// Built-in test fixtures for common scenarios.
pub mod fixtures {
    use super::*;

    /// A single complete answer.
    pub fn text(answer: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![MockResponse::Text {
            content: answer.to_string(),
        }])
    }

    /// An answer streamed in chunks.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        let responses = chunks
            .iter()
            .map(|chunk| MockResponse::Text {
                content: (*chunk).to_string(),
            })
            .collect();

        MockConfig::new().with_responses(responses)
    }

    /// Some text followed by a backend failure.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Text {
                content: text_before.to_string(),
            },
            MockResponse::Error {
                message: error.to_string(),
            },
        ])
    }
}

#[derive(Debug, Clone)]
enum Script {
    Fixed(MockConfig),
    /// Answer with the question itself.
    Echo,
}

/// Free provider replaying a script. Buffered: the sink is written once,
/// after the script has completed without error.
#[derive(Clone)]
pub struct MockProvider {
    sub_type: String,
    script: Script,
    sizer: Arc<dyn TokenSizer>,
}

impl MockProvider {
    pub fn new(sub_type: impl Into<String>, config: MockConfig, sizer: Arc<dyn TokenSizer>) -> Self {
        Self {
            sub_type: sub_type.into(),
            script: Script::Fixed(config),
            sizer,
        }
    }

    pub fn echo(sub_type: impl Into<String>, sizer: Arc<dyn TokenSizer>) -> Self {
        Self {
            sub_type: sub_type.into(),
            script: Script::Echo,
            sizer,
        }
    }

    pub fn normalization(&self) -> Normalization {
        Normalization::FirstLine
    }

    fn script_for(&self, request: &QueryRequest) -> MockConfig {
        match &self.script {
            Script::Fixed(config) => config.clone(),
            Script::Echo => fixtures::text(&request.question),
        }
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("sub_type", &self.sub_type)
            .field("script", &self.script)
            .finish()
    }
}

/// Concatenate text deltas until `Done`.
async fn collect_text(events: impl Stream<Item = StreamEvent>) -> Result<String, BackendError> {
    let mut events = std::pin::pin!(events);
    let mut answer = String::new();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::TextDelta(text) => answer.push_str(&text),
            StreamEvent::Usage { .. } => {}
            StreamEvent::Error(message) => return Err(BackendError::Stream(message)),
            StreamEvent::Done => return Ok(answer),
        }
    }

    Err(BackendError::Stream("stream ended without completion".to_string()))
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Dummy
    }

    fn sub_type(&self) -> &str {
        &self.sub_type
    }

    fn pricing(&self) -> Pricing {
        Pricing::free()
    }

    async fn query_text(
        &self,
        request: &QueryRequest,
        sink: &mut Sink,
        cancel: &CancelSignal,
    ) -> Result<ModelResult, ProviderError> {
        validate_request(request)?;
        debug!(model = %self.sub_type, "replaying mock script");

        let raw = cancel
            .guard(collect_text(mock_stream(self.script_for(request))))
            .await?;
        let answer = self.normalization().apply(&raw);
        write_answer(sink, &answer).await?;

        usage(
            self.sizer.as_ref(),
            &self.sub_type,
            &request.question,
            &answer,
            None,
        )
    }
}
