//! Anthropic Claude adapter over the streaming Messages API.
//!
//! Full-capability adapter: system prompt, knowledge and history are all
//! sent. By default the streamed answer is buffered and written once after
//! `message_stop`; with streaming enabled each text delta is written as it
//! arrives, so a failure mid-stream leaves the received prefix in the sink.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use mp_protocol::{ModelResult, QueryRequest, Role, StreamEvent};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::error::{BackendError, ProviderError};
use crate::huggingface::redacted;
use crate::normalize::Normalization;
use crate::pricing::{claude_rate, Pricing, Rate};
use crate::provider::{usage, validate_request, write_answer, ModelProvider, Sink};
use crate::registry::ProviderKind;
use crate::sse::{parse_sse_stream, SseEvent};
use crate::tokens::TokenSizer;
use crate::transport::Transport;

pub const API_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic Claude model. Safe for concurrent use.
#[derive(Clone)]
pub struct Claude {
    sub_type: String,
    secret_key: String,
    temperature: f32,
    base_url: String,
    http: Client,
    sizer: Arc<dyn TokenSizer>,
    rate: Rate,
    stream_to_sink: bool,
}

impl Claude {
    /// Validate the configuration. No network I/O.
    pub fn new(
        sub_type: impl Into<String>,
        secret_key: impl Into<String>,
        temperature: f32,
        transport: &Transport,
        sizer: Arc<dyn TokenSizer>,
    ) -> Result<Self, ProviderError> {
        let sub_type = sub_type.into();
        let secret_key = secret_key.into();

        let rate = claude_rate(&sub_type)
            .ok_or_else(|| ProviderError::config(format!("unsupported Claude model '{sub_type}'")))?;
        if secret_key.is_empty() {
            return Err(ProviderError::config("Claude requires an API key"));
        }
        if !temperature.is_finite() || !(0.0..=1.0).contains(&temperature) {
            return Err(ProviderError::config(format!(
                "temperature {temperature} is outside [0, 1]"
            )));
        }

        Ok(Self {
            sub_type,
            secret_key,
            temperature,
            base_url: API_URL.to_string(),
            http: transport.client().clone(),
            sizer,
            rate,
            stream_to_sink: false,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Write each text delta to the sink as it arrives.
    ///
    /// A failure mid-stream then leaves the deltas already written in the sink.
    pub fn streaming(mut self, enabled: bool) -> Self {
        self.stream_to_sink = enabled;
        self
    }

    pub fn normalization(&self) -> Normalization {
        Normalization::Verbatim
    }

    fn request_body(&self, request: &QueryRequest) -> ApiRequest {
        ApiRequest {
            model: self.sub_type.clone(),
            max_tokens: MAX_TOKENS,
            stream: true,
            temperature: self.temperature,
            system: build_system_prompt(request),
            messages: build_messages(request),
        }
    }

    async fn open_stream(&self, request: &QueryRequest) -> Result<reqwest::Response, BackendError> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.secret_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response)
    }

    /// Consume the event stream, optionally forwarding deltas to `sink`.
    async fn run(
        &self,
        request: &QueryRequest,
        mut sink: Option<&mut Sink>,
    ) -> Result<String, ProviderError> {
        let response = self.open_stream(request).await?;
        let mut events = parse_sse_stream(response.bytes_stream());
        let mut answer = String::new();

        while let Some(item) = events.next().await {
            let sse_event = item.map_err(BackendError::from)?;
            let Some(event) = process_event(&sse_event) else {
                continue;
            };

            match event {
                StreamEvent::TextDelta(text) => {
                    if let Some(sink) = sink.as_deref_mut() {
                        sink.write_all(text.as_bytes()).await?;
                    }
                    answer.push_str(&text);
                }
                StreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    debug!(
                        model = %self.sub_type,
                        input_tokens,
                        output_tokens,
                        "backend-reported usage"
                    );
                }
                StreamEvent::Error(message) => {
                    return Err(BackendError::Stream(message).into());
                }
                StreamEvent::Done => {
                    if let Some(sink) = sink.as_deref_mut() {
                        sink.flush().await?;
                    }
                    return Ok(answer);
                }
            }
        }

        Err(BackendError::Stream("stream closed before message_stop".to_string()).into())
    }
}

impl fmt::Debug for Claude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claude")
            .field("sub_type", &self.sub_type)
            .field("secret_key", &redacted(&self.secret_key))
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("stream_to_sink", &self.stream_to_sink)
            .finish()
    }
}

#[async_trait]
impl ModelProvider for Claude {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn sub_type(&self) -> &str {
        &self.sub_type
    }

    fn pricing(&self) -> Pricing {
        self.rate.pricing()
    }

    async fn query_text(
        &self,
        request: &QueryRequest,
        sink: &mut Sink,
        cancel: &CancelSignal,
    ) -> Result<ModelResult, ProviderError> {
        validate_request(request)?;
        debug!(
            model = %self.sub_type,
            prompt_len = request.question.len(),
            history = request.history.len(),
            knowledge = request.knowledge.len(),
            streaming = self.stream_to_sink,
            "sending claude messages request"
        );

        let outcome = if self.stream_to_sink {
            cancel.guard(self.run(request, Some(&mut *sink))).await
        } else {
            cancel.guard(self.run(request, None)).await
        };
        let answer = outcome
            .inspect_err(|e| warn!(model = %self.sub_type, error = %e, "claude request failed"))?;

        // Streamed deltas are already in the sink and must be counted as written.
        let answer = if self.stream_to_sink {
            answer
        } else {
            let answer = self.normalization().apply(&answer);
            write_answer(sink, &answer).await?;
            answer
        };

        usage(
            self.sizer.as_ref(),
            &self.sub_type,
            &request.question,
            &answer,
            Some(self.rate),
        )
    }
}

/// System prompt, system-role history turns and knowledge, in that order.
fn build_system_prompt(request: &QueryRequest) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !request.system_prompt.is_empty() {
        parts.push(request.system_prompt.clone());
    }

    parts.extend(
        request
            .history
            .iter()
            .filter(|m| m.role == Role::System && !m.text.is_empty())
            .map(|m| m.text.clone()),
    );

    let knowledge: Vec<&str> = request
        .knowledge
        .iter()
        .map(|m| m.text.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    if !knowledge.is_empty() {
        parts.push(format!(
            "Use the following knowledge when answering:\n\n{}",
            knowledge.join("\n\n")
        ));
    }

    parts.join("\n\n")
}

/// History as alternating user/assistant turns, then the question.
fn build_messages(request: &QueryRequest) -> Vec<ApiMessage> {
    let mut messages: Vec<ApiMessage> = Vec::new();

    let turns = request
        .history
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(("user", m.text.as_str())),
            Role::Assistant => Some(("assistant", m.text.as_str())),
            Role::System => None,
        })
        .chain(std::iter::once(("user", request.question.as_str())));

    for (role, text) in turns {
        if text.is_empty() {
            continue;
        }
        // The API requires the conversation to open with a user turn.
        if messages.is_empty() && role == "assistant" {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(text);
            }
            _ => messages.push(ApiMessage {
                role,
                content: text.to_string(),
            }),
        }
    }

    messages
}

/// Map one Anthropic SSE event to a stream event.
fn process_event(event: &SseEvent) -> Option<StreamEvent> {
    let data: Value = serde_json::from_str(&event.data).ok()?;
    let event_type = event
        .event_type
        .as_deref()
        .or_else(|| data.get("type").and_then(Value::as_str))
        .unwrap_or("");

    match event_type {
        "message_start" => {
            let usage = data.get("message")?.get("usage")?;
            Some(StreamEvent::Usage {
                input_tokens: usage.get("input_tokens")?.as_u64()? as u32,
                output_tokens: usage
                    .get("output_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
            })
        }
        "content_block_delta" => {
            let delta = data.get("delta")?;
            if delta.get("type").and_then(Value::as_str) != Some("text_delta") {
                return None;
            }
            let text = delta.get("text")?.as_str()?;
            Some(StreamEvent::TextDelta(text.to_string()))
        }
        "message_delta" => {
            let output = data.get("usage")?.get("output_tokens")?.as_u64()?;
            Some(StreamEvent::Usage {
                input_tokens: 0,
                output_tokens: output as u32,
            })
        }
        "message_stop" => Some(StreamEvent::Done),
        "error" => {
            let message = data
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            Some(StreamEvent::Error(message.to_string()))
        }
        _ => None,
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

// API request types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}
