//! HuggingFace Inference API adapter (text-generation mode).
//!
//! Reduced-capability adapter: only the bare question is sent. History,
//! system prompt and knowledge are accepted and ignored. Text-generation
//! models tend to run on past the answer, so the response is cut at the
//! first line break before it is written or counted.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mp_protocol::{ModelResult, QueryRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::error::{BackendError, ProviderError};
use crate::normalize::Normalization;
use crate::pricing::Pricing;
use crate::provider::{usage, validate_request, write_answer, ModelProvider, Sink};
use crate::registry::ProviderKind;
use crate::tokens::TokenSizer;
use crate::transport::Transport;

pub const API_URL: &str = "https://api-inference.huggingface.co";
const MAX_TEMPERATURE: f32 = 100.0;

/// HuggingFace-hosted model. Safe for concurrent use: all fields are
/// immutable and the HTTP client is shared.
#[derive(Clone)]
pub struct HuggingFace {
    sub_type: String,
    secret_key: String,
    temperature: f32,
    base_url: String,
    http: Client,
    sizer: Arc<dyn TokenSizer>,
}

impl HuggingFace {
    /// Validate the configuration. No network I/O.
    ///
    /// `sub_type` is a model repository id such as `gpt2` or
    /// `tiiuae/falcon-7b-instruct`. An empty `secret_key` sends anonymous
    /// requests.
    pub fn new(
        sub_type: impl Into<String>,
        secret_key: impl Into<String>,
        temperature: f32,
        transport: &Transport,
        sizer: Arc<dyn TokenSizer>,
    ) -> Result<Self, ProviderError> {
        let sub_type = sub_type.into();
        validate_repo_id(&sub_type)?;
        if !temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(ProviderError::config(format!(
                "temperature {temperature} is outside [0, {MAX_TEMPERATURE}]"
            )));
        }

        Ok(Self {
            sub_type,
            secret_key: secret_key.into(),
            temperature,
            base_url: API_URL.to_string(),
            http: transport.client().clone(),
            sizer,
        })
    }

    /// Point at a self-hosted or mock inference endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn normalization(&self) -> Normalization {
        Normalization::FirstLine
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", self.base_url, self.sub_type)
    }

    fn request_body<'a>(&self, question: &'a str) -> TextGenerationRequest<'a> {
        // Zero temperature means greedy decoding; the API rejects 0.0 as a
        // sampling temperature.
        let sampling = self.temperature > 0.0;
        TextGenerationRequest {
            inputs: question,
            parameters: Parameters {
                temperature: sampling.then_some(self.temperature),
                do_sample: sampling,
                return_full_text: false,
            },
            options: Options {
                wait_for_model: true,
            },
        }
    }

    async fn completion(&self, question: &str) -> Result<String, BackendError> {
        let mut builder = self.http.post(self.endpoint()).json(&self.request_body(question));
        if !self.secret_key.is_empty() {
            builder = builder.bearer_auth(&self.secret_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        // Some deployments report failures with a success status.
        let value: Value = serde_json::from_str(&body)?;
        if value.get("error").is_some() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: TextGenerationResponse = serde_json::from_value(value)?;
        parsed.into_text().ok_or(BackendError::EmptyResponse)
    }
}

impl fmt::Debug for HuggingFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingFace")
            .field("sub_type", &self.sub_type)
            .field("secret_key", &redacted(&self.secret_key))
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .finish()
    }
}

pub(crate) fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<none>"
    } else {
        "<redacted>"
    }
}

#[async_trait]
impl ModelProvider for HuggingFace {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HuggingFace
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
        if request.has_context() {
            debug!(
                model = %self.sub_type,
                history = request.history.len(),
                knowledge = request.knowledge.len(),
                "text-generation mode ignores history, system prompt and knowledge"
            );
        }

        debug!(
            model = %self.sub_type,
            prompt_len = request.question.len(),
            "sending huggingface text-generation request"
        );
        let raw = cancel
            .guard(self.completion(&request.question))
            .await
            .inspect_err(|e| warn!(model = %self.sub_type, error = %e, "huggingface request failed"))?;

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

/// Accept `name` or `owner/name` built from `[A-Za-z0-9._-]`.
fn validate_repo_id(sub_type: &str) -> Result<(), ProviderError> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && !part.starts_with('.')
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    };

    let parts: Vec<&str> = sub_type.split('/').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(ProviderError::config(format!(
            "'{sub_type}' is not a HuggingFace model id"
        )));
    }
    Ok(())
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("error") {
            Some(Value::String(msg)) => msg.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
            _ => body.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

// API request/response types

#[derive(Debug, Serialize)]
struct TextGenerationRequest<'a> {
    inputs: &'a str,
    parameters: Parameters,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Parameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Serialize)]
struct Options {
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextGenerationResponse {
    Many(Vec<Generated>),
    One(Generated),
}

#[derive(Debug, Deserialize)]
struct Generated {
    generated_text: String,
}

impl TextGenerationResponse {
    fn into_text(self) -> Option<String> {
        match self {
            TextGenerationResponse::Many(items) => {
                items.into_iter().next().map(|g| g.generated_text)
            }
            TextGenerationResponse::One(g) => Some(g.generated_text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::Estimator;
    use crate::transport::TransportConfig;

    fn transport() -> Transport {
        Transport::new(&TransportConfig::default()).unwrap()
    }

    fn provider(sub_type: &str, temperature: f32) -> Result<HuggingFace, ProviderError> {
        HuggingFace::new(sub_type, "hf_secret", temperature, &transport(), Arc::new(Estimator))
    }

    #[test]
    fn accepts_repo_ids() {
        assert!(provider("gpt2", 0.0).is_ok());
        assert!(provider("tiiuae/falcon-7b-instruct", 0.7).is_ok());
        assert!(provider("mistralai/Mistral-7B-Instruct-v0.2", 1.0).is_ok());
    }

    #[test]
    fn rejects_bad_repo_ids() {
        for bad in ["", "/", "a/b/c", "owner/", "bad name", "../etc", "x?y"] {
            let err = provider(bad, 0.0).unwrap_err();
            assert!(
                matches!(err, ProviderError::Configuration(_)),
                "expected configuration error for {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_bad_temperature() {
        assert!(provider("gpt2", -0.1).is_err());
        assert!(provider("gpt2", 100.5).is_err());
        assert!(provider("gpt2", f32::NAN).is_err());
        assert!(provider("gpt2", 100.0).is_ok());
    }

    #[test]
    fn pricing_is_free_and_stable() {
        let p = provider("gpt2", 0.0).unwrap();
        assert_eq!(p.pricing(), Pricing::free());
        assert_eq!(p.pricing(), p.pricing());
    }

    #[test]
    fn debug_redacts_secret() {
        let p = provider("gpt2", 0.0).unwrap();
        let rendered = format!("{p:?}");
        assert!(!rendered.contains("hf_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn greedy_request_body() {
        let p = provider("gpt2", 0.0).unwrap();
        let body = serde_json::to_value(p.request_body("Hello")).unwrap();
        assert_eq!(body["inputs"], "Hello");
        assert!(body["parameters"].get("temperature").is_none());
        assert_eq!(body["parameters"]["do_sample"], false);
        assert_eq!(body["parameters"]["return_full_text"], false);
        assert_eq!(body["options"]["wait_for_model"], true);
    }

    #[test]
    fn sampling_request_body() {
        let p = provider("gpt2", 0.5).unwrap();
        let body = serde_json::to_value(p.request_body("Hello")).unwrap();
        assert_eq!(body["parameters"]["temperature"], 0.5);
        assert_eq!(body["parameters"]["do_sample"], true);
    }

    #[test]
    fn endpoint_uses_base_url() {
        let p = provider("owner/model", 0.0)
            .unwrap()
            .with_base_url("http://localhost:8080/");
        assert_eq!(p.endpoint(), "http://localhost:8080/models/owner/model");
    }

    #[test]
    fn parse_list_response() {
        let parsed: TextGenerationResponse =
            serde_json::from_str(r#"[{"generated_text":"Hi there\n[debug]"}]"#).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("Hi there\n[debug]"));
    }

    #[test]
    fn parse_object_response() {
        let parsed: TextGenerationResponse =
            serde_json::from_str(r#"{"generated_text":"solo"}"#).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("solo"));
    }

    #[test]
    fn parse_empty_list_response() {
        let parsed: TextGenerationResponse = serde_json::from_str("[]").unwrap();
        assert_eq!(parsed.into_text(), None);
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":"Model gpt2 is currently loading","estimated_time":20.0}"#),
            "Model gpt2 is currently loading"
        );
        assert_eq!(error_message(r#"{"error":["a","b"]}"#), "a; b");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
