//! The Model Provider contract.

use std::fmt;

use async_trait::async_trait;
use mp_protocol::{ModelResult, QueryRequest};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::cancel::CancelSignal;
use crate::error::ProviderError;
use crate::pricing::{Pricing, Rate, USD};
use crate::registry::ProviderKind;
use crate::tokens::TokenSizer;

/// Destination for the generated answer.
pub type Sink = dyn AsyncWrite + Unpin + Send;

/// A configured backend.
///
/// Implementations hold only immutable configuration and a shared HTTP
/// client, so one instance may serve many concurrent `query_text` calls.
#[async_trait]
pub trait ModelProvider: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Model or variant within the backend family.
    fn sub_type(&self) -> &str;

    /// Pure; no I/O.
    fn pricing(&self) -> Pricing;

    /// Run one query and write the normalized answer to `sink`.
    ///
    /// On failure no result is returned. Buffered adapters leave the sink
    /// untouched unless the failure happens while writing to it.
    async fn query_text(
        &self,
        request: &QueryRequest,
        sink: &mut Sink,
        cancel: &CancelSignal,
    ) -> Result<ModelResult, ProviderError>;
}

/// Check the request before any backend traffic.
pub fn validate_request(request: &QueryRequest) -> Result<(), ProviderError> {
    request.validate().map_err(ProviderError::Configuration)
}

/// Write a complete answer and flush it.
pub async fn write_answer(sink: &mut Sink, text: &str) -> Result<(), ProviderError> {
    sink.write_all(text.as_bytes()).await?;
    sink.flush().await?;
    Ok(())
}

/// Count prompt and answer tokens and price them.
///
/// A `None` rate marks a free backend.
pub fn usage(
    sizer: &dyn TokenSizer,
    sub_type: &str,
    question: &str,
    answer: &str,
    rate: Option<Rate>,
) -> Result<ModelResult, ProviderError> {
    let prompt_tokens = sizer.token_size(sub_type, question)?;
    let response_tokens = sizer.token_size(sub_type, answer)?;
    Ok(match rate {
        Some(rate) => ModelResult::new(
            prompt_tokens,
            response_tokens,
            rate.price(prompt_tokens, response_tokens),
            USD,
        ),
        None => ModelResult::free(prompt_tokens, response_tokens),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::claude_rate;
    use crate::tokens::Estimator;

    #[tokio::test]
    async fn write_answer_writes_all_bytes() {
        let mut out: Vec<u8> = Vec::new();
        write_answer(&mut out, "Hi there").await.unwrap();
        assert_eq!(out, b"Hi there");
    }

    #[test]
    fn usage_free() {
        let result = usage(&Estimator, "gpt2", "Hello", "Hi there", None).unwrap();
        assert_eq!(result.prompt_token_count(), 1);
        assert_eq!(result.response_token_count(), 2);
        assert_eq!(result.total_token_count(), 3);
        assert_eq!(result.total_price(), 0.0);
    }

    #[test]
    fn usage_paid() {
        let rate = Rate::new(1.0, 2.0);
        let result = usage(&Estimator, "claude-3-haiku", "Hello", "Hi there", Some(rate)).unwrap();
        // 1 prompt token at $1/1K plus 2 response tokens at $2/1K
        assert!((result.total_price() - 0.005).abs() < 1e-12);
        assert_eq!(result.currency(), "USD");
    }

    #[test]
    fn usage_paid_single_token_is_not_free() {
        let rate = claude_rate("claude-3-haiku-20240307").unwrap();
        let result = usage(&Estimator, "claude-3-haiku-20240307", "Hi", "", Some(rate)).unwrap();

        assert_eq!(result.prompt_token_count(), 1);
        assert_eq!(result.response_token_count(), 0);
        assert!((result.total_price() - 0.00000025).abs() < 1e-15);
        assert_eq!(result.currency(), "USD");
        assert!(!result.is_free());
    }

    #[test]
    fn usage_unknown_model() {
        let err = usage(&Estimator, "acme/unknown", "a", "b", None).unwrap_err();
        assert!(matches!(err, ProviderError::Tokenization(_)));
    }

    #[test]
    fn blank_question_rejected() {
        let err = validate_request(&QueryRequest::new("  ")).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
