//! One-shot query mode: send a question, stream the answer to a sink, report usage.

use std::time::{Duration, Instant};

use mp_backend::{CancelSignal, ModelProvider, ProviderError, Sink};
use mp_protocol::{ModelResult, QueryRequest};
use tracing::info;

/// Cancellation for one query: an optional deadline plus Ctrl-C.
pub fn cancel_signal(timeout: Option<Duration>) -> CancelSignal {
    let (handle, signal) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    match timeout {
        Some(after) => signal.with_deadline(after),
        None => signal,
    }
}

pub async fn run_query(
    provider: &dyn ModelProvider,
    request: &QueryRequest,
    out: &mut Sink,
    cancel: &CancelSignal,
) -> Result<ModelResult, ProviderError> {
    info!(
        provider = %provider.kind(),
        model = provider.sub_type(),
        prompt_len = request.question.len(),
        "running query"
    );
    let start = Instant::now();

    let result = provider.query_text(request, out, cancel).await?;

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        total_tokens = result.total_token_count(),
        "query finished"
    );
    Ok(result)
}

/// Human-readable usage summary for stderr.
pub fn usage_line(result: &ModelResult) -> String {
    let price = if result.is_free() {
        "free".to_string()
    } else {
        format!("{} {}", result.total_price(), result.currency())
    };
    format!(
        "tokens: {} prompt + {} response = {}, price: {price}",
        result.prompt_token_count(),
        result.response_token_count(),
        result.total_token_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mp_backend::mock::fixtures;
    use mp_backend::{Estimator, MockProvider};

    #[tokio::test]
    async fn runs_provider_into_sink() {
        let provider = MockProvider::new(
            "gpt2",
            fixtures::streaming_text(&["Hi", " there\n", "[debug: 12ms]"]),
            Arc::new(Estimator),
        );
        let mut out: Vec<u8> = Vec::new();

        let result = run_query(
            &provider,
            &QueryRequest::new("Hello"),
            &mut out,
            &CancelSignal::never(),
        )
        .await
        .unwrap();

        assert_eq!(out, b"Hi there");
        assert!(result.is_free());
    }

    #[tokio::test]
    async fn cancel_signal_applies_deadline() {
        let provider = MockProvider::new(
            "gpt2",
            mp_backend::MockConfig::new().with_responses(vec![mp_backend::MockResponse::Delay {
                ms: 5_000,
            }]),
            Arc::new(Estimator),
        );
        let mut out: Vec<u8> = Vec::new();

        let err = run_query(
            &provider,
            &QueryRequest::new("Hello"),
            &mut out,
            &cancel_signal(Some(Duration::from_millis(20))),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Backend(mp_backend::BackendError::DeadlineExceeded(_))
        ));
    }

    #[test]
    fn usage_line_free_and_paid() {
        let free = ModelResult::free(5, 8);
        assert_eq!(
            usage_line(&free),
            "tokens: 5 prompt + 8 response = 13, price: free"
        );

        let paid = ModelResult::new(1000, 2000, 0.0345, "USD");
        assert_eq!(
            usage_line(&paid),
            "tokens: 1000 prompt + 2000 response = 3000, price: 0.0345 USD"
        );

        let tiny = ModelResult::new(1, 0, 0.00000025, "USD");
        assert_eq!(
            usage_line(&tiny),
            "tokens: 1 prompt + 0 response = 1, price: 0.00000025 USD"
        );
    }
}
