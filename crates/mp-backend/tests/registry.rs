//! Providers obtained from the registry behave the same behind `dyn ModelProvider`.

use std::sync::Arc;

use mp_backend::{
    CancelSignal, ModelProvider, ProviderConfig, ProviderError, ProviderKind, Registry,
    TokenizationError, TokenSizer, Transport, TransportConfig,
};
use mp_protocol::QueryRequest;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Counts characters; knows only one model.
struct CharSizer;

impl TokenSizer for CharSizer {
    fn token_size(&self, sub_type: &str, text: &str) -> Result<usize, TokenizationError> {
        if sub_type == "gpt2" {
            Ok(text.chars().count())
        } else {
            Err(TokenizationError::UnknownModel(sub_type.to_string()))
        }
    }
}

fn registry() -> Registry {
    Registry::new(Transport::new(&TransportConfig::default()).unwrap())
}

async fn ask(provider: &dyn ModelProvider, question: &str) -> (String, mp_protocol::ModelResult) {
    let mut sink: Vec<u8> = Vec::new();
    let result = provider
        .query_text(&QueryRequest::new(question), &mut sink, &CancelSignal::never())
        .await
        .unwrap();
    (String::from_utf8(sink).unwrap(), result)
}

#[tokio::test]
async fn huggingface_through_registry_uses_configured_sizer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gpt2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"generated_text": "Hi there\n[debug: 12ms]"}])),
        )
        .mount(&server)
        .await;

    let registry = registry().with_sizer(Arc::new(CharSizer));
    let provider = registry
        .build(&ProviderConfig::new(ProviderKind::HuggingFace, "gpt2").with_base_url(server.uri()))
        .unwrap();

    let (answer, result) = ask(provider.as_ref(), "Hello").await;
    assert_eq!(answer, "Hi there");
    assert_eq!(result.prompt_token_count(), 5);
    assert_eq!(result.response_token_count(), 8);
    assert_eq!(result.total_token_count(), 13);
    assert_eq!(result.total_price(), 0.0);
}

#[tokio::test]
async fn dummy_echoes_question() {
    let provider = registry()
        .build(&ProviderConfig::new(ProviderKind::Dummy, "gpt2"))
        .unwrap();

    let (answer, result) = ask(provider.as_ref(), "ping\npong").await;
    assert_eq!(answer, "ping");
    assert!(result.is_free());
    assert_eq!(provider.pricing().tier, "Free");
}

#[tokio::test]
async fn construction_does_no_network_io() {
    // Nothing listens on this port; building must still succeed.
    let provider = registry().build(
        &ProviderConfig::new(ProviderKind::HuggingFace, "gpt2").with_base_url("http://127.0.0.1:9"),
    );
    assert!(provider.is_ok());

    let err = registry()
        .build(&ProviderConfig::new(ProviderKind::HuggingFace, "not a model id"))
        .unwrap_err();
    assert!(matches!(err, ProviderError::Configuration(_)));
}
