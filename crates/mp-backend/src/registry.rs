//! Provider registry: maps a configured backend name to a provider.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anthropic::Claude;
use crate::error::ProviderError;
use crate::huggingface::{redacted, HuggingFace};
use crate::mock::MockProvider;
use crate::provider::ModelProvider;
use crate::tokens::{Estimator, TokenSizer};
use crate::transport::Transport;

/// Backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    HuggingFace,
    Claude,
    /// Offline echo provider.
    Dummy,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::HuggingFace,
        ProviderKind::Claude,
        ProviderKind::Dummy,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::HuggingFace => "Hugging Face",
            ProviderKind::Claude => "Claude",
            ProviderKind::Dummy => "Dummy",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "huggingface" | "hugging face" | "hf" => Ok(ProviderKind::HuggingFace),
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "dummy" | "mock" => Ok(ProviderKind::Dummy),
            _ => Err(ProviderError::config(format!("unknown provider type: {s}"))),
        }
    }
}

/// Everything needed to construct one provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    pub sub_type: String,
    #[serde(default, skip_serializing)]
    pub secret_key: String,
    #[serde(default)]
    pub temperature: f32,
    /// Override the backend endpoint (tests, self-hosted gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Write text to the sink as it arrives, where the backend streams.
    #[serde(default)]
    pub stream: bool,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, sub_type: impl Into<String>) -> Self {
        Self {
            kind,
            sub_type: sub_type.into(),
            secret_key: String::new(),
            temperature: 0.0,
            base_url: None,
            stream: false,
        }
    }

    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = secret_key.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("sub_type", &self.sub_type)
            .field("secret_key", &redacted(&self.secret_key))
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Builds a provider. Must not perform network I/O.
pub type Constructor = fn(
    &ProviderConfig,
    &Transport,
    Arc<dyn TokenSizer>,
) -> Result<Arc<dyn ModelProvider>, ProviderError>;

fn build_huggingface(
    config: &ProviderConfig,
    transport: &Transport,
    sizer: Arc<dyn TokenSizer>,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    let mut provider = HuggingFace::new(
        config.sub_type.as_str(),
        config.secret_key.as_str(),
        config.temperature,
        transport,
        sizer,
    )?;
    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.as_str());
    }
    Ok(Arc::new(provider))
}

fn build_claude(
    config: &ProviderConfig,
    transport: &Transport,
    sizer: Arc<dyn TokenSizer>,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    let mut provider = Claude::new(
        config.sub_type.as_str(),
        config.secret_key.as_str(),
        config.temperature,
        transport,
        sizer,
    )?
    .streaming(config.stream);
    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.as_str());
    }
    Ok(Arc::new(provider))
}

fn build_dummy(
    config: &ProviderConfig,
    _transport: &Transport,
    sizer: Arc<dyn TokenSizer>,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    if config.sub_type.trim().is_empty() {
        return Err(ProviderError::config("dummy provider needs a sub-type"));
    }
    Ok(Arc::new(MockProvider::echo(config.sub_type.as_str(), sizer)))
}

/// Constructors keyed by backend family, sharing one transport and sizer.
#[derive(Clone)]
pub struct Registry {
    transport: Transport,
    sizer: Arc<dyn TokenSizer>,
    constructors: HashMap<ProviderKind, Constructor>,
}

impl Registry {
    /// A registry with the built-in backends and the local estimator.
    pub fn new(transport: Transport) -> Self {
        let mut constructors: HashMap<ProviderKind, Constructor> = HashMap::new();
        constructors.insert(ProviderKind::HuggingFace, build_huggingface);
        constructors.insert(ProviderKind::Claude, build_claude);
        constructors.insert(ProviderKind::Dummy, build_dummy);

        Self {
            transport,
            sizer: Arc::new(Estimator),
            constructors,
        }
    }

    pub fn with_sizer(mut self, sizer: Arc<dyn TokenSizer>) -> Self {
        self.sizer = sizer;
        self
    }

    /// Replace the constructor for `kind`.
    pub fn register(&mut self, kind: ProviderKind, constructor: Constructor) {
        self.constructors.insert(kind, constructor);
    }

    pub fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        let constructor = self.constructors.get(&config.kind).ok_or_else(|| {
            ProviderError::config(format!("no constructor registered for {}", config.kind))
        })?;

        debug!(kind = %config.kind, model = %config.sub_type, "building provider");
        constructor(config, &self.transport, Arc::clone(&self.sizer))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().collect();
        kinds.sort_by_key(|kind| kind.display_name());
        f.debug_struct("Registry")
            .field("transport", &self.transport)
            .field("kinds", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::Pricing;
    use crate::transport::TransportConfig;

    fn registry() -> Registry {
        Registry::new(Transport::new(&TransportConfig::default()).unwrap())
    }

    #[test]
    fn parses_aliases_case_insensitively() {
        for (name, kind) in [
            ("huggingface", ProviderKind::HuggingFace),
            ("Hugging Face", ProviderKind::HuggingFace),
            ("HF", ProviderKind::HuggingFace),
            ("claude", ProviderKind::Claude),
            ("Anthropic", ProviderKind::Claude),
            ("dummy", ProviderKind::Dummy),
            ("MOCK", ProviderKind::Dummy),
        ] {
            assert_eq!(name.parse::<ProviderKind>().unwrap(), kind, "{name}");
        }
    }

    #[test]
    fn unknown_kind_is_configuration_error() {
        let err = "openai".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn builds_each_builtin_kind() {
        let registry = registry();

        let hf = registry
            .build(&ProviderConfig::new(ProviderKind::HuggingFace, "gpt2"))
            .unwrap();
        assert_eq!(hf.kind(), ProviderKind::HuggingFace);
        assert_eq!(hf.pricing(), Pricing::free());

        let claude = registry
            .build(
                &ProviderConfig::new(ProviderKind::Claude, "claude-3-haiku-20240307")
                    .with_secret_key("sk-ant-test")
                    .with_temperature(0.2),
            )
            .unwrap();
        assert_eq!(claude.kind(), ProviderKind::Claude);
        assert_eq!(claude.sub_type(), "claude-3-haiku-20240307");
        assert!(!claude.pricing().is_free());

        let dummy = registry
            .build(&ProviderConfig::new(ProviderKind::Dummy, "gpt2"))
            .unwrap();
        assert_eq!(dummy.kind(), ProviderKind::Dummy);
    }

    #[test]
    fn construction_errors_propagate() {
        let err = registry()
            .build(&ProviderConfig::new(ProviderKind::Claude, "claude-3-haiku"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn register_replaces_constructor() {
        fn refuse(
            _: &ProviderConfig,
            _: &Transport,
            _: Arc<dyn TokenSizer>,
        ) -> Result<Arc<dyn ModelProvider>, ProviderError> {
            Err(ProviderError::config("disabled"))
        }

        let mut registry = registry();
        registry.register(ProviderKind::Dummy, refuse);

        let err = registry
            .build(&ProviderConfig::new(ProviderKind::Dummy, "gpt2"))
            .unwrap_err();
        assert_eq!(err.to_string(), "configuration error: disabled");
    }

    #[test]
    fn config_deserializes_and_hides_secret() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"type": "claude", "sub_type": "claude-3-opus", "secret_key": "sk-ant-secret", "temperature": 0.7}"#,
        )
        .unwrap();

        assert_eq!(config.kind, ProviderKind::Claude);
        assert!(!config.stream);
        assert!(config.base_url.is_none());

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-secret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-ant-secret"));
    }
}
