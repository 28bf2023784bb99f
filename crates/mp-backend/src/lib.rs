//! mp-backend: Model provider contract and backend adapters.
//!
//! Every backend (HuggingFace, Anthropic Claude, the scripted dummy) is
//! exposed through the [`ModelProvider`] trait. Callers obtain instances from
//! the [`Registry`] and never branch on which backend they are talking to.

pub mod anthropic;
pub mod cancel;
pub mod error;
pub mod huggingface;
pub mod mock;
pub mod normalize;
pub mod pricing;
pub mod provider;
pub mod registry;
pub mod sse;
pub mod tokens;
pub mod transport;

pub use anthropic::Claude;
pub use cancel::{CancelHandle, CancelSignal};
pub use error::{BackendError, ProviderError, TokenizationError};
pub use huggingface::HuggingFace;
pub use mock::{MockConfig, MockProvider, MockResponse};
pub use normalize::Normalization;
pub use pricing::{Pricing, Rate};
pub use provider::{ModelProvider, Sink};
pub use registry::{ProviderConfig, ProviderKind, Registry};
pub use tokens::{Estimator, TokenFamily, TokenSizer};
pub use transport::{Transport, TransportConfig};
