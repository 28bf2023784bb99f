//! mp-protocol: Shared types for model providers.
//!
//! This crate defines the request, message and result types exchanged
//! between callers and the provider adapters in `mp-backend`.

pub mod context;
pub mod message;
pub mod result;

pub use context::{QueryRequest, RawMessage, Role};
pub use message::StreamEvent;
pub use result::ModelResult;
