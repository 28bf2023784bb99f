//! Events emitted by streaming backends.

/// Events emitted during a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of response text.
    TextDelta(String),

    /// Token usage as reported by the backend.
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },

    /// Stream has completed successfully.
    Done,

    /// An error occurred during streaming.
    Error(String),
}
