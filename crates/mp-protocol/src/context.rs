//! Query inputs: the question, prior turns and retrieval context.

use serde::{Deserialize, Serialize};

/// Author of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A prior turn or a supplementary knowledge message.
///
/// Providers only read these; they never mutate the caller's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawMessage {
    pub role: Role,
    pub text: String,
}

impl RawMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }
}

/// A complete text query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<RawMessage>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
    /// Supplementary messages from retrieval-augmented callers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge: Vec<RawMessage>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<RawMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_knowledge(mut self, knowledge: Vec<RawMessage>) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Check that the request carries a question.
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question must not be empty".to_string());
        }
        Ok(())
    }

    /// Whether any context beyond the bare question was supplied.
    pub fn has_context(&self) -> bool {
        !self.history.is_empty() || !self.system_prompt.is_empty() || !self.knowledge.is_empty()
    }
}
