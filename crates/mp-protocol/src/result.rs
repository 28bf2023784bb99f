//! The usage and cost record returned by every query.

use serde::Serialize;

/// Token usage and price of one query.
///
/// Built only through [`ModelResult::new`], so the total always equals the
/// sum of prompt and response counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResult {
    prompt_token_count: usize,
    response_token_count: usize,
    total_token_count: usize,
    total_price: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    currency: String,
}

impl ModelResult {
    /// Negative or non-finite prices are clamped to zero.
    pub fn new(
        prompt_token_count: usize,
        response_token_count: usize,
        total_price: f64,
        currency: impl Into<String>,
    ) -> Self {
        let total_price = if total_price.is_finite() && total_price > 0.0 {
            total_price
        } else {
            0.0
        };
        Self {
            prompt_token_count,
            response_token_count,
            total_token_count: prompt_token_count + response_token_count,
            total_price,
            currency: currency.into(),
        }
    }

    /// A result for a free backend.
    pub fn free(prompt_token_count: usize, response_token_count: usize) -> Self {
        Self::new(prompt_token_count, response_token_count, 0.0, "")
    }

    pub fn prompt_token_count(&self) -> usize {
        self.prompt_token_count
    }

    pub fn response_token_count(&self) -> usize {
        self.response_token_count
    }

    pub fn total_token_count(&self) -> usize {
        self.total_token_count
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Free backends carry no currency; a paid query stays paid even when
    /// its price is zero.
    pub fn is_free(&self) -> bool {
        self.currency.is_empty()
    }
}
