//! Pricing labels and per-token rate tables.

use std::fmt;

/// Human-readable pricing pair reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pricing {
    pub tier: String,
    pub detail: String,
}

impl Pricing {
    pub fn new(tier: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            tier: tier.into(),
            detail: detail.into(),
        }
    }

    /// The constant pair reported by free backends.
    pub fn free() -> Self {
        Self::new("Free", "Free")
    }

    pub fn is_free(&self) -> bool {
        self.tier == "Free"
    }
}

impl fmt::Display for Pricing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tier == self.detail {
            write!(f, "{}", self.tier)
        } else {
            write!(f, "{}: {}", self.tier, self.detail)
        }
    }
}

/// USD cost per thousand tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

pub const USD: &str = "USD";

impl Rate {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Price of a query in dollars, unrounded.
    pub fn price(&self, prompt_tokens: usize, response_tokens: usize) -> f64 {
        prompt_tokens as f64 / 1000.0 * self.input_per_1k
            + response_tokens as f64 / 1000.0 * self.output_per_1k
    }

    pub fn pricing(&self) -> Pricing {
        Pricing::new(
            USD,
            format!(
                "input ${}/1K tokens, output ${}/1K tokens",
                self.input_per_1k, self.output_per_1k
            ),
        )
    }
}

/// Claude model prefixes and their rates.
const CLAUDE_RATES: &[(&str, Rate)] = &[
    ("claude-instant", Rate::new(0.0008, 0.0024)),
    ("claude-2", Rate::new(0.008, 0.024)),
    ("claude-3-haiku", Rate::new(0.00025, 0.00125)),
    ("claude-3-5-haiku", Rate::new(0.0008, 0.004)),
    ("claude-3-sonnet", Rate::new(0.003, 0.015)),
    ("claude-3-5-sonnet", Rate::new(0.003, 0.015)),
    ("claude-3-7-sonnet", Rate::new(0.003, 0.015)),
    ("claude-sonnet-4", Rate::new(0.003, 0.015)),
    ("claude-3-opus", Rate::new(0.015, 0.075)),
    ("claude-opus-4", Rate::new(0.015, 0.075)),
];

/// Look up the rate for a Claude sub-type such as `claude-3-haiku-20240307`.
pub fn claude_rate(sub_type: &str) -> Option<Rate> {
    CLAUDE_RATES
        .iter()
        .find(|(prefix, _)| sub_type.starts_with(prefix))
        .map(|(_, rate)| *rate)
}
