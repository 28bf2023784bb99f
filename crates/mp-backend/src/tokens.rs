//! Token sizing per backend model family.
//!
//! The default [`Estimator`] runs locally with no tokenizer tables. It is an
//! approximation: counts are deterministic for a given `(sub_type, text)` and
//! close to, but not identical to, the backend's own tokenizer. Exact counts
//! are available through `HfTokenizerSizer` (feature `hf-tokenizers`) when a
//! `tokenizer.json` is at hand.

use crate::error::TokenizationError;

/// Counts tokens of a text under a backend sub-type's tokenization.
pub trait TokenSizer: Send + Sync {
    fn token_size(&self, sub_type: &str, text: &str) -> Result<usize, TokenizationError>;
}

/// Tokenizer families known to the [`Estimator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFamily {
    Gpt2,
    Cl100k,
    Claude,
    Llama,
    Falcon,
    T5,
    Bloom,
}

/// Model-name fragments, checked in order against the last path segment.
const FAMILY_KEYWORDS: &[(&str, TokenFamily)] = &[
    ("claude", TokenFamily::Claude),
    ("gpt-4", TokenFamily::Cl100k),
    ("gpt-3.5", TokenFamily::Cl100k),
    ("text-embedding", TokenFamily::Cl100k),
    ("gpt2", TokenFamily::Gpt2),
    ("gpt-neo", TokenFamily::Gpt2),
    ("gpt-j", TokenFamily::Gpt2),
    ("dialogpt", TokenFamily::Gpt2),
    ("llama", TokenFamily::Llama),
    ("mistral", TokenFamily::Llama),
    ("mixtral", TokenFamily::Llama),
    ("zephyr", TokenFamily::Llama),
    ("vicuna", TokenFamily::Llama),
    ("falcon", TokenFamily::Falcon),
    ("t5", TokenFamily::T5),
    ("bloom", TokenFamily::Bloom),
];

impl TokenFamily {
    /// Resolve a sub-type such as `meta-llama/Llama-2-7b-chat-hf` or
    /// `claude-3-haiku-20240307` to its family.
    pub fn resolve(sub_type: &str) -> Option<Self> {
        let name = sub_type
            .rsplit('/')
            .next()
            .unwrap_or(sub_type)
            .to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        FAMILY_KEYWORDS
            .iter()
            .find(|(keyword, _)| name.contains(keyword))
            .map(|(_, family)| *family)
    }

    /// Longest alphanumeric run the family's vocabulary covers with one token.
    fn max_piece(self) -> usize {
        match self {
            TokenFamily::Gpt2 => 6,
            TokenFamily::Cl100k => 8,
            TokenFamily::Claude => 7,
            TokenFamily::Llama => 5,
            TokenFamily::Falcon => 6,
            TokenFamily::T5 => 5,
            TokenFamily::Bloom => 7,
        }
    }

    /// Approximate token count of `text`.
    ///
    /// Whitespace is absorbed into the following piece. A run of `n` ASCII
    /// alphanumerics costs `ceil(n / max_piece)`; every other character
    /// (punctuation, symbols, non-ASCII) costs one token.
    pub fn estimate(self, text: &str) -> usize {
        let max_piece = self.max_piece();
        let mut tokens = 0;
        let mut run = 0usize;

        for c in text.chars() {
            if c.is_ascii_alphanumeric() {
                run += 1;
                continue;
            }
            tokens += run.div_ceil(max_piece);
            run = 0;
            if !c.is_whitespace() {
                tokens += 1;
            }
        }

        tokens + run.div_ceil(max_piece)
    }
}

/// Local, table-free token sizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Estimator;

impl TokenSizer for Estimator {
    fn token_size(&self, sub_type: &str, text: &str) -> Result<usize, TokenizationError> {
        let family = TokenFamily::resolve(sub_type)
            .ok_or_else(|| TokenizationError::UnknownModel(sub_type.to_string()))?;
        Ok(family.estimate(text))
    }
}

#[cfg(feature = "hf-tokenizers")]
pub use hf::HfTokenizerSizer;

#[cfg(feature = "hf-tokenizers")]
mod hf {
    use std::collections::HashMap;
    use std::path::Path;

    use tokenizers::Tokenizer;

    use super::TokenSizer;
    use crate::error::TokenizationError;

    /// Exact token counts from `tokenizer.json` files registered per sub-type.
    #[derive(Default)]
    pub struct HfTokenizerSizer {
        tokenizers: HashMap<String, Tokenizer>,
    }

    impl HfTokenizerSizer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Load the tokenizer for `sub_type` from a local `tokenizer.json`.
        pub fn load(
            &mut self,
            sub_type: impl Into<String>,
            path: impl AsRef<Path>,
        ) -> Result<(), TokenizationError> {
            let tokenizer = Tokenizer::from_file(path)
                .map_err(|e| TokenizationError::Tokenizer(e.to_string()))?;
            self.tokenizers.insert(sub_type.into(), tokenizer);
            Ok(())
        }
    }

    impl TokenSizer for HfTokenizerSizer {
        fn token_size(&self, sub_type: &str, text: &str) -> Result<usize, TokenizationError> {
            let tokenizer = self
                .tokenizers
                .get(sub_type)
                .ok_or_else(|| TokenizationError::UnknownModel(sub_type.to_string()))?;
            let encoding = tokenizer
                .encode(text, false)
                .map_err(|e| TokenizationError::Tokenizer(e.to_string()))?;
            Ok(encoding.len())
        }
    }

    #[cfg(test)]
    mod tests {
        use std::io::Write;

        use super::*;

        const WORD_LEVEL: &str = r#"{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {"[UNK]": 0, "hello": 1, "world": 2},
                "unk_token": "[UNK]"
            }
        }"#;

        fn sizer() -> HfTokenizerSizer {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(WORD_LEVEL.as_bytes()).unwrap();

            let mut sizer = HfTokenizerSizer::new();
            sizer.load("acme/word-level", file.path()).unwrap();
            sizer
        }

        #[test]
        fn counts_exact_encodings() {
            let sizer = sizer();
            assert_eq!(sizer.token_size("acme/word-level", "hello world").unwrap(), 2);
            // The comma is its own piece and maps to [UNK].
            assert_eq!(sizer.token_size("acme/word-level", "hello, world").unwrap(), 3);
            assert_eq!(sizer.token_size("acme/word-level", "").unwrap(), 0);
        }

        #[test]
        fn unregistered_sub_type_is_unknown_model() {
            let err = sizer().token_size("gpt2", "hello").unwrap_err();
            assert_eq!(err, TokenizationError::UnknownModel("gpt2".to_string()));
        }

        #[test]
        fn unreadable_file_is_tokenizer_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = HfTokenizerSizer::new()
                .load("gpt2", dir.path().join("missing.json"))
                .unwrap_err();
            assert!(matches!(err, TokenizationError::Tokenizer(_)));
        }
    }
}
