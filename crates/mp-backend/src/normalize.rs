//! Per-backend answer normalization.
//!
//! Some backends append metadata or extra candidates after the answer; each
//! adapter picks the policy that matches its output format.

/// How a raw backend answer is reduced before it reaches the sink.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Pass the answer through untouched.
    #[default]
    Verbatim,
    /// Keep only the text before the first line break.
    FirstLine,
    /// Remove a trailing stop sequence and the whitespace before it.
    StripStopSequences(Vec<String>),
}

impl Normalization {
    pub fn apply(&self, raw: &str) -> String {
        match self {
            Normalization::Verbatim => raw.to_string(),
            Normalization::FirstLine => {
                let line = raw.split('\n').next().unwrap_or("");
                line.strip_suffix('\r').unwrap_or(line).to_string()
            }
            Normalization::StripStopSequences(stops) => {
                let mut text = raw.trim_end();
                for stop in stops.iter().filter(|s| !s.is_empty()) {
                    if let Some(stripped) = text.strip_suffix(stop.as_str()) {
                        text = stripped.trim_end();
                        break;
                    }
                }
                text.to_string()
            }
        }
    }
}
