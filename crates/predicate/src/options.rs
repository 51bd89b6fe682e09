//! Parser configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::value::DEFAULT_DATE_FORMATS;

/// Options that influence how filter text is turned into a predicate.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ParserOptions {
    /// Formatting conventions used when converting literal text.
    pub culture: Culture,
    /// How `eq` treats flags enums.
    pub flags_match: FlagsMatch,
}

impl ParserOptions {
    /// Deserializes parser options from a YAML string slice.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_norway::from_str(yaml)?)
    }

    /// Returns options with the given flags-enum equality mode.
    pub fn with_flags_match(mut self, flags_match: FlagsMatch) -> Self {
        self.flags_match = flags_match;
        self
    }
}

/// Equality semantics for flags enums.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlagsMatch {
    /// `Value eq A` holds only when the value is exactly `A`.
    #[default]
    Exact,
    /// `Value eq A` holds when every bit of `A` is set, i.e. `(Value & A) == A`.
    Contains,
}

/// Number and date conventions for literal conversion. Defaults to en-US.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Culture {
    pub decimal_separator: char,
    pub group_separator: char,
    /// chrono format strings, tried in order after RFC 3339.
    pub date_formats: Vec<String>,
}

impl Default for Culture {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            group_separator: ',',
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Culture {
    /// Rewrites culture-specific number text into the invariant form understood by `str::parse`.
    ///
    /// Returns `None` when the text still contains characters that cannot be part of a number.
    pub fn normalize_number(&self, text: &str) -> Option<String> {
        let normalized: String = text
            .trim()
            .chars()
            .filter(|c| *c != self.group_separator)
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect();
        let valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
        valid.then_some(normalized)
    }
}
