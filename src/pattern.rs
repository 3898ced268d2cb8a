/* src/pattern.rs */

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::fmt;

/// Matches keys written as `/expression/`.
static DELIMITED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/(.+)/$").expect("static regex"));

/// A compiled record key.
#[derive(Clone)]
pub enum Pattern {
    /// Case-insensitive exact label.
    Literal(String),
    /// Matches any name.
    Wildcard,
    /// Case-insensitive expression, evaluated against the whole name.
    Regex(Regex),
}

impl Pattern {
    /// Compiles a record key. `*` is a wildcard, `/…/` a regular expression,
    /// and anything else a literal label.
    pub fn compile(key: &str) -> Result<Self> {
        if key == "*" {
            return Ok(Pattern::Wildcard);
        }
        if let Some(caps) = DELIMITED.captures(key) {
            let regex = RegexBuilder::new(&caps[1])
                .case_insensitive(true)
                .build()
                .map_err(|source| Error::InvalidPattern {
                    key: key.to_string(),
                    source,
                })?;
            return Ok(Pattern::Regex(regex));
        }
        Ok(Pattern::Literal(key.to_string()))
    }

    pub fn test(&self, name: &str) -> bool {
        match self {
            Pattern::Literal(label) => label.eq_ignore_ascii_case(name),
            Pattern::Wildcard => true,
            Pattern::Regex(regex) => regex.is_match(name),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(label) => write!(f, "Literal({:?})", label),
            Pattern::Wildcard => f.write_str("Wildcard"),
            Pattern::Regex(regex) => write!(f, "Regex(/{}/)", regex.as_str()),
        }
    }
}
