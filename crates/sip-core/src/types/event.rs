//! Event header (RFC 6665 Section 8.2.1)
//!
//! ```text
//! Event: conference;id=42
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::utils::{is_token_char, parse_params};
use crate::types::param::{write_params, Param, ParamList};

/// An event package name with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub package: String,
    pub params: Vec<Param>,
}

impl Event {
    pub fn new(package: impl Into<String>) -> Self {
        Event {
            package: package.into(),
            params: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.params.retain(|p| !p.is("id"));
        self.params.push(Param::new("id", Some(id)));
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.params.param_value("id")
    }

    /// Event packages match case-insensitively and on equal `id`
    pub fn matches(&self, other: &Event) -> bool {
        self.package.eq_ignore_ascii_case(&other.package) && self.id() == other.id()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.package)?;
        write_params(f, &self.params)
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let (package, params) = match raw.find(';') {
            Some(semi) => (raw[..semi].trim(), &raw[semi..]),
            None => (raw, ""),
        };
        if package.is_empty() || !package.chars().all(is_token_char) {
            return Err(Error::malformed("Event", raw, "invalid event package"));
        }
        Ok(Event {
            package: package.to_string(),
            params: parse_params(params),
        })
    }
}
