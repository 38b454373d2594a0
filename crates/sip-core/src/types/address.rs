//! # Name-addr values
//!
//! From, To, Contact, Route and Record-Route all carry a `name-addr` or
//! `addr-spec` followed by header parameters:
//!
//! ```text
//! "Alice" <sip:alice@example.com>;tag=1928301774
//! sip:bob@example.com;tag=a6c85cf
//! ```
//!
//! In the `addr-spec` form every `;param` after the URI belongs to the header,
//! not to the URI. Serialization always uses the bracketed form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::uri::parse_uri;
use crate::parser::utils::{parse_params, split_unquoted, unquote};
use crate::types::param::{set_param, write_params, Param, ParamList};
use crate::types::uri::Uri;

/// A display name, URI and header parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: Vec<Param>,
}

impl Address {
    pub fn new(uri: Uri) -> Self {
        Address {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        set_param(&mut self.params, param);
        self
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.with_param(Param::tag(tag))
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        set_param(&mut self.params, Param::tag(tag));
    }

    pub fn tag(&self) -> Option<&str> {
        self.params.param_value("tag")
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.param_value(name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.has_param(name)
    }

    /// Parses a comma separated list, as found in Contact and Route
    pub fn parse_list(header: &str, input: &str) -> Result<Vec<Address>> {
        split_unquoted(input, ',')
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| parse_address(header, s))
            .collect()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name.replace('\\', "\\\\").replace('"', "\\\""))?;
        }
        write!(f, "<{}>", self.uri)?;
        write_params(f, &self.params)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_address("Address", s)
    }
}

impl From<Uri> for Address {
    fn from(uri: Uri) -> Self {
        Address::new(uri)
    }
}

/// Parses one name-addr / addr-spec; `header` names the header in errors
pub fn parse_address(header: &str, input: &str) -> Result<Address> {
    let raw = input.trim();
    let malformed = |reason: &str| Error::malformed(header, raw, reason);

    if raw.is_empty() {
        return Err(malformed("empty address"));
    }

    match find_unquoted(raw, '<') {
        Some(open) => {
            let close = raw[open..]
                .find('>')
                .map(|i| open + i)
                .ok_or_else(|| malformed("unterminated '<'"))?;
            let name = raw[..open].trim();
            let display_name = if name.is_empty() {
                None
            } else {
                Some(unquote(name))
            };
            let uri = parse_uri(&raw[open + 1..close]).map_err(|_| malformed("invalid URI"))?;
            let trailer = raw[close + 1..].trim();
            if !trailer.is_empty() && !trailer.starts_with(';') {
                return Err(malformed("unexpected text after '>'"));
            }
            Ok(Address {
                display_name,
                uri,
                params: parse_params(trailer),
            })
        }
        None => {
            if raw.contains('"') || raw.contains(char::is_whitespace) {
                return Err(malformed("display name requires a bracketed URI"));
            }
            let (uri_part, params_part) = match raw.find(';') {
                Some(semi) => (&raw[..semi], &raw[semi..]),
                None => (raw, ""),
            };
            let uri = parse_uri(uri_part).map_err(|_| malformed("invalid URI"))?;
            Ok(Address {
                display_name: None,
                uri,
                params: parse_params(params_part),
            })
        }
    }
}

fn find_unquoted(input: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}
