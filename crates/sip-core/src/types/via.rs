//! # SIP Via Header
//!
//! Implementation of the Via header
//! ([RFC 3261 Section 20.42](https://datatracker.ietf.org/doc/html/rfc3261#section-20.42)).
//!
//! ```text
//! Via: SIP/2.0/UDP pc33.atlanta.com:5060;branch=z9hG4bK776asdhds
//! ```
//!
//! The topmost Via's `branch` identifies the transaction. Responses travel
//! back along the Via path, so a UAS copies the full Via set into every
//! response it sends.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::utils::{parse_params, split_unquoted};
use crate::types::param::{set_param, write_params, Param, ParamList};

/// Magic cookie that RFC 3261 branches start with
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// One Via entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    /// Upper-case transport token (`UDP`, `TCP`, `TLS`, ...)
    pub transport: String,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl Via {
    pub fn new(transport: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Via {
            transport: transport.into().to_ascii_uppercase(),
            host: host.into(),
            port,
            params: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        set_param(&mut self.params, Param::branch(branch));
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        set_param(&mut self.params, param);
        self
    }

    pub fn branch(&self) -> Option<&str> {
        self.params.param_value("branch")
    }

    pub fn received(&self) -> Option<&str> {
        self.params.param_value("received")
    }

    pub fn rport(&self) -> Option<u16> {
        self.params.param_value("rport").and_then(|p| p.parse().ok())
    }

    /// Parses a header value that may hold several comma separated entries
    pub fn parse_list(input: &str) -> Result<Vec<Via>> {
        split_unquoted(input, ',')
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} ", self.transport)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write_params(f, &self.params)
    }
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let malformed = |reason: &str| Error::malformed("Via", raw, reason);

        let (protocol, rest) = raw
            .split_once(char::is_whitespace)
            .ok_or_else(|| malformed("missing sent-by"))?;

        let mut parts = protocol.split('/').map(str::trim);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(name), Some("2.0"), Some(transport), None)
                if name.eq_ignore_ascii_case("SIP") && !transport.is_empty() =>
            {
                let (sent_by, params) = match rest.find(';') {
                    Some(semi) => (rest[..semi].trim(), &rest[semi..]),
                    None => (rest.trim(), ""),
                };
                let (host, port) =
                    split_host_port(sent_by).ok_or_else(|| malformed("invalid sent-by"))?;
                Ok(Via {
                    transport: transport.to_ascii_uppercase(),
                    host,
                    port,
                    params: parse_params(params),
                })
            }
            _ => Err(malformed("expected SIP/2.0/<transport>")),
        }
    }
}

fn split_host_port(sent_by: &str) -> Option<(String, Option<u16>)> {
    if sent_by.is_empty() {
        return None;
    }
    if let Some(rest) = sent_by.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = match after.strip_prefix(':') {
            Some(p) => Some(p.parse().ok()?),
            None if after.is_empty() => None,
            None => return None,
        };
        return Some((host.to_string(), port));
    }
    match sent_by.split_once(':') {
        Some((host, port)) if !host.is_empty() => {
            Some((host.to_string(), Some(port.parse().ok()?)))
        }
        Some(_) => None,
        None => Some((sent_by.to_string(), None)),
    }
}

/// Generates a fresh RFC 3261 branch
pub fn generate_branch() -> String {
    format!("{}{}", BRANCH_MAGIC_COOKIE, crate::types::random_token(16))
}
