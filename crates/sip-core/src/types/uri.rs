//! # SIP URIs
//!
//! `sip:` and `sips:` URIs (RFC 3261 Section 19.1). The harness only needs the
//! user, host, port and parameter parts; URI headers (`?...`) are kept verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::param::{set_param, write_params, Param, ParamList};

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }

    /// Default port for the scheme
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Sip => 5060,
            Scheme::Sips => 5061,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SIP or SIPS URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uri {
    pub scheme: Scheme,
    pub user: Option<String>,
    /// Host without IPv6 brackets
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
    /// Raw `?hname=hvalue` part, without the `?`
    pub headers: Option<String>,
}

impl Uri {
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Uri {
            scheme,
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
            headers: None,
        }
    }

    /// `sip:host`
    pub fn sip(host: impl Into<String>) -> Self {
        Uri::new(Scheme::Sip, host)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        set_param(&mut self.params, param);
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.param_value(name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.has_param(name)
    }

    /// Value of the `transport` parameter, lower-cased
    pub fn transport(&self) -> Option<String> {
        self.param("transport").map(|t| t.to_ascii_lowercase())
    }

    /// Port, falling back to the scheme default
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// `host[:port]` with IPv6 hosts bracketed
    pub fn host_port(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        }
    }

    /// `user@host` identity used when comparing addresses of record
    pub fn aor(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host.to_ascii_lowercase()),
            None => self.host.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host_port())?;
        write_params(f, &self.params)?;
        if let Some(headers) = &self.headers {
            write!(f, "?{}", headers)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        crate::parser::uri::parse_uri(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_display() {
        let uri = Uri::sip("example.com")
            .with_user("alice")
            .with_port(5070)
            .with_param(Param::new("transport", Some("tcp")));
        assert_eq!(uri.to_string(), "sip:alice@example.com:5070;transport=tcp");
        assert_eq!(uri.transport().as_deref(), Some("tcp"));
    }

    #[test]
    fn test_ipv6_host_port() {
        let uri = Uri::sip("::1").with_port(5060);
        assert_eq!(uri.host_port(), "[::1]:5060");
    }

    #[test]
    fn test_default_port() {
        let uri: Uri = "sips:bob@example.com".parse().unwrap();
        assert_eq!(uri.port_or_default(), 5061);
    }
}
