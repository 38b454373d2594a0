//! # Message builders
//!
//! Fluent builders for requests and responses. Setters validate each value
//! for its header kind as it is added; the first failure is remembered and
//! returned from `build()`, so a chain of setters never panics.
//!
//! ```rust
//! use sipunit_sip_core::builder::SimpleRequestBuilder;
//! use sipunit_sip_core::{HeaderAccess, Method};
//!
//! let request = SimpleRequestBuilder::new(Method::Invite, "sip:bob@example.com")
//!     .unwrap()
//!     .from("Alice", "sip:alice@example.com", Some("1928301774"))
//!     .to("Bob", "sip:bob@example.com", None)
//!     .call_id("a84b4c76e66710")
//!     .cseq(1)
//!     .via("127.0.0.1:5060", "UDP", Some("z9hG4bK776asdhds"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.from_tag().as_deref(), Some("1928301774"));
//! assert_eq!(request.max_forwards(), Some(70));
//! ```

mod request;
mod response;

pub use request::SimpleRequestBuilder;
pub use response::SimpleResponseBuilder;

use crate::error::{Error, Result};
use crate::types::address::Address;
use crate::types::headers::{HeaderName, Headers};
use crate::types::param::Param;
use crate::types::via::Via;

/// Default Max-Forwards for new requests
pub const DEFAULT_MAX_FORWARDS: u32 = 70;

/// Header list plus the first validation error seen
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderSlate {
    pub(crate) headers: Headers,
    pub(crate) error: Option<Error>,
}

impl HeaderSlate {
    pub(crate) fn from_headers(headers: Headers) -> Self {
        HeaderSlate {
            headers,
            error: None,
        }
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Validates and inserts using the header kind's replace/append rule
    pub(crate) fn insert(&mut self, name: HeaderName, value: impl Into<String>) {
        let value = value.into();
        match name.validate(&value) {
            Ok(()) => self.headers.insert(name, value.trim()),
            Err(e) => self.fail(e),
        }
    }

    /// Inserts a header given by textual name
    pub(crate) fn insert_raw(&mut self, name: &str, value: &str) {
        match name.parse::<HeaderName>() {
            Ok(name) => self.insert(name, value),
            Err(e) => self.fail(e),
        }
    }

    pub(crate) fn address(
        &mut self,
        name: HeaderName,
        display_name: &str,
        uri: &str,
        tag: Option<&str>,
    ) {
        match build_address(name.as_str(), display_name, uri, tag) {
            Ok(address) => self.headers.set(name, address.to_string()),
            Err(e) => self.fail(e),
        }
    }

    pub(crate) fn via(&mut self, host: &str, transport: &str, branch: Option<&str>) {
        let (host, port) = match host.rsplit_once(':') {
            Some((h, p)) if !h.contains(':') || h.ends_with(']') => match p.parse::<u16>() {
                Ok(port) => (h.trim_start_matches('[').trim_end_matches(']'), Some(port)),
                Err(_) => {
                    self.fail(Error::malformed("Via", host, "invalid port"));
                    return;
                }
            },
            _ => (host.trim_start_matches('[').trim_end_matches(']'), None),
        };
        if host.is_empty() || transport.trim().is_empty() {
            self.fail(Error::malformed("Via", host, "empty host or transport"));
            return;
        }
        let mut via = Via::new(transport.trim(), host, port);
        if let Some(branch) = branch {
            via = via.with_branch(branch);
        }
        self.headers.append(HeaderName::Via, via.to_string());
    }

    pub(crate) fn finish(self) -> Result<Headers> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.headers),
        }
    }
}

fn build_address(
    header: &str,
    display_name: &str,
    uri: &str,
    tag: Option<&str>,
) -> Result<Address> {
    let uri = crate::parser::uri::parse_uri(uri)
        .map_err(|_| Error::malformed(header, uri, "invalid URI"))?;
    let mut address = Address::new(uri);
    if !display_name.trim().is_empty() {
        address.display_name = Some(display_name.trim().to_string());
    }
    if let Some(tag) = tag {
        address = address.with_param(Param::tag(tag));
    }
    Ok(address)
}
