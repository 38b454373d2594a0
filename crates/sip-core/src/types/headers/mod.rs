//! # Header collection
//!
//! Messages keep their headers in wire order. Unique headers (Call-ID, CSeq,
//! To, From, Contact, ...) are replaced when set again; repeatable headers
//! (Via, Route, Record-Route and unknown extensions) accumulate.
//!
//! Typed access goes through [`HeaderAccess`], implemented by requests and
//! responses. Values are stored as text and parsed on access.

mod header_name;

pub use header_name::HeaderName;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Address, CSeq, Event, SubscriptionState, Via};

/// One header line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: HeaderName,
    pub value: String,
}

impl Header {
    pub fn new(name: HeaderName, value: impl Into<String>) -> Self {
        Header {
            name,
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Ordered header list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    /// Replaces every existing header of this name with a single value,
    /// keeping the position of the first one
    pub fn set(&mut self, name: HeaderName, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|h| h.name == name) {
            Some(pos) => {
                self.0[pos].value = value;
                let mut index = 0;
                self.0.retain(|h| {
                    let keep = index <= pos || h.name != name;
                    index += 1;
                    keep
                });
            }
            None => self.0.push(Header::new(name, value)),
        }
    }

    /// Adds a header line after any existing ones
    pub fn append(&mut self, name: HeaderName, value: impl Into<String>) {
        self.0.push(Header::new(name, value));
    }

    /// Adds a header line above all others of the same name
    pub fn prepend(&mut self, name: HeaderName, value: impl Into<String>) {
        let pos = self.0.iter().position(|h| h.name == name).unwrap_or(self.0.len());
        self.0.insert(pos, Header::new(name, value));
    }

    /// Replaces unique headers, appends repeatable ones
    pub fn insert(&mut self, name: HeaderName, value: impl Into<String>) {
        if name.is_unique() {
            self.set(name, value);
        } else {
            self.append(name, value);
        }
    }

    /// First value for `name`
    pub fn get(&self, name: &HeaderName) -> Option<&str> {
        self.0.iter().find(|h| &h.name == name).map(|h| h.value.as_str())
    }

    /// All values for `name`, in order
    pub fn get_all(&self, name: &HeaderName) -> Vec<&str> {
        self.0
            .iter()
            .filter(|h| &h.name == name)
            .map(|h| h.value.as_str())
            .collect()
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.0.iter().any(|h| &h.name == name)
    }

    /// Removes every header of this name, returning how many were removed
    pub fn remove(&mut self, name: &HeaderName) -> usize {
        let before = self.0.len();
        self.0.retain(|h| &h.name != name);
        before - self.0.len()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Typed header getters shared by requests and responses
pub trait HeaderAccess {
    fn headers(&self) -> &Headers;

    /// Raw value lookup by name, accepting compact and any-case names
    fn header(&self, name: &str) -> Option<&str> {
        let name = name.parse::<HeaderName>().ok()?;
        self.headers().get(&name)
    }

    fn call_id(&self) -> Option<&str> {
        self.headers().get(&HeaderName::CallId).map(str::trim)
    }

    fn cseq(&self) -> Result<CSeq> {
        required(self.headers(), HeaderName::CSeq)?.parse()
    }

    fn from(&self) -> Result<Address> {
        crate::types::address::parse_address("From", required(self.headers(), HeaderName::From)?)
    }

    fn to(&self) -> Result<Address> {
        crate::types::address::parse_address("To", required(self.headers(), HeaderName::To)?)
    }

    fn from_tag(&self) -> Option<String> {
        self.from().ok().and_then(|a| a.tag().map(str::to_string))
    }

    fn to_tag(&self) -> Option<String> {
        self.to().ok().and_then(|a| a.tag().map(str::to_string))
    }

    /// Every Via entry, top first, across all Via lines
    fn vias(&self) -> Result<Vec<Via>> {
        let mut vias = Vec::new();
        for value in self.headers().get_all(&HeaderName::Via) {
            vias.extend(Via::parse_list(value)?);
        }
        Ok(vias)
    }

    fn top_via(&self) -> Result<Via> {
        self.vias()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::MissingHeader("Via".to_string()))
    }

    /// Branch of the top Via
    fn branch(&self) -> Option<String> {
        self.top_via().ok().and_then(|v| v.branch().map(str::to_string))
    }

    fn contacts(&self) -> Result<Vec<Address>> {
        address_list(self.headers(), HeaderName::Contact)
    }

    fn record_routes(&self) -> Result<Vec<Address>> {
        address_list(self.headers(), HeaderName::RecordRoute)
    }

    fn routes(&self) -> Result<Vec<Address>> {
        address_list(self.headers(), HeaderName::Route)
    }

    fn expires(&self) -> Option<u32> {
        self.headers()
            .get(&HeaderName::Expires)
            .and_then(|v| v.trim().parse().ok())
    }

    fn max_forwards(&self) -> Option<u32> {
        self.headers()
            .get(&HeaderName::MaxForwards)
            .and_then(|v| v.trim().parse().ok())
    }

    fn event(&self) -> Option<Event> {
        self.headers().get(&HeaderName::Event).and_then(|v| v.parse().ok())
    }

    fn subscription_state(&self) -> Option<SubscriptionState> {
        self.headers()
            .get(&HeaderName::SubscriptionState)
            .and_then(|v| v.parse().ok())
    }

    fn content_type(&self) -> Option<&str> {
        self.headers().get(&HeaderName::ContentType).map(str::trim)
    }
}

fn required(headers: &Headers, name: HeaderName) -> Result<&str> {
    headers
        .get(&name)
        .ok_or_else(|| Error::MissingHeader(name.as_str().to_string()))
}

fn address_list(headers: &Headers, name: HeaderName) -> Result<Vec<Address>> {
    let mut list = Vec::new();
    for value in headers.get_all(&name) {
        list.extend(Address::parse_list(name.as_str(), value)?);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_all() {
        let mut headers = Headers::new();
        headers.append(HeaderName::Via, "SIP/2.0/UDP a;branch=z9hG4bK1");
        headers.append(HeaderName::To, "<sip:a@b>");
        headers.append(HeaderName::To, "<sip:c@d>");
        headers.set(HeaderName::To, "<sip:e@f>");
        assert_eq!(headers.get_all(&HeaderName::To), vec!["<sip:e@f>"]);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_insert_is_kind_aware() {
        let mut headers = Headers::new();
        headers.insert(HeaderName::Via, "SIP/2.0/UDP a;branch=z9hG4bK1");
        headers.insert(HeaderName::Via, "SIP/2.0/UDP b;branch=z9hG4bK2");
        headers.insert(HeaderName::Expires, "60");
        headers.insert(HeaderName::Expires, "3600");
        assert_eq!(headers.get_all(&HeaderName::Via).len(), 2);
        assert_eq!(headers.get_all(&HeaderName::Expires), vec!["3600"]);
    }

    #[test]
    fn test_prepend_goes_on_top() {
        let mut headers = Headers::new();
        headers.append(HeaderName::CallId, "x");
        headers.append(HeaderName::Via, "SIP/2.0/UDP a;branch=z9hG4bK1");
        headers.prepend(HeaderName::Via, "SIP/2.0/UDP b;branch=z9hG4bK2");
        assert_eq!(
            headers.get(&HeaderName::Via),
            Some("SIP/2.0/UDP b;branch=z9hG4bK2")
        );
    }

    #[test]
    fn test_remove() {
        let mut headers = Headers::new();
        headers.append(HeaderName::Route, "<sip:p1;lr>");
        headers.append(HeaderName::Route, "<sip:p2;lr>");
        assert_eq!(headers.remove(&HeaderName::Route), 2);
        assert!(!headers.contains(&HeaderName::Route));
    }
}
