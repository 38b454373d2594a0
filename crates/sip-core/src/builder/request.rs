use bytes::Bytes;

use crate::builder::{HeaderSlate, DEFAULT_MAX_FORWARDS};
use crate::error::{Error, Result};
use crate::types::address::Address;
use crate::types::headers::{HeaderAccess, HeaderName, Headers};
use crate::types::{CSeq, Event, Method, Request, SubscriptionState, Uri};

/// Builder for SIP requests
///
/// Call-ID and CSeq have no defaults and must be supplied. Max-Forwards
/// defaults to 70.
#[derive(Debug, Clone)]
pub struct SimpleRequestBuilder {
    method: Method,
    uri: Uri,
    slate: HeaderSlate,
    body: Bytes,
}

impl SimpleRequestBuilder {
    /// Starts a request for `method` addressed to `uri`
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri = uri.parse::<Uri>()?;
        Ok(Self::with_uri(method, uri))
    }

    pub fn with_uri(method: Method, uri: Uri) -> Self {
        SimpleRequestBuilder {
            method,
            uri,
            slate: HeaderSlate::default(),
            body: Bytes::new(),
        }
    }

    /// Starts from an existing request, keeping its headers and body
    pub fn from_request(request: Request) -> Self {
        SimpleRequestBuilder {
            method: request.method,
            uri: request.uri,
            slate: HeaderSlate::from_headers(request.headers),
            body: request.body,
        }
    }

    pub fn invite(uri: &str) -> Result<Self> {
        Self::new(Method::Invite, uri)
    }

    pub fn subscribe(uri: &str) -> Result<Self> {
        Self::new(Method::Subscribe, uri)
    }

    pub fn notify(uri: &str) -> Result<Self> {
        Self::new(Method::Notify, uri)
    }

    pub fn bye(uri: &str) -> Result<Self> {
        Self::new(Method::Bye, uri)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// From header; an empty display name is omitted
    pub fn from(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Self {
        self.slate.address(HeaderName::From, display_name, uri, tag);
        self
    }

    pub fn to(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Self {
        self.slate.address(HeaderName::To, display_name, uri, tag);
        self
    }

    pub fn from_address(mut self, address: &Address) -> Self {
        self.slate.headers.set(HeaderName::From, address.to_string());
        self
    }

    pub fn to_address(mut self, address: &Address) -> Self {
        self.slate.headers.set(HeaderName::To, address.to_string());
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.slate.insert(HeaderName::CallId, call_id);
        self
    }

    /// CSeq with this request's method
    pub fn cseq(mut self, seq: u32) -> Self {
        let cseq = CSeq::new(seq, self.method.clone());
        self.slate.insert(HeaderName::CSeq, cseq.to_string());
        self
    }

    /// Adds a Via below any existing ones. `host` may carry a port.
    pub fn via(mut self, host: &str, transport: &str, branch: Option<&str>) -> Self {
        self.slate.via(host, transport, branch);
        self
    }

    /// Contact as a full name-addr, e.g. `<sip:alice@10.0.0.1:5060>;isfocus`
    pub fn contact(mut self, contact: &str) -> Self {
        self.slate.insert(HeaderName::Contact, contact);
        self
    }

    pub fn route(mut self, route: &str) -> Self {
        self.slate.insert(HeaderName::Route, route);
        self
    }

    pub fn record_route(mut self, record_route: &str) -> Self {
        self.slate.insert(HeaderName::RecordRoute, record_route);
        self
    }

    pub fn max_forwards(mut self, hops: u32) -> Self {
        self.slate.insert(HeaderName::MaxForwards, hops.to_string());
        self
    }

    pub fn expires(mut self, seconds: u32) -> Self {
        self.slate.insert(HeaderName::Expires, seconds.to_string());
        self
    }

    pub fn event(mut self, event: &Event) -> Self {
        self.slate.insert(HeaderName::Event, event.to_string());
        self
    }

    pub fn subscription_state(mut self, state: &SubscriptionState) -> Self {
        self.slate.insert(HeaderName::SubscriptionState, state.to_string());
        self
    }

    /// Body with its Content-Type
    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.slate.insert(HeaderName::ContentType, content_type);
        self.body = body.into();
        self
    }

    /// Any header by name; unique kinds replace, repeatable kinds append
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.slate.insert_raw(name, value);
        self
    }

    pub fn remove_header(mut self, name: HeaderName) -> Self {
        self.slate.headers.remove(&name);
        self
    }

    pub fn build(self) -> Result<Request> {
        let mut headers: Headers = self.slate.finish()?;

        if !headers.contains(&HeaderName::CallId) {
            return Err(Error::MissingHeader("Call-ID".to_string()));
        }
        if !headers.contains(&HeaderName::MaxForwards) {
            headers.set(HeaderName::MaxForwards, DEFAULT_MAX_FORWARDS.to_string());
        }

        let request = Request {
            method: self.method,
            uri: self.uri,
            headers,
            body: self.body,
        };

        let cseq = match request.cseq() {
            Ok(cseq) => cseq,
            Err(Error::MissingHeader(_)) => return Err(Error::MissingHeader("CSeq".to_string())),
            Err(e) => return Err(e),
        };
        if cseq.method != request.method {
            return Err(Error::malformed(
                "CSeq",
                cseq.to_string(),
                format!("method does not match request method {}", request.method),
            ));
        }
        Ok(request)
    }
}
