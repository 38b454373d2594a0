use bytes::Bytes;

use crate::builder::HeaderSlate;
use crate::error::{Error, Result};
use crate::types::address::parse_address;
use crate::types::headers::{HeaderAccess, HeaderName};
use crate::types::param::Param;
use crate::types::{CSeq, Method, Request, Response, StatusCode};

/// Builder for SIP responses
#[derive(Debug, Clone)]
pub struct SimpleResponseBuilder {
    status: StatusCode,
    reason: String,
    slate: HeaderSlate,
    body: Bytes,
}

impl SimpleResponseBuilder {
    /// `reason` defaults to the standard phrase for `status`
    pub fn new(status: StatusCode, reason: Option<&str>) -> Self {
        SimpleResponseBuilder {
            status,
            reason: reason
                .map(str::to_string)
                .unwrap_or_else(|| status.reason_phrase().to_string()),
            slate: HeaderSlate::default(),
            body: Bytes::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK, None)
    }

    /// A response to `request` carrying its Via set, From, To, Call-ID and
    /// CSeq (RFC 3261 Section 8.2.6.2). Record-Route is copied for
    /// dialog-creating requests.
    pub fn response_from_request(
        request: &Request,
        status: StatusCode,
        reason: Option<&str>,
    ) -> Self {
        let mut builder = Self::new(status, reason);
        let mut copied = vec![
            HeaderName::Via,
            HeaderName::From,
            HeaderName::To,
            HeaderName::CallId,
            HeaderName::CSeq,
        ];
        if request.method.creates_dialog() && !status.is_failure() {
            copied.push(HeaderName::RecordRoute);
        }
        for header in request.headers.iter().filter(|h| copied.contains(&h.name)) {
            builder.slate.headers.append(header.name.clone(), header.value.clone());
        }
        builder
    }

    pub fn from(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Self {
        self.slate.address(HeaderName::From, display_name, uri, tag);
        self
    }

    pub fn to(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Self {
        self.slate.address(HeaderName::To, display_name, uri, tag);
        self
    }

    /// Adds or replaces the tag on the To header
    pub fn to_tag(mut self, tag: &str) -> Self {
        let Some(to) = self.slate.headers.get(&HeaderName::To) else {
            self.slate
                .error
                .get_or_insert(Error::malformed("To", "", "no To header to tag"));
            return self;
        };
        match parse_address("To", to) {
            Ok(address) => {
                let address = address.with_param(Param::tag(tag));
                self.slate.headers.set(HeaderName::To, address.to_string());
            }
            Err(e) => {
                self.slate.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.slate.insert(HeaderName::CallId, call_id);
        self
    }

    pub fn cseq(mut self, seq: u32, method: Method) -> Self {
        self.slate.insert(HeaderName::CSeq, CSeq::new(seq, method).to_string());
        self
    }

    pub fn via(mut self, host: &str, transport: &str, branch: Option<&str>) -> Self {
        self.slate.via(host, transport, branch);
        self
    }

    pub fn contact(mut self, contact: &str) -> Self {
        self.slate.insert(HeaderName::Contact, contact);
        self
    }

    pub fn expires(mut self, seconds: u32) -> Self {
        self.slate.insert(HeaderName::Expires, seconds.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.slate.insert_raw(name, value);
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.slate.insert(HeaderName::ContentType, content_type);
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Response> {
        let headers = self.slate.finish()?;
        if !headers.contains(&HeaderName::CallId) {
            return Err(Error::MissingHeader("Call-ID".to_string()));
        }
        if !headers.contains(&HeaderName::CSeq) {
            return Err(Error::MissingHeader("CSeq".to_string()));
        }
        let response = Response {
            status: self.status,
            reason: self.reason,
            headers,
            body: self.body,
        };
        // Surface a malformed copied CSeq here rather than on the wire
        response.cseq()?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SimpleRequestBuilder;

    fn subscribe() -> Request {
        SimpleRequestBuilder::new(Method::Subscribe, "sip:focus@127.0.0.1:5060")
            .unwrap()
            .from("", "sip:alice@127.0.0.1", Some("from-1"))
            .to("", "sip:focus@127.0.0.1", None)
            .call_id("sub-1")
            .cseq(1)
            .via("127.0.0.1:5070", "UDP", Some("z9hG4bKa"))
            .via("127.0.0.1:5080", "UDP", Some("z9hG4bKb"))
            .record_route("<sip:proxy.example.com;lr>")
            .build()
            .unwrap()
    }

    #[test]
    fn test_response_from_request_copies_headers() {
        let req = subscribe();
        let resp = SimpleResponseBuilder::response_from_request(&req, StatusCode::OK, None)
            .to_tag("to-1")
            .contact("<sip:focus@127.0.0.1:5060>;isfocus")
            .expires(3600)
            .build()
            .unwrap();
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.call_id(), Some("sub-1"));
        assert_eq!(resp.cseq().unwrap(), CSeq::new(1, Method::Subscribe));
        assert_eq!(resp.vias().unwrap().len(), 2);
        assert_eq!(resp.branch().as_deref(), Some("z9hG4bKa"));
        assert_eq!(resp.from_tag().as_deref(), Some("from-1"));
        assert_eq!(resp.to_tag().as_deref(), Some("to-1"));
        assert!(resp.contacts().unwrap()[0].has_param("isfocus"));
        assert_eq!(resp.record_routes().unwrap().len(), 1);
        assert_eq!(resp.expires(), Some(3600));
    }

    #[test]
    fn test_custom_reason_and_failure_skips_record_route() {
        let req = subscribe();
        let resp = SimpleResponseBuilder::response_from_request(
            &req,
            StatusCode::BUSY_HERE,
            Some("Busy Now"),
        )
        .build()
        .unwrap();
        assert_eq!(resp.reason, "Busy Now");
        assert!(resp.record_routes().unwrap().is_empty());
    }

    #[test]
    fn test_build_requires_call_id() {
        let err = SimpleResponseBuilder::ok().cseq(1, Method::Invite).build().unwrap_err();
        assert!(matches!(err, Error::MissingHeader(h) if h == "Call-ID"));
    }

    #[test]
    fn test_to_tag_without_to_fails() {
        let err = SimpleResponseBuilder::ok()
            .call_id("c")
            .cseq(1, Method::Invite)
            .to_tag("t")
            .build()
            .unwrap_err();
        assert!(err.is_malformed_header());
    }
}
