//! # SIP Request Message
//!
//! A request line, ordered headers and an opaque body.
//!
//! ```text
//! INVITE sip:bob@biloxi.com SIP/2.0
//! Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds
//! ...
//! ```

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::headers::{HeaderAccess, HeaderName, Headers};
use crate::types::method::Method;
use crate::types::uri::Uri;

/// A SIP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            method,
            uri,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Serializes the request. Content-Length always reflects the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!("{} {} SIP/2.0\r\n", self.method, self.uri);
        crate::types::sip_message::serialize(head, &self.headers, &self.body)
    }
}

impl HeaderAccess for Request {
    fn headers(&self) -> &Headers {
        &self.headers
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

/// Short one-line description used in logs
pub(crate) fn summary(request: &Request) -> String {
    format!(
        "{} {} (Call-ID {})",
        request.method,
        request.uri,
        request.headers.get(&HeaderName::CallId).unwrap_or("-")
    )
}
