use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::headers::{HeaderAccess, HeaderName, Headers};
use crate::types::sip_request::Request;
use crate::types::sip_response::Response;

/// Either side of a SIP exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(r) => Some(r),
            Message::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(r) => Some(r),
            Message::Request(_) => None,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            Message::Request(r) => r.body(),
            Message::Response(r) => r.body(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Message::Request(r) => r.to_bytes(),
            Message::Response(r) => r.to_bytes(),
        }
    }

    /// Short description for log lines
    pub fn summary(&self) -> String {
        match self {
            Message::Request(r) => crate::types::sip_request::summary(r),
            Message::Response(r) => format!(
                "{} {} (Call-ID {})",
                r.status,
                r.reason,
                r.call_id().unwrap_or("-")
            ),
        }
    }
}

impl HeaderAccess for Message {
    fn headers(&self) -> &Headers {
        match self {
            Message::Request(r) => &r.headers,
            Message::Response(r) => &r.headers,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(r) => fmt::Display::fmt(r, f),
            Message::Response(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// Writes the start line, headers and body. Any stored Content-Length is
/// dropped and recomputed from the body.
pub(crate) fn serialize(start_line: String, headers: &Headers, body: &[u8]) -> Vec<u8> {
    let mut out = start_line.into_bytes();
    for header in headers.iter().filter(|h| h.name != HeaderName::ContentLength) {
        out.extend_from_slice(header.to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}
