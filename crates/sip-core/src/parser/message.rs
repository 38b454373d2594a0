//! Whole-message parsing (RFC 3261 Section 7)
//!
//! ```text
//! generic-message = start-line *message-header CRLF [ message-body ]
//! ```
//!
//! The head is parsed line by line after unfolding continuation lines. The
//! body is bounded by Content-Length when present; for datagrams without one
//! the rest of the packet is the body.

use std::str;

use bytes::Bytes;
use nom::{
    bytes::complete::{tag, take_till, take_till1, take_while1, take_while_m_n},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map_res, rest},
    sequence::{terminated, tuple},
    IResult,
};
use tracing::trace;

use crate::error::{Error, Result};
use crate::parser::utils::is_token_char;
use crate::types::headers::{HeaderAccess, HeaderName, Headers};
use crate::types::{Message, Method, Request, Response, StatusCode, Uri};

/// Largest head the framer will buffer before giving up
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

const SIP_VERSION: &str = "SIP/2.0";

/// Request-Line = Method SP Request-URI SP SIP-Version
fn request_line(input: &str) -> IResult<&str, (Method, Uri)> {
    let (input, (method, _, uri, _, _)) = tuple((
        map_res(take_while1(is_token_char), str::parse::<Method>),
        space1,
        map_res(take_till1(|c: char| c == ' ' || c == '\t'), str::parse::<Uri>),
        space1,
        tag(SIP_VERSION),
    ))(input)?;
    Ok((input, (method, uri)))
}

/// Status-Line = SIP-Version SP Status-Code SP Reason-Phrase
fn status_line(input: &str) -> IResult<&str, (StatusCode, String)> {
    let (input, (_, _, code, _, reason)) = tuple((
        tag(SIP_VERSION),
        space1,
        map_res(
            map_res(take_while_m_n(3, 3, |c: char| c.is_ascii_digit()), str::parse::<u16>),
            StatusCode::from_u16,
        ),
        space0,
        rest,
    ))(input)?;
    Ok((input, (code, reason.trim().to_string())))
}

/// message-header = field-name HCOLON field-value
fn header_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, (name, _, _, value)) = tuple((
        terminated(take_while1(is_token_char), space0),
        char(':'),
        space0,
        take_till(|c| c == '\r' || c == '\n'),
    ))(input)?;
    Ok((input, (name, value.trim_end())))
}

/// Byte offset of the blank line ending the head, and the length of the
/// separator (CRLFCRLF or LFLF)
fn find_head_end(data: &[u8]) -> Option<(usize, usize)> {
    let crlf = data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    let lf = data.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Joins folded continuation lines into their header line
fn unfold_lines(head: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in head.split('\n').map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

fn content_length_of(headers: &Headers) -> Result<Option<usize>> {
    match headers.get(&HeaderName::ContentLength) {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::malformed("Content-Length", v, "expected a non-negative integer")),
        None => Ok(None),
    }
}

/// Parses one complete SIP message from `data`
pub fn parse_message(data: &[u8]) -> Result<Message> {
    // Tolerate leading CRLF keep-alives
    let start = data.iter().position(|b| *b != b'\r' && *b != b'\n').unwrap_or(data.len());
    let data = &data[start..];

    let (head_end, sep_len) = find_head_end(data)
        .ok_or_else(|| Error::Incomplete("no blank line after headers".to_string()))?;
    let head = str::from_utf8(&data[..head_end])?;
    let body_bytes = &data[head_end + sep_len..];

    let mut lines = unfold_lines(head).into_iter();
    let start_line = lines
        .next()
        .ok_or_else(|| Error::ParseError("empty message".to_string()))?;

    let mut headers = Headers::new();
    for line in lines {
        let (_, (name, value)) = all_consuming(header_line)(line.as_str())
            .map_err(|_| Error::ParseError(format!("invalid header line '{}'", line)))?;
        let name: HeaderName = name.parse()?;
        headers.append(name, value);
    }

    let body = match content_length_of(&headers)? {
        Some(len) if len > body_bytes.len() => {
            return Err(Error::Incomplete(format!(
                "Content-Length {} but only {} body bytes",
                len,
                body_bytes.len()
            )))
        }
        Some(len) => Bytes::copy_from_slice(&body_bytes[..len]),
        None => Bytes::copy_from_slice(body_bytes),
    };

    let message = if start_line.starts_with(SIP_VERSION) {
        let (_, (status, reason)) = all_consuming(status_line)(start_line.as_str())
            .map_err(|_| Error::ParseError(format!("invalid status line '{}'", start_line)))?;
        Message::Response(Response {
            status,
            reason,
            headers,
            body,
        })
    } else {
        let (_, (method, uri)) = all_consuming(request_line)(start_line.as_str())
            .map_err(|_| Error::ParseError(format!("invalid request line '{}'", start_line)))?;
        Message::Request(Request {
            method,
            uri,
            headers,
            body,
        })
    };

    validate_required(&message)?;
    trace!("Parsed {}", message.summary());
    Ok(message)
}

/// Call-ID, CSeq, From, To and Via must be present and well formed
fn validate_required(message: &Message) -> Result<()> {
    if message.call_id().map_or(true, str::is_empty) {
        return Err(Error::MissingHeader("Call-ID".to_string()));
    }
    let cseq = message.cseq()?;
    message.from()?;
    message.to()?;
    message.top_via()?;
    if let Message::Request(request) = message {
        if cseq.method != request.method {
            return Err(Error::malformed(
                "CSeq",
                cseq.to_string(),
                format!("method does not match request method {}", request.method),
            ));
        }
    }
    Ok(())
}

/// Length of the first complete message in a stream buffer, `None` when more
/// bytes are needed. Streams require Content-Length; its absence means no body.
pub fn frame_length(buffer: &[u8]) -> Result<Option<usize>> {
    let Some((head_end, sep_len)) = find_head_end(buffer) else {
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(Error::ParseError("message head too large".to_string()));
        }
        return Ok(None);
    };
    let head = str::from_utf8(&buffer[..head_end])?;
    let mut content_length = 0usize;
    for line in unfold_lines(head).iter().skip(1) {
        if let Ok((_, (name, value))) = header_line(line) {
            if matches!(name.parse::<HeaderName>(), Ok(HeaderName::ContentLength)) {
                content_length = value.trim().parse().map_err(|_| {
                    Error::malformed("Content-Length", value, "expected a non-negative integer")
                })?;
            }
        }
    }
    let total = (head_end + sep_len).saturating_add(content_length);
    Ok((buffer.len() >= total).then_some(total))
}

/// Number of leading CR/LF keep-alive bytes
pub fn keepalive_prefix(buffer: &[u8]) -> usize {
    buffer.iter().take_while(|b| **b == b'\r' || **b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE: &str = "INVITE sip:bob@biloxi.com SIP/2.0\r\n\
        Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
        Max-Forwards: 70\r\n\
        To: Bob <sip:bob@biloxi.com>\r\n\
        From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
        Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n\
        CSeq: 314159 INVITE\r\n\
        Contact: <sip:alice@pc33.atlanta.com>\r\n\
        Content-Type: application/sdp\r\n\
        Content-Length: 4\r\n\
        \r\n\
        v=0\n";

    #[test]
    fn test_parse_request() {
        let msg = parse_message(INVITE.as_bytes()).unwrap();
        let req = msg.as_request().unwrap();
        assert_eq!(req.method, Method::Invite);
        assert_eq!(req.uri.to_string(), "sip:bob@biloxi.com");
        assert_eq!(req.call_id(), Some("a84b4c76e66710@pc33.atlanta.com"));
        assert_eq!(req.from_tag().as_deref(), Some("1928301774"));
        assert_eq!(req.branch().as_deref(), Some("z9hG4bK776asdhds"));
        assert_eq!(req.body(), b"v=0\n");
    }

    #[test]
    fn test_parse_response_compact_and_folded() {
        let raw = "SIP/2.0 180 Ringing\r\n\
            v: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK1\r\n\
            t: <sip:bob@biloxi.com>\r\n\
            \t;tag=abc\r\n\
            f: <sip:alice@atlanta.com>;tag=xyz\r\n\
            i: call-1\r\n\
            CSeq: 1 INVITE\r\n\
            l: 0\r\n\r\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        let resp = msg.as_response().unwrap();
        assert_eq!(resp.status, StatusCode::RINGING);
        assert_eq!(resp.reason, "Ringing");
        assert_eq!(resp.to_tag().as_deref(), Some("abc"));
        assert_eq!(resp.call_id(), Some("call-1"));
    }

    #[test]
    fn test_missing_required_header() {
        let raw = INVITE.replace("Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n", "");
        assert!(matches!(
            parse_message(raw.as_bytes()),
            Err(Error::MissingHeader(h)) if h == "Call-ID"
        ));
    }

    #[test]
    fn test_cseq_method_mismatch() {
        let raw = INVITE.replace("CSeq: 314159 INVITE", "CSeq: 314159 BYE");
        assert!(parse_message(raw.as_bytes()).unwrap_err().is_malformed_header());
    }

    #[test]
    fn test_short_body_is_incomplete() {
        let raw = INVITE.replace("Content-Length: 4", "Content-Length: 40");
        assert!(matches!(parse_message(raw.as_bytes()), Err(Error::Incomplete(_))));
    }

    #[test]
    fn test_frame_length() {
        let bytes = INVITE.as_bytes();
        assert_eq!(frame_length(&bytes[..20]).unwrap(), None);
        assert_eq!(frame_length(&bytes[..bytes.len() - 1]).unwrap(), None);
        assert_eq!(frame_length(bytes).unwrap(), Some(bytes.len()));

        let mut two = bytes.to_vec();
        two.extend_from_slice(bytes);
        assert_eq!(frame_length(&two).unwrap(), Some(bytes.len()));
    }

    #[test]
    fn test_bad_status_line() {
        let raw = "SIP/2.0 9999 Nope\r\nCall-ID: x\r\n\r\n";
        assert!(parse_message(raw.as_bytes()).is_err());
    }
}
