use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::utils::is_token_char;

/// SIP header names
///
/// Header names are case-insensitive on the wire. Known headers keep their
/// canonical capitalization; anything else is carried in `Other` as received.
///
/// ```rust
/// use sipunit_sip_core::HeaderName;
///
/// assert_eq!("f".parse::<HeaderName>().unwrap(), HeaderName::From);
/// assert_eq!("call-id".parse::<HeaderName>().unwrap(), HeaderName::CallId);
/// assert!(HeaderName::Via.is_repeatable());
/// ```
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub enum HeaderName {
    CallId,
    CSeq,
    From,
    To,
    Via,
    Contact,
    MaxForwards,
    Expires,
    Event,
    SubscriptionState,
    ContentType,
    ContentLength,
    Route,
    RecordRoute,
    Allow,
    Supported,
    UserAgent,
    Server,
    Subject,
    AllowEvents,
    Other(String),
}

impl HeaderName {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::Via => "Via",
            HeaderName::Contact => "Contact",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::Expires => "Expires",
            HeaderName::Event => "Event",
            HeaderName::SubscriptionState => "Subscription-State",
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::Route => "Route",
            HeaderName::RecordRoute => "Record-Route",
            HeaderName::Allow => "Allow",
            HeaderName::Supported => "Supported",
            HeaderName::UserAgent => "User-Agent",
            HeaderName::Server => "Server",
            HeaderName::Subject => "Subject",
            HeaderName::AllowEvents => "Allow-Events",
            HeaderName::Other(name) => name,
        }
    }

    /// Headers that may appear at most once. Setting one replaces any
    /// existing value.
    pub fn is_unique(&self) -> bool {
        matches!(
            self,
            HeaderName::CallId
                | HeaderName::CSeq
                | HeaderName::From
                | HeaderName::To
                | HeaderName::Contact
                | HeaderName::MaxForwards
                | HeaderName::Expires
                | HeaderName::Event
                | HeaderName::SubscriptionState
                | HeaderName::ContentType
                | HeaderName::ContentLength
                | HeaderName::Subject
        )
    }

    /// Headers whose values accumulate (Via, Route, Record-Route and any
    /// unknown header)
    pub fn is_repeatable(&self) -> bool {
        !self.is_unique()
    }

    /// Checks that `value` is well formed for this header kind.
    /// Unknown headers accept any value without line breaks.
    pub fn validate(&self, value: &str) -> Result<()> {
        use crate::types::{Address, CSeq, Event, SubscriptionState, Via};

        if value.contains('\r') || value.contains('\n') {
            return Err(Error::malformed(self.as_str(), value, "line break in header value"));
        }
        match self {
            HeaderName::From | HeaderName::To => {
                crate::types::address::parse_address(self.as_str(), value).map(|_| ())
            }
            HeaderName::Contact => {
                // "*" is only legal in REGISTER but is syntactically valid
                if value.trim() == "*" {
                    Ok(())
                } else {
                    Address::parse_list(self.as_str(), value).map(|_| ())
                }
            }
            HeaderName::Route | HeaderName::RecordRoute => {
                Address::parse_list(self.as_str(), value).map(|_| ())
            }
            HeaderName::Via => Via::parse_list(value).map(|_| ()),
            HeaderName::CSeq => value.parse::<CSeq>().map(|_| ()),
            HeaderName::Event => value.parse::<Event>().map(|_| ()),
            HeaderName::SubscriptionState => value.parse::<SubscriptionState>().map(|_| ()),
            HeaderName::Expires | HeaderName::MaxForwards | HeaderName::ContentLength => {
                value.trim().parse::<u32>().map(|_| ()).map_err(|_| {
                    Error::malformed(self.as_str(), value, "expected a non-negative integer")
                })
            }
            HeaderName::CallId => {
                if value.trim().is_empty() || value.trim().contains(char::is_whitespace) {
                    Err(Error::malformed(self.as_str(), value, "Call-ID must be a single word"))
                } else {
                    Ok(())
                }
            }
            HeaderName::ContentType => {
                if value.contains('/') {
                    Ok(())
                } else {
                    Err(Error::malformed(self.as_str(), value, "expected type/subtype"))
                }
            }
            _ => Ok(()),
        }
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HeaderName::Other(a), HeaderName::Other(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl Hash for HeaderName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            HeaderName::Other(name) => name.to_ascii_lowercase().hash(state),
            known => std::mem::discriminant(known).hash(state),
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.is_empty() || !name.chars().all(is_token_char) {
            return Err(Error::ParseError(format!("invalid header name '{}'", s)));
        }
        let header = match name.to_ascii_lowercase().as_str() {
            "call-id" | "i" => HeaderName::CallId,
            "cseq" => HeaderName::CSeq,
            "from" | "f" => HeaderName::From,
            "to" | "t" => HeaderName::To,
            "via" | "v" => HeaderName::Via,
            "contact" | "m" => HeaderName::Contact,
            "max-forwards" => HeaderName::MaxForwards,
            "expires" => HeaderName::Expires,
            "event" | "o" => HeaderName::Event,
            "subscription-state" => HeaderName::SubscriptionState,
            "content-type" | "c" => HeaderName::ContentType,
            "content-length" | "l" => HeaderName::ContentLength,
            "route" => HeaderName::Route,
            "record-route" => HeaderName::RecordRoute,
            "allow" => HeaderName::Allow,
            "supported" | "k" => HeaderName::Supported,
            "user-agent" => HeaderName::UserAgent,
            "server" => HeaderName::Server,
            "subject" | "s" => HeaderName::Subject,
            "allow-events" | "u" => HeaderName::AllowEvents,
            _ => HeaderName::Other(name.to_string()),
        };
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_forms() {
        let pairs = [
            ("i", HeaderName::CallId),
            ("f", HeaderName::From),
            ("t", HeaderName::To),
            ("v", HeaderName::Via),
            ("m", HeaderName::Contact),
            ("l", HeaderName::ContentLength),
            ("c", HeaderName::ContentType),
            ("o", HeaderName::Event),
            ("u", HeaderName::AllowEvents),
            ("k", HeaderName::Supported),
            ("s", HeaderName::Subject),
        ];
        for (compact, full) in pairs {
            assert_eq!(compact.parse::<HeaderName>().unwrap(), full);
        }
    }

    #[test]
    fn test_other_is_case_insensitive() {
        let a: HeaderName = "X-Test".parse().unwrap();
        let b: HeaderName = "x-test".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "X-Test");
    }

    #[test]
    fn test_validate() {
        assert!(HeaderName::CSeq.validate("1 INVITE").is_ok());
        assert!(HeaderName::CSeq.validate("one INVITE").is_err());
        assert!(HeaderName::Expires.validate("3600").is_ok());
        assert!(HeaderName::Expires.validate("soon").is_err());
        assert!(HeaderName::To.validate("<sip:bob@b.com>;tag=1").is_ok());
        assert!(HeaderName::To.validate("<bob").is_err());
        assert!(HeaderName::Other("X-Any".into()).validate("anything").is_ok());
    }
}
