use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::method::Method;

/// CSeq header value: sequence number plus method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        CSeq { seq, method }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let mut parts = raw.split_whitespace();
        let (seq, method) = match (parts.next(), parts.next(), parts.next()) {
            (Some(seq), Some(method), None) => (seq, method),
            _ => return Err(Error::malformed("CSeq", raw, "expected '<number> <method>'")),
        };
        // RFC 3261 limits the sequence number to 2**31 - 1
        let seq = seq
            .parse::<u32>()
            .ok()
            .filter(|n| *n < 1 << 31)
            .ok_or_else(|| {
                Error::malformed("CSeq", raw, "sequence number is not a 31-bit integer")
            })?;
        let method = method
            .parse::<Method>()
            .map_err(|_| Error::malformed("CSeq", raw, "invalid method"))?;
        Ok(CSeq { seq, method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cseq_parse() {
        let cseq: CSeq = " 314159 INVITE ".parse().unwrap();
        assert_eq!(cseq, CSeq::new(314159, Method::Invite));
        assert_eq!(cseq.to_string(), "314159 INVITE");
    }

    #[test]
    fn test_cseq_rejects_garbage() {
        for bad in ["INVITE", "abc INVITE", "1 INVITE extra", "-1 BYE", "4294967295 BYE"] {
            assert!(bad.parse::<CSeq>().unwrap_err().is_malformed_header());
        }
    }
}
