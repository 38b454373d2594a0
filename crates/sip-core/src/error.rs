use thiserror::Error;

/// Result type for SIP message operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building, parsing or inspecting SIP messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A header value could not be parsed for its header kind
    #[error("Malformed {header} header '{value}': {reason}")]
    MalformedHeader {
        /// Canonical header name
        header: String,
        /// The offending raw value
        value: String,
        /// What was wrong with it
        reason: String,
    },

    /// A header required by RFC 3261 was not supplied
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The URI could not be parsed
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// The method token is not a valid SIP method
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Status code outside 100..=699
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Start line or header block could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Fewer bytes available than the message announces
    #[error("Incomplete message: {0}")]
    Incomplete(String),
}

impl Error {
    /// Shorthand for [`Error::MalformedHeader`]
    pub fn malformed(
        header: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::MalformedHeader {
            header: header.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by a bad header value
    pub fn is_malformed_header(&self) -> bool {
        matches!(self, Error::MalformedHeader { .. } | Error::InvalidUri(_))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Self {
        Error::ParseError(format!("invalid UTF-8 in message head: {}", e))
    }
}
