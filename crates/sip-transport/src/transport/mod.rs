use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sipunit_sip_core::Message;

use crate::error::{Error, Result};

mod stream;
pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;
pub mod udp;

pub use tcp::TcpTransport;
#[cfg(feature = "tls")]
pub use tls::TlsTransport;
pub use udp::UdpTransport;

/// Transport protocols the harness can listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl TransportType {
    /// Reliable transports do not need retransmission timers
    pub fn is_reliable(&self) -> bool {
        !matches!(self, TransportType::Udp)
    }

    /// Lower-case token for URI `transport=` parameters
    pub fn uri_param(&self) -> &'static str {
        match self {
            TransportType::Udp => "udp",
            TransportType::Tcp => "tcp",
            TransportType::Tls => "tls",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Udp => write!(f, "UDP"),
            TransportType::Tcp => write!(f, "TCP"),
            TransportType::Tls => write!(f, "TLS"),
        }
    }
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(TransportType::Udp),
            "tcp" => Ok(TransportType::Tcp),
            "tls" => Ok(TransportType::Tls),
            other => Err(Error::UnsupportedTransport(other.to_string())),
        }
    }
}

/// Events emitted by a transport's receive tasks
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete SIP message arrived
    MessageReceived {
        /// The parsed message
        message: Message,
        /// Where it came from
        source: SocketAddr,
        /// The local address it arrived on
        destination: SocketAddr,
    },

    /// A non-fatal receive or parse problem
    Error {
        /// Human readable description
        error: String,
    },

    /// The transport stopped receiving
    Closed,
}

/// A bound SIP transport
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// The bound local address
    fn local_addr(&self) -> Result<SocketAddr>;

    fn transport_type(&self) -> TransportType;

    /// Sends `message` to `destination`, connecting first on stream transports
    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()>;

    /// Stops all receive tasks and releases the socket. Returns once the
    /// tasks have exited.
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    fn is_reliable(&self) -> bool {
        self.transport_type().is_reliable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_type_parse() {
        assert_eq!("UDP".parse::<TransportType>().unwrap(), TransportType::Udp);
        assert_eq!(" tls ".parse::<TransportType>().unwrap(), TransportType::Tls);
        assert!(matches!(
            "sctp".parse::<TransportType>(),
            Err(Error::UnsupportedTransport(t)) if t == "sctp"
        ));
    }

    #[test]
    fn test_reliability() {
        assert!(!TransportType::Udp.is_reliable());
        assert!(TransportType::Tcp.is_reliable());
        assert!(TransportType::Tls.is_reliable());
    }
}
