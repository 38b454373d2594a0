//! SIP transports for the sipunit harness
//!
//! UDP, TCP and TLS transports behind one [`Transport`] trait. Each bound
//! transport delivers parsed messages as [`TransportEvent`]s on an `mpsc`
//! channel and releases its socket when [`Transport::close`] returns.

pub mod config;
pub mod error;
pub mod factory;
pub mod transport;

pub use config::TlsSettings;
pub use error::{Error, Result};
pub use factory::bind_transport;
pub use transport::{TcpTransport, Transport, TransportEvent, TransportType, UdpTransport};
#[cfg(feature = "tls")]
pub use transport::TlsTransport;

/// Bind a UDP transport to the specified address
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Bind a TCP transport to the specified address
pub async fn bind_tcp(
    addr: std::net::SocketAddr,
) -> Result<(TcpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    TcpTransport::bind(addr, None).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        bind_tcp, bind_transport, bind_udp, Error, Result, TcpTransport, TlsSettings, Transport,
        TransportEvent, TransportType, UdpTransport,
    };
}
