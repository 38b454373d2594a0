use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A type alias for handling `Result`s with `Error` values
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the SIP transport layer
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to bind to the specified address
    #[error("Failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, io::Error),

    /// Failed to connect to the specified address
    #[error("Failed to connect to {0}: {1}")]
    ConnectFailed(SocketAddr, io::Error),

    /// Failed to send a message
    #[error("Failed to send message to {0}: {1}")]
    SendFailed(SocketAddr, io::Error),

    /// Failed to receive a message
    #[error("Failed to receive message: {0}")]
    ReceiveFailed(io::Error),

    /// Failed to get the local address
    #[error("Failed to get local address: {0}")]
    LocalAddrFailed(io::Error),

    /// The transport has been closed
    #[error("Transport closed")]
    TransportClosed,

    /// The peer closed the connection
    #[error("Connection closed by peer: {0}")]
    ConnectionClosedByPeer(SocketAddr),

    /// General TLS failure
    #[error("TLS error: {0}")]
    TlsError(String),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// Certificate or key material could not be loaded
    #[error("TLS certificate error: {0}")]
    TlsCertificateError(String),

    /// Message too large for the transport
    #[error("Message too large for transport ({0} bytes)")]
    MessageTooLarge(usize),

    /// The bytes on the wire were not a SIP message
    #[error("Failed to parse message: {0}")]
    ParseError(String),

    /// The requested transport is not compiled in or not known
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl From<sipunit_sip_core::Error> for Error {
    fn from(e: sipunit_sip_core::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}
