use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::TlsSettings;
use crate::error::{Error, Result};
use crate::transport::{TcpTransport, Transport, TransportEvent, TransportType, UdpTransport};

/// Binds a transport of the requested type behind the `Transport` trait
///
/// TLS requires `tls` settings; they are ignored for the other types.
pub async fn bind_transport(
    transport_type: TransportType,
    addr: SocketAddr,
    tls: Option<&TlsSettings>,
    channel_capacity: Option<usize>,
) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
    debug!("Binding {} transport on {}", transport_type, addr);
    match transport_type {
        TransportType::Udp => {
            let (transport, rx) = UdpTransport::bind(addr, channel_capacity).await?;
            Ok((Arc::new(transport), rx))
        }
        TransportType::Tcp => {
            let (transport, rx) = TcpTransport::bind(addr, channel_capacity).await?;
            Ok((Arc::new(transport), rx))
        }
        TransportType::Tls => bind_tls(addr, tls, channel_capacity).await,
    }
}

#[cfg(feature = "tls")]
async fn bind_tls(
    addr: SocketAddr,
    tls: Option<&TlsSettings>,
    channel_capacity: Option<usize>,
) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
    let settings = tls.ok_or_else(|| {
        Error::TlsCertificateError("TLS transport requires a certificate and key".to_string())
    })?;
    let (transport, rx) =
        crate::transport::TlsTransport::bind(addr, settings, channel_capacity).await?;
    Ok((Arc::new(transport), rx))
}

#[cfg(not(feature = "tls"))]
async fn bind_tls(
    _addr: SocketAddr,
    _tls: Option<&TlsSettings>,
    _channel_capacity: Option<usize>,
) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
    Err(Error::UnsupportedTransport(
        "tls (built without the `tls` feature)".to_string(),
    ))
}
