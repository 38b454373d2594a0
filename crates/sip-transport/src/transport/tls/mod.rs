use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustls::ServerName;
use sipunit_sip_core::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, info, warn};

use crate::config::TlsSettings;
use crate::error::{Error, Result};
use crate::transport::stream::StreamConnections;
use crate::transport::udp::DEFAULT_CHANNEL_CAPACITY;
use crate::transport::{Transport, TransportEvent, TransportType};

pub mod config;

/// TLS over TCP transport for SIP messages
#[derive(Clone)]
pub struct TlsTransport {
    inner: Arc<TlsTransportInner>,
}

struct TlsTransportInner {
    connections: Arc<StreamConnections>,
    connector: TlsConnector,
    server_name: Option<String>,
    closed: AtomicBool,
}

impl TlsTransport {
    /// Binds a TLS listener using the certificate and key in `settings`
    pub async fn bind(
        addr: SocketAddr,
        settings: &TlsSettings,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let server_config = config::create_server_config(&settings.cert_path, &settings.key_path)?;
        let client_config = config::create_client_config(settings.ca_path.as_deref())?;

        let listener = TcpListener::bind(addr).await.map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = listener.local_addr().map_err(Error::LocalAddrFailed)?;
        info!("SIP TLS transport bound to {}", local_addr);

        let connections = StreamConnections::new(local_addr, events_tx);
        let acceptor = TlsAcceptor::from(server_config);
        let accept_task = tokio::spawn(accept_loop(listener, acceptor, connections.clone()));
        connections.track(accept_task);

        let transport = TlsTransport {
            inner: Arc::new(TlsTransportInner {
                connections,
                connector: TlsConnector::from(client_config),
                server_name: settings.server_name.clone(),
                closed: AtomicBool::new(false),
            }),
        };
        Ok((transport, events_rx))
    }

    fn server_name_for(&self, destination: SocketAddr) -> Result<ServerName> {
        match &self.inner.server_name {
            Some(name) => ServerName::try_from(name.as_str())
                .map_err(|e| Error::TlsError(format!("invalid server name {}: {}", name, e))),
            None => Ok(ServerName::IpAddress(destination.ip())),
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    connections: Arc<StreamConnections>,
) {
    let mut shutdown_rx = connections.shutdown_signal();
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("TLS accept failed on {}: {}", connections.local_addr(), e);
                    continue;
                }
            },
        };

        // Handshakes run off the accept loop so a slow peer cannot stall it
        let acceptor = acceptor.clone();
        let table = connections.clone();
        let mut stop = connections.shutdown_signal();
        let handshake = tokio::spawn(async move {
            let accepted = tokio::select! {
                _ = stop.changed() => return,
                accepted = acceptor.accept(stream) => accepted,
            };
            match accepted {
                Ok(tls_stream) => {
                    debug!("TLS handshake completed with {}", peer);
                    table.register(tls_stream, peer);
                }
                Err(e) => {
                    warn!("TLS handshake with {} failed: {}", peer, e);
                    let _ = table.events().try_send(TransportEvent::Error {
                        error: format!("TLS handshake with {} failed: {}", peer, e),
                    });
                }
            }
        });
        connections.track(handshake);
    }
    info!("TLS accept loop on {} terminated", connections.local_addr());
}

#[async_trait::async_trait]
impl Transport for TlsTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.connections.local_addr())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Tls
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let connection = match self.inner.connections.get(&destination) {
            Some(connection) => connection,
            None => {
                debug!("Connecting TLS to {}", destination);
                let tcp_stream = TcpStream::connect(destination)
                    .await
                    .map_err(|e| Error::ConnectFailed(destination, e))?;
                let server_name = self.server_name_for(destination)?;
                let tls_stream = self
                    .inner
                    .connector
                    .connect(server_name, tcp_stream)
                    .await
                    .map_err(|e| Error::TlsHandshakeFailed(format!("{}: {}", destination, e)))?;
                self.inner.connections.register(tls_stream, destination)
            }
        };

        debug!("Sending {} to {} over TLS", message.summary(), destination);
        connection.send(&message.to_bytes()).await
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.connections.shutdown().await;
        info!("TLS transport on {} closed", self.inner.connections.local_addr());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TlsTransport({})", self.inner.connections.local_addr())
    }
}
