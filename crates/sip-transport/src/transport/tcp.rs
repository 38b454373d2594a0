use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sipunit_sip_core::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::stream::StreamConnections;
use crate::transport::udp::DEFAULT_CHANNEL_CAPACITY;
use crate::transport::{Transport, TransportEvent, TransportType};

/// TCP transport for SIP messages, framed by Content-Length
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<TcpTransportInner>,
}

struct TcpTransportInner {
    connections: Arc<StreamConnections>,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Binds a listener and starts accepting connections
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let listener = TcpListener::bind(addr).await.map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = listener.local_addr().map_err(Error::LocalAddrFailed)?;
        info!("SIP TCP transport bound to {}", local_addr);

        let connections = StreamConnections::new(local_addr, events_tx);
        let accept_task = tokio::spawn(accept_loop(listener, connections.clone()));
        connections.track(accept_task);

        let transport = TcpTransport {
            inner: Arc::new(TcpTransportInner {
                connections,
                closed: AtomicBool::new(false),
            }),
        };
        Ok((transport, events_rx))
    }
}

async fn accept_loop(listener: TcpListener, connections: Arc<StreamConnections>) {
    let mut shutdown_rx = connections.shutdown_signal();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted TCP connection from {}", peer);
                    let _ = stream.set_nodelay(true);
                    connections.register(stream, peer);
                }
                Err(e) => {
                    warn!("TCP accept failed on {}: {}", connections.local_addr(), e);
                    let _ = connections.events().try_send(TransportEvent::Error {
                        error: format!("Accept failed: {}", e),
                    });
                }
            },
        }
    }
    info!("TCP accept loop on {} terminated", connections.local_addr());
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.connections.local_addr())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let connection = match self.inner.connections.get(&destination) {
            Some(connection) => connection,
            None => {
                debug!("Connecting TCP to {}", destination);
                let stream = TcpStream::connect(destination)
                    .await
                    .map_err(|e| Error::ConnectFailed(destination, e))?;
                let _ = stream.set_nodelay(true);
                self.inner.connections.register(stream, destination)
            }
        };

        debug!("Sending {} to {} over TCP", message.summary(), destination);
        connection.send(&message.to_bytes()).await
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.connections.shutdown().await;
        info!("TCP transport on {} closed", self.inner.connections.local_addr());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpTransport({})", self.inner.connections.local_addr())
    }
}
