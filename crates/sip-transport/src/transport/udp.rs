use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sipunit_sip_core::Message;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportType};

// Default channel capacity
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 100;
// Maximum UDP payload
const MAX_UDP_PACKET_SIZE: usize = 65_507;

/// UDP transport for SIP messages
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    local_addr: SocketAddr,
    // Dropped on close so the port is released
    socket: Mutex<Option<Arc<UdpSocket>>>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Creates a new UDP transport bound to the specified address
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let socket = UdpSocket::bind(addr).await.map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = socket.local_addr().map_err(Error::LocalAddrFailed)?;
        let socket = Arc::new(socket);
        info!("SIP UDP transport bound to {}", local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(receive_loop(socket.clone(), local_addr, events_tx, shutdown_rx));

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                local_addr,
                socket: Mutex::new(Some(socket)),
                closed: AtomicBool::new(false),
                shutdown_tx,
                receive_task: Mutex::new(Some(task)),
            }),
        };

        Ok((transport, events_rx))
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.inner.socket.lock().clone().ok_or(Error::TransportClosed)
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    events_tx: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buffer = vec![0u8; MAX_UDP_PACKET_SIZE];

    loop {
        let (len, source) = tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = socket.recv_from(&mut buffer) => match result {
                Ok(received) => received,
                Err(e) => {
                    // ICMP errors surface here on some platforms; keep listening
                    warn!("Error receiving UDP packet on {}: {}", local_addr, e);
                    let _ = events_tx.try_send(TransportEvent::Error {
                        error: format!("Error receiving packet: {}", e),
                    });
                    continue;
                }
            },
        };

        trace!("Received {} bytes from {}", len, source);

        let event = match sipunit_sip_core::parse_message(&buffer[..len]) {
            Ok(message) => {
                debug!("Received {} from {}", message.summary(), source);
                TransportEvent::MessageReceived {
                    message,
                    source,
                    destination: local_addr,
                }
            }
            Err(e) => {
                warn!("Error parsing SIP message from {}: {}", source, e);
                TransportEvent::Error {
                    error: format!("Error parsing SIP message from {}: {}", source, e),
                }
            }
        };

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            sent = events_tx.send(event) => {
                if sent.is_err() {
                    error!("Transport event receiver dropped, stopping UDP receive loop");
                    break;
                }
            }
        }
    }

    let _ = events_tx.try_send(TransportEvent::Closed);
    info!("UDP receive loop on {} terminated", local_addr);
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Udp
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let bytes = message.to_bytes();
        if bytes.len() > MAX_UDP_PACKET_SIZE {
            return Err(Error::MessageTooLarge(bytes.len()));
        }

        debug!("Sending {} to {} over UDP", message.summary(), destination);
        let sent = self
            .socket()?
            .send_to(&bytes, destination)
            .await
            .map_err(|e| Error::SendFailed(destination, e))?;
        trace!("Sent {} of {} bytes to {}", sent, bytes.len(), destination);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown_tx.send_replace(true);
        let task = self.inner.receive_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("UDP receive task ended abnormally: {}", e);
            }
        }
        self.inner.socket.lock().take();
        info!("UDP transport on {} closed", self.inner.local_addr);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UdpTransport({})", self.inner.local_addr)
    }
}
