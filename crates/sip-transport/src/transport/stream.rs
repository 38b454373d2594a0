//! Connection table and framing shared by the TCP and TLS transports.
//!
//! Every connection, accepted or initiated, is split into a read half driven
//! by its own task and a write half stored in the table under the peer
//! address. Responses to a request therefore leave on the connection the
//! request arrived on.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use dashmap::DashMap;
use parking_lot::Mutex;
use sipunit_sip_core::{frame_length, parse_message, parser::keepalive_prefix};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::transport::TransportEvent;

const READ_CHUNK_SIZE: usize = 8192;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half of one connection
pub(crate) struct StreamConnection {
    peer_addr: SocketAddr,
    writer: AsyncMutex<BoxedWriter>,
}

impl StreamConnection {
    pub(crate) async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(bytes)
            .await
            .map_err(|e| Error::SendFailed(self.peer_addr, e))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::SendFailed(self.peer_addr, e))?;
        trace!("Sent {} bytes to {}", bytes.len(), self.peer_addr);
        Ok(())
    }

    async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Shared state of a stream transport
pub(crate) struct StreamConnections {
    local_addr: SocketAddr,
    connections: DashMap<SocketAddr, Arc<StreamConnection>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events_tx: mpsc::Sender<TransportEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl StreamConnections {
    pub(crate) fn new(
        local_addr: SocketAddr,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(StreamConnections {
            local_addr,
            connections: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
            events_tx,
            shutdown_tx,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn get(&self, peer: &SocketAddr) -> Option<Arc<StreamConnection>> {
        self.connections.get(peer).map(|c| c.value().clone())
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub(crate) fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    pub(crate) fn events(&self) -> &mpsc::Sender<TransportEvent> {
        &self.events_tx
    }

    /// Registers a connected stream and starts reading from it
    pub(crate) fn register<S>(
        self: &Arc<Self>,
        stream: S,
        peer_addr: SocketAddr,
    ) -> Arc<StreamConnection>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let connection = Arc::new(StreamConnection {
            peer_addr,
            writer: AsyncMutex::new(Box::new(writer)),
        });
        self.connections.insert(peer_addr, connection.clone());
        debug!("Registered stream connection {} <-> {}", self.local_addr, peer_addr);

        let table = self.clone();
        let shutdown_rx = self.shutdown_signal();
        let task = tokio::spawn(async move {
            table.read_loop(reader, peer_addr, shutdown_rx).await;
            table.connections.remove(&peer_addr);
        });
        self.track(task);
        connection
    }

    async fn read_loop<R>(
        &self,
        mut reader: R,
        peer_addr: SocketAddr,
        mut shutdown_rx: watch::Receiver<bool>,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);
        if *shutdown_rx.borrow() {
            return;
        }

        loop {
            let read = tokio::select! {
                _ = shutdown_rx.changed() => return,
                read = reader.read_buf(&mut buffer) => read,
            };

            match read {
                Ok(0) => {
                    debug!("Connection closed by peer {}", peer_addr);
                    return;
                }
                Ok(n) => trace!("Read {} bytes from {}", n, peer_addr),
                Err(e) => {
                    debug!("Read error from {}: {}", peer_addr, e);
                    return;
                }
            }

            loop {
                let keepalive = keepalive_prefix(&buffer);
                if keepalive > 0 {
                    let _ = buffer.split_to(keepalive);
                }
                let frame = match frame_length(&buffer) {
                    Ok(Some(len)) => buffer.split_to(len),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Unframeable data from {}, dropping connection: {}", peer_addr, e);
                        let _ = self
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Framing error from {}: {}", peer_addr, e),
                            })
                            .await;
                        return;
                    }
                };

                let event = match parse_message(&frame) {
                    Ok(message) => {
                        debug!("Received {} from {}", message.summary(), peer_addr);
                        TransportEvent::MessageReceived {
                            message,
                            source: peer_addr,
                            destination: self.local_addr,
                        }
                    }
                    Err(e) => {
                        warn!("Error parsing SIP message from {}: {}", peer_addr, e);
                        TransportEvent::Error {
                            error: format!("Error parsing SIP message from {}: {}", peer_addr, e),
                        }
                    }
                };

                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    sent = self.events_tx.send(event) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Signals every task to stop, waits for them and closes all connections
    pub(crate) async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Stream task ended abnormally: {}", e);
            }
        }
        let connections: Vec<Arc<StreamConnection>> =
            self.connections.iter().map(|c| c.value().clone()).collect();
        self.connections.clear();
        for connection in connections {
            connection.shutdown().await;
        }
        let _ = self.events_tx.try_send(TransportEvent::Closed);
    }
}
