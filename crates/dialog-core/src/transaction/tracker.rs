//! Client and server transaction tracking
//!
//! The tracker sits between a phone and its stack's shared transport. Each
//! client transaction owns a response queue that [`wait_response`] drains in
//! arrival order, plus a timer task that retransmits over UDP and marks the
//! transaction timed out after 64·T1. Server transactions remember the last
//! response so retransmitted requests are answered without reaching the
//! application.
//!
//! [`wait_response`]: TransactionTracker::wait_response

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use sipunit_sip_core::{HeaderAccess, HeaderName, Message, Method, Request, Response};
use sipunit_sip_transport::Transport;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use super::{TimerSettings, TransactionKey, TransactionState};
use crate::dialog::DialogId;
use crate::errors::{TransactionError, TransactionResult};
use crate::events::EventQueue;

/// Result of feeding a received request to the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerRequestOutcome {
    /// A new server transaction; hand the request to the application
    New(TransactionKey),
    /// A retransmission; the last response (if any) was sent again
    Retransmission(TransactionKey),
    /// ACK for a non-2xx final, consumed by the INVITE transaction
    AckAbsorbed(TransactionKey),
    /// ACK for a 2xx; it belongs to the dialog, not a transaction
    Ack,
}

struct ClientTransaction {
    key: TransactionKey,
    request: Request,
    destination: SocketAddr,
    dialog_id: Option<DialogId>,
    state: Mutex<TransactionState>,
    responses: EventQueue<Response>,
    stop_tx: watch::Sender<bool>,
    timer_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientTransaction {
    fn stop_timers(&self) {
        self.stop_tx.send_replace(true);
    }
}

struct ServerTransaction {
    request: Request,
    source: SocketAddr,
    state: Mutex<TransactionState>,
    last_response: Mutex<Option<Response>>,
}

/// Tracks the transactions of one user agent
pub struct TransactionTracker {
    transport: Arc<dyn Transport>,
    settings: TimerSettings,
    clients: DashMap<TransactionKey, Arc<ClientTransaction>>,
    servers: DashMap<TransactionKey, Arc<ServerTransaction>>,
}

impl TransactionTracker {
    pub fn new(transport: Arc<dyn Transport>, settings: TimerSettings) -> Self {
        TransactionTracker {
            transport,
            settings,
            clients: DashMap::new(),
            servers: DashMap::new(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    /// Sends a request and starts a client transaction for it
    ///
    /// Returns as soon as the transport accepted the message. A transport
    /// failure is returned as [`TransactionError::Send`] and nothing is
    /// retried.
    pub async fn send_request(
        &self,
        request: Request,
        destination: SocketAddr,
        dialog_id: Option<DialogId>,
    ) -> TransactionResult<TransactionKey> {
        if request.method() == &Method::Ack {
            return Err(TransactionError::InvalidRequest(
                "ACK does not start a transaction".to_string(),
            ));
        }
        let key = TransactionKey::for_client_request(&request)
            .ok_or(TransactionError::MissingBranch)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let transaction = Arc::new(ClientTransaction {
            key: key.clone(),
            request: request.clone(),
            destination,
            dialog_id,
            state: Mutex::new(TransactionState::Trying),
            responses: EventQueue::new(),
            stop_tx,
            timer_task: Mutex::new(None),
        });
        // Registered before sending so a fast response is not treated as stray
        self.clients.insert(key.clone(), transaction.clone());

        debug!("Sending {} to {} (transaction {})", request.method(), destination, key);
        if let Err(source) = self.transport.send_message(request.into(), destination).await {
            self.clients.remove(&key);
            return Err(TransactionError::Send {
                what: format!("{} request", key.method),
                source,
            });
        }

        let task = tokio::spawn(run_client_timers(
            transaction.clone(),
            self.transport.clone(),
            self.settings,
            stop_rx,
        ));
        *transaction.timer_task.lock() = Some(task);
        Ok(key)
    }

    /// Waits up to `timeout` for the next response on a client transaction
    ///
    /// Each call consumes exactly one response. `None` on timeout or for an
    /// unknown key.
    pub async fn wait_response(&self, key: &TransactionKey, timeout: Duration) -> Option<Response> {
        let transaction = match self.clients.get(key) {
            Some(entry) => entry.value().clone(),
            None => {
                warn!("wait_response on unknown transaction {}", key);
                return None;
            }
        };
        let response = transaction.responses.wait(timeout).await;
        if response.is_none() {
            debug!("No response on {} within {:?}", key, timeout);
        }
        response
    }

    /// Routes a received response to its client transaction
    ///
    /// Returns `false` when no transaction of this tracker matches. Sends
    /// the hop-by-hop ACK for non-2xx finals to INVITE.
    pub async fn on_response(&self, response: Response) -> bool {
        let Some(key) = TransactionKey::for_response(&response) else {
            return false;
        };
        let Some(transaction) = self.clients.get(&key).map(|entry| entry.value().clone()) else {
            return false;
        };

        let status = response.status();
        let needs_ack = key.is_invite() && status.is_failure();
        let deliver = {
            let mut state = transaction.state.lock();
            if state.has_final_response() {
                false
            } else if status.is_provisional() {
                *state = TransactionState::Proceeding;
                true
            } else {
                *state = if key.is_invite() && status.is_success() {
                    TransactionState::Terminated
                } else {
                    TransactionState::Completed
                };
                true
            }
        };

        if status.is_final() || key.is_invite() {
            transaction.stop_timers();
        }

        if needs_ack {
            let ack = ack_for_non_2xx(&transaction.request, &response);
            if let Err(e) = self.transport.send_message(ack.into(), transaction.destination).await {
                warn!("Failed to ACK {} on {}: {}", status, key, e);
            }
        }

        if deliver {
            trace!("Queued {} on {}", status, key);
            transaction.responses.push(response);
        } else {
            debug!("Dropped {} on {}: final response already received", status, key);
        }
        true
    }

    /// Feeds a received request through server transaction matching
    pub async fn on_request(
        &self,
        request: &Request,
        source: SocketAddr,
    ) -> TransactionResult<ServerRequestOutcome> {
        let key = TransactionKey::for_server_request(request)
            .ok_or(TransactionError::MissingBranch)?;

        if request.method() == &Method::Ack {
            if let Some(transaction) = self.servers.get(&key).map(|entry| entry.value().clone()) {
                let mut state = transaction.state.lock();
                if *state == TransactionState::Completed {
                    *state = TransactionState::Terminated;
                    debug!("ACK absorbed by {}", key);
                    return Ok(ServerRequestOutcome::AckAbsorbed(key));
                }
            }
            return Ok(ServerRequestOutcome::Ack);
        }

        if let Some(transaction) = self.servers.get(&key).map(|entry| entry.value().clone()) {
            let last = transaction.last_response.lock().clone();
            if let Some(response) = last {
                debug!(
                    "Retransmitted {} on {}, resending {}",
                    request.method(),
                    key,
                    response.status()
                );
                let sent = self.transport.send_message(response.into(), transaction.source).await;
                if let Err(e) = sent {
                    warn!("Failed to resend response on {}: {}", key, e);
                }
            }
            return Ok(ServerRequestOutcome::Retransmission(key));
        }

        self.servers.insert(
            key.clone(),
            Arc::new(ServerTransaction {
                request: request.clone(),
                source,
                state: Mutex::new(TransactionState::Trying),
                last_response: Mutex::new(None),
            }),
        );
        debug!("New server transaction {} from {}", key, source);
        Ok(ServerRequestOutcome::New(key))
    }

    /// Sends a response on a server transaction
    pub async fn send_reply(
        &self,
        key: &TransactionKey,
        response: Response,
    ) -> TransactionResult<()> {
        let transaction = self
            .servers
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransactionError::NotFound(key.clone()))?;

        let status = response.status();
        {
            let mut state = transaction.state.lock();
            if state.has_final_response() {
                return Err(TransactionError::DuplicateFinalResponse(key.clone()));
            }
            *state = if status.is_provisional() {
                TransactionState::Proceeding
            } else if key.is_invite() && status.is_success() {
                TransactionState::Terminated
            } else {
                TransactionState::Completed
            };
        }
        *transaction.last_response.lock() = Some(response.clone());

        debug!("Sending {} on {} to {}", status, key, transaction.source);
        self.transport
            .send_message(response.into(), transaction.source)
            .await
            .map_err(|source| {
                *transaction.state.lock() = TransactionState::Errored;
                TransactionError::Send {
                    what: format!("{} response", status),
                    source,
                }
            })
    }

    /// Sends a message outside any transaction (ACK to a 2xx)
    pub async fn send_stateless(
        &self,
        message: impl Into<Message>,
        destination: SocketAddr,
    ) -> TransactionResult<()> {
        let message = message.into();
        let what = message.summary();
        debug!("Sending {} statelessly to {}", what, destination);
        self.transport
            .send_message(message, destination)
            .await
            .map_err(|source| TransactionError::Send { what, source })
    }

    pub fn state(&self, key: &TransactionKey) -> Option<TransactionState> {
        if key.is_server {
            self.servers.get(key).map(|entry| *entry.state.lock())
        } else {
            self.clients.get(key).map(|entry| *entry.state.lock())
        }
    }

    /// The request that started a client transaction
    pub fn client_request(&self, key: &TransactionKey) -> Option<Request> {
        self.clients.get(key).map(|entry| entry.request.clone())
    }

    /// Where a client transaction's request was sent
    pub fn client_destination(&self, key: &TransactionKey) -> Option<SocketAddr> {
        self.clients.get(key).map(|entry| entry.destination)
    }

    /// The dialog a client transaction was sent in, if any
    pub fn dialog_for(&self, key: &TransactionKey) -> Option<DialogId> {
        self.clients.get(key).and_then(|entry| entry.dialog_id.clone())
    }

    /// The request that created a server transaction
    pub fn server_request(&self, key: &TransactionKey) -> Option<Request> {
        self.servers.get(key).map(|entry| entry.request.clone())
    }

    /// Whether this tracker owns the client transaction a response answers
    pub fn owns_response(&self, response: &Response) -> bool {
        TransactionKey::for_response(response)
            .map(|key| self.clients.contains_key(&key))
            .unwrap_or(false)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Stops every timer, wakes pending waiters and forgets all transactions
    pub async fn shutdown(&self) {
        let clients: Vec<Arc<ClientTransaction>> =
            self.clients.iter().map(|entry| entry.value().clone()).collect();
        for transaction in &clients {
            transaction.stop_timers();
            transaction.responses.close();
        }
        for transaction in clients {
            let task = transaction.timer_task.lock().take();
            if let Some(task) = task {
                if let Err(e) = task.await {
                    warn!("Timer task for {} ended abnormally: {}", transaction.key, e);
                }
            }
        }
        self.clients.clear();
        self.servers.clear();
    }
}

impl std::fmt::Debug for TransactionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTracker")
            .field("transport", &self.transport)
            .field("clients", &self.clients.len())
            .field("servers", &self.servers.len())
            .finish()
    }
}

/// Timer A/E retransmission and Timer B/F timeout for one client transaction
async fn run_client_timers(
    transaction: Arc<ClientTransaction>,
    transport: Arc<dyn Transport>,
    settings: TimerSettings,
    mut stop_rx: watch::Receiver<bool>,
) {
    let invite = transaction.key.is_invite();
    let retransmit = !transport.is_reliable();
    let deadline = Instant::now() + settings.transaction_timeout();
    let mut interval = settings.t1;
    let mut next_retransmit = Instant::now() + interval;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = sleep_until(deadline) => {
                let mut state = transaction.state.lock();
                if !state.has_final_response() {
                    warn!("Transaction {} timed out", transaction.key);
                    *state = TransactionState::TimedOut;
                }
                return;
            }
            _ = sleep_until(next_retransmit), if retransmit => {
                let proceeding = *transaction.state.lock() == TransactionState::Proceeding;
                interval = if proceeding {
                    settings.t2
                } else {
                    settings.next_interval(interval, invite)
                };
                trace!("Retransmitting {}", transaction.key);
                let resend = transaction.request.clone();
                let sent = transport.send_message(resend.into(), transaction.destination).await;
                if let Err(e) = sent {
                    warn!("Retransmission of {} failed: {}", transaction.key, e);
                    *transaction.state.lock() = TransactionState::Errored;
                    return;
                }
                next_retransmit = Instant::now() + interval;
            }
        }
    }
}

/// Builds the hop-by-hop ACK for a non-2xx final response (RFC 3261 17.1.1.3)
fn ack_for_non_2xx(invite: &Request, response: &Response) -> Request {
    let mut ack = Request::new(Method::Ack, invite.uri().clone());
    let headers = ack.headers_mut();
    if let Ok(via) = invite.top_via() {
        headers.append(HeaderName::Via, via.to_string());
    }
    headers.set(HeaderName::MaxForwards, "70");
    if let Some(from) = invite.header("From") {
        headers.set(HeaderName::From, from);
    }
    if let Some(to) = response.header("To") {
        headers.set(HeaderName::To, to);
    }
    if let Some(call_id) = invite.call_id() {
        headers.set(HeaderName::CallId, call_id);
    }
    if let Ok(cseq) = invite.cseq() {
        headers.set(HeaderName::CSeq, format!("{} ACK", cseq.seq));
    }
    for route in invite.headers.get_all(&HeaderName::Route) {
        headers.append(HeaderName::Route, route);
    }
    ack
}
