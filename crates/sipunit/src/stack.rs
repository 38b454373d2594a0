//! One SIP signaling endpoint
//!
//! A [`SipStack`] binds one transport and runs one listener task that
//! dispatches what arrives:
//!
//! - responses go to the phone whose transaction tracker owns the branch
//! - requests go to the phone whose URI user part matches the
//!   Request-URI user; anything else is answered `404 Not Found` (ACK is
//!   dropped)
//!
//! Stack names are unique per process. [`SipStack::dispose`] disposes the
//! remaining phones, closes the transport and waits for the listener, so
//! the port can be bound again as soon as it returns.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashSet;
use parking_lot::Mutex;
use sipunit_dialog_core::{LocalEndpoint, TransactionTracker};
use sipunit_sip_core::prelude::*;
use sipunit_sip_transport::{bind_transport, Transport, TransportEvent, TransportType};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{PhoneConfig, StackConfig};
use crate::error::{SipUnitError, SipUnitResult};
use crate::phone::{PhoneCore, PhoneTable, SipPhone};

static STACK_NAMES: LazyLock<DashSet<String>> = LazyLock::new(DashSet::new);

/// Releases a reserved stack name unless disarmed
struct NameReservation(Option<String>);

impl NameReservation {
    fn reserve(name: &str) -> SipUnitResult<Self> {
        if !STACK_NAMES.insert(name.to_string()) {
            return Err(SipUnitError::DuplicateStackName { name: name.to_string() });
        }
        Ok(NameReservation(Some(name.to_string())))
    }

    fn keep(mut self) {
        self.0 = None;
    }
}

impl Drop for NameReservation {
    fn drop(&mut self) {
        if let Some(name) = self.0.take() {
            STACK_NAMES.remove(&name);
        }
    }
}

struct StackInner {
    config: StackConfig,
    transport: Arc<dyn Transport>,
    local_addr: SocketAddr,
    advertised_host: String,
    phones: Arc<PhoneTable>,
    listener: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    disposed: AtomicBool,
}

impl Drop for StackInner {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::SeqCst) {
            warn!("Stack {} dropped without dispose", self.config.name);
            self.shutdown_tx.send_replace(true);
            STACK_NAMES.remove(&self.config.name);
        }
    }
}

/// A bound SIP endpoint hosting phones; cheap to clone
#[derive(Clone)]
pub struct SipStack {
    inner: Arc<StackInner>,
}

impl SipStack {
    /// Reserves the name, binds the transport and starts the listener
    pub async fn new(config: StackConfig) -> SipUnitResult<Self> {
        config.validate()?;
        let reservation = NameReservation::reserve(&config.name)?;

        let (transport, events) = bind_transport(
            config.protocol,
            config.bind_addr()?,
            config.tls.as_ref(),
            config.channel_capacity,
        )
        .await?;
        let local_addr = transport.local_addr()?;

        let phones: Arc<PhoneTable> = Arc::new(PhoneTable::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(run_listener(
            config.name.clone(),
            transport.clone(),
            phones.clone(),
            events,
            shutdown_rx,
        ));

        info!("Stack {} listening on {} ({})", config.name, local_addr, config.protocol);
        reservation.keep();
        Ok(SipStack {
            inner: Arc::new(StackInner {
                advertised_host: config.advertised_host(),
                config,
                transport,
                local_addr,
                phones,
                listener: Mutex::new(Some(listener)),
                shutdown_tx,
                disposed: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &StackConfig {
        &self.inner.config
    }

    pub fn protocol(&self) -> TransportType {
        self.inner.config.protocol
    }

    /// The bound address; carries the real port when 0 was configured
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Host written into Via and Contact
    pub fn advertised_host(&self) -> &str {
        &self.inner.advertised_host
    }

    /// `sip:user@host:port` reaching a phone of this stack
    pub fn sip_uri(&self, user: &str) -> String {
        let mut uri = format!(
            "sip:{}@{}:{}",
            user,
            self.inner.advertised_host,
            self.inner.local_addr.port()
        );
        if self.protocol() != TransportType::Udp {
            uri.push_str(";transport=");
            uri.push_str(self.protocol().uri_param());
        }
        uri
    }

    pub fn phone_count(&self) -> usize {
        self.inner.phones.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Creates a phone for `config.uri`; its user part must be unique on
    /// this stack
    pub fn create_phone(&self, config: PhoneConfig) -> SipUnitResult<SipPhone> {
        if self.is_disposed() {
            return Err(SipUnitError::disposed(format!("stack {}", self.name())));
        }
        let uri: Uri = config.uri.parse()?;
        let user = uri.user.clone().ok_or_else(|| {
            SipUnitError::configuration(format!("phone URI {} has no user part", uri))
        })?;

        let mut address = Address::new(uri);
        if let Some(name) = &config.display_name {
            address = address.with_display_name(name.clone());
        }

        let protocol = self.protocol();
        let mut contact_uri = Uri::sip(self.inner.advertised_host.clone())
            .with_user(user.clone())
            .with_port(self.inner.local_addr.port());
        if protocol != TransportType::Udp {
            contact_uri =
                contact_uri.with_param(Param::new("transport", Some(protocol.uri_param())));
        }
        let endpoint = LocalEndpoint {
            sent_by: format!("{}:{}", self.inner.advertised_host, self.inner.local_addr.port()),
            transport: protocol.to_string(),
            contact: Address::new(contact_uri),
        };

        let default_timeout = config
            .default_timeout_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or_else(|| self.inner.config.default_timeout());
        let tracker = TransactionTracker::new(
            self.inner.transport.clone(),
            self.inner.config.timers.to_settings(),
        );

        let core = Arc::new(PhoneCore::new(
            user.clone(),
            address,
            endpoint,
            self.inner.local_addr,
            self.name().to_string(),
            config.loopback,
            default_timeout,
            tracker,
        ));
        match self.inner.phones.entry(user) {
            Entry::Occupied(entry) => {
                return Err(SipUnitError::configuration(format!(
                    "stack {} already has a phone for user {}",
                    self.name(),
                    entry.key()
                )))
            }
            Entry::Vacant(entry) => {
                entry.insert(core.clone());
            }
        }
        info!("Phone {} created on stack {}", config.uri, self.name());
        Ok(SipPhone::new(core, self.inner.phones.clone()))
    }

    /// Disposes every phone, closes the transport and stops the listener
    ///
    /// Returns once the socket is released. Later calls return immediately.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let phones: Vec<Arc<PhoneCore>> =
            self.inner.phones.iter().map(|entry| entry.value().clone()).collect();
        self.inner.phones.clear();
        for phone in phones {
            phone.dispose().await;
        }

        if let Err(e) = self.inner.transport.close().await {
            warn!("Closing transport of stack {} failed: {}", self.name(), e);
        }
        self.inner.shutdown_tx.send_replace(true);
        let listener = self.inner.listener.lock().take();
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                warn!("Listener of stack {} ended abnormally: {}", self.name(), e);
            }
        }

        STACK_NAMES.remove(&self.inner.config.name);
        info!("Stack {} disposed", self.name());
    }
}

impl std::fmt::Debug for SipStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SipStack")
            .field("name", &self.inner.config.name)
            .field("local_addr", &self.inner.local_addr)
            .field("protocol", &self.inner.config.protocol)
            .field("phones", &self.inner.phones.len())
            .finish()
    }
}

/// Whether a stack with this name is currently alive in the process
pub fn stack_name_in_use(name: &str) -> bool {
    STACK_NAMES.contains(name)
}

async fn run_listener(
    name: String,
    transport: Arc<dyn Transport>,
    phones: Arc<PhoneTable>,
    mut events: mpsc::Receiver<TransportEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown_rx.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            TransportEvent::MessageReceived { message, source, .. } => match message {
                Message::Request(request) => {
                    route_request(&phones, transport.as_ref(), request, source).await
                }
                Message::Response(response) => route_response(&phones, response).await,
            },
            TransportEvent::Error { error } => warn!("Stack {}: {}", name, error),
            TransportEvent::Closed => {
                debug!("Transport of stack {} closed", name);
                break;
            }
        }
    }
    info!("Listener of stack {} stopped", name);
}

async fn route_request(
    phones: &PhoneTable,
    transport: &dyn Transport,
    request: Request,
    source: SocketAddr,
) {
    let phone = request
        .uri()
        .user
        .as_deref()
        .and_then(|user| phones.get(user).map(|entry| entry.value().clone()));

    match phone {
        Some(phone) => phone.deliver(request, source).await,
        None if request.method() == &Method::Ack => {
            debug!("Dropping ACK for unknown user {}", request.uri());
        }
        None => {
            debug!("No phone for {}, answering 404", request.uri());
            let response =
                SimpleResponseBuilder::response_from_request(&request, StatusCode::NOT_FOUND, None)
                    .to_tag(&generate_tag())
                    .build();
            match response {
                Ok(response) => {
                    if let Err(e) = transport.send_message(response.into(), source).await {
                        warn!("Failed to send 404 to {}: {}", source, e);
                    }
                }
                Err(e) => warn!("Cannot answer unroutable {}: {}", request.method(), e),
            }
        }
    }
}

async fn route_response(phones: &PhoneTable, response: Response) {
    let owner = phones
        .iter()
        .find(|entry| entry.tracker.owns_response(&response))
        .map(|entry| entry.value().clone());
    match owner {
        Some(phone) => {
            phone.tracker.on_response(response).await;
        }
        None => trace!("Dropping stray {} {}", response.status_code(), response.reason_phrase()),
    }
}
