//! Simulated SIP user agent
//!
//! A [`SipPhone`] is created by a [`SipStack`](crate::SipStack) and shares
//! the stack's transport. Everything else is its own: a transaction
//! tracker, a dialog table, and an inbox the stack's listener fills with
//! the requests addressed to the phone's user part.
//!
//! Besides the call and subscription helpers built on top of it, the phone
//! exposes a raw request/response API for scripting arbitrary exchanges:
//!
//! ```text
//! new_request ─▶ send_request ─▶ wait_response      (UAC side)
//! wait_request ─▶ send_reply                         (UAS side)
//! create_in_dialog_request                           (after a dialog exists)
//! ```
//!
//! Requests are claimed by Call-ID: once a call or subscription owns a
//! Call-ID, [`SipPhone::wait_request`] no longer returns its requests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use sipunit_dialog_core::{
    Dialog, DialogId, DialogManager, EventQueue, LocalEndpoint, ServerRequestOutcome,
    TransactionError, TransactionKey, TransactionTracker,
};
use sipunit_sip_core::prelude::*;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::call::SipCall;
use crate::error::{SipUnitError, SipUnitResult};
use crate::operation::{HasLastOperation, LastOperation};
use crate::resolve::resolve_uri;

/// Phones of one stack, keyed by URI user part
pub(crate) type PhoneTable = DashMap<String, Arc<PhoneCore>>;

/// A request delivered to a phone
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request: Request,
    /// Where the request came from
    pub source: SocketAddr,
    server_key: Option<TransactionKey>,
}

impl RequestEvent {
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.request.call_id()
    }

    /// Server transaction to answer on; `None` for ACK
    pub fn server_key(&self) -> Option<&TransactionKey> {
        self.server_key.as_ref()
    }

    pub fn is_ack(&self) -> bool {
        self.request.method() == &Method::Ack
    }
}

/// Extra content for [`SipPhone::send_reply`]
#[derive(Debug, Clone, Default)]
pub struct ReplyOptions {
    /// To tag to use instead of a generated one
    pub to_tag: Option<String>,
    /// Contact to send instead of the phone's own
    pub contact: Option<String>,
    /// Parameters appended to the Contact, e.g. `isfocus`
    pub contact_params: Vec<String>,
    pub expires: Option<u32>,
    pub headers: Vec<(String, String)>,
    pub body: Option<(String, Bytes)>,
}

impl ReplyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_to_tag(mut self, tag: impl Into<String>) -> Self {
        self.to_tag = Some(tag.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_contact_param(mut self, param: impl Into<String>) -> Self {
        self.contact_params.push(param.into());
        self
    }

    pub fn with_expires(mut self, seconds: u32) -> Self {
        self.expires = Some(seconds);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.body = Some((content_type.into(), body.into()));
        self
    }
}

/// State shared between a phone handle, its calls and subscriptions, and
/// the stack's listener
pub(crate) struct PhoneCore {
    pub(crate) user: String,
    pub(crate) address: Address,
    pub(crate) contact: Address,
    pub(crate) local_addr: SocketAddr,
    pub(crate) stack_name: String,
    pub(crate) loopback: bool,
    pub(crate) default_timeout: Duration,
    pub(crate) tracker: TransactionTracker,
    pub(crate) dialogs: DialogManager,
    inbox: EventQueue<RequestEvent>,
    claimed: DashSet<String>,
    reply_tags: DashMap<TransactionKey, String>,
    disposed: AtomicBool,
}

impl PhoneCore {
    pub(crate) fn new(
        user: String,
        address: Address,
        endpoint: LocalEndpoint,
        local_addr: SocketAddr,
        stack_name: String,
        loopback: bool,
        default_timeout: Duration,
        tracker: TransactionTracker,
    ) -> Self {
        PhoneCore {
            user,
            address,
            contact: endpoint.contact.clone(),
            local_addr,
            stack_name,
            loopback,
            default_timeout,
            tracker,
            dialogs: DialogManager::new(endpoint),
            inbox: EventQueue::new(),
            claimed: DashSet::new(),
            reply_tags: DashMap::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn ensure_live(&self) -> SipUnitResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SipUnitError::disposed(format!("phone {}", self.address.uri)));
        }
        Ok(())
    }

    pub(crate) fn claim(&self, call_id: &str) {
        self.claimed.insert(call_id.to_string());
    }

    pub(crate) fn release(&self, call_id: &str) {
        self.claimed.remove(call_id);
    }

    /// Out-of-dialog request builder with fresh Call-ID, From tag and branch
    pub(crate) fn new_request(
        &self,
        method: Method,
        target: &str,
    ) -> SipUnitResult<SimpleRequestBuilder> {
        let target: Uri = target.parse()?;
        let local = self.dialogs.local();
        let call_id = generate_call_id(Some(&self.address.uri.host));
        Ok(SimpleRequestBuilder::with_uri(method, target.clone())
            .from_address(&self.address.clone().with_tag(generate_tag()))
            .to_address(&Address::new(target))
            .call_id(&call_id)
            .cseq(1)
            .via(&local.sent_by, &local.transport, Some(&generate_branch()))
            .contact(&self.contact.to_string()))
    }

    /// The dialog an outgoing request belongs to (From tag local, To tag remote)
    fn dialog_of_outgoing(&self, request: &Request) -> Option<DialogId> {
        let remote_tag = request.to_tag()?;
        self.dialogs
            .find_dialog(request.call_id()?, request.from_tag().as_deref(), Some(&remote_tag))
    }

    /// Where a request goes: its dialog's peer, else the top Route, else the
    /// Request-URI
    pub(crate) async fn destination_for(&self, request: &Request) -> SipUnitResult<SocketAddr> {
        if let Some(id) = self.dialog_of_outgoing(request) {
            return self.dialog_destination(&id).await;
        }
        let routes = request.routes()?;
        let next_hop = routes.first().map(|route| &route.uri).unwrap_or_else(|| request.uri());
        resolve_uri(next_hop, self.loopback).await
    }

    pub(crate) async fn dialog_destination(&self, id: &DialogId) -> SipUnitResult<SocketAddr> {
        if let Some(addr) = self.dialogs.remote_addr(id) {
            return Ok(addr);
        }
        let dialog = self
            .dialogs
            .get_dialog(id)
            .ok_or_else(|| SipUnitError::invalid_state(format!("no dialog {}", id)))?;
        resolve_uri(&dialog.remote_target, self.loopback).await
    }

    /// Sends a request in a new client transaction
    pub(crate) async fn send(&self, request: Request) -> SipUnitResult<TransactionKey> {
        self.ensure_live()?;
        let destination = self.destination_for(&request).await?;
        let dialog_id = self.dialog_of_outgoing(&request);
        Ok(self.tracker.send_request(request, destination, dialog_id).await?)
    }

    /// Dialog bookkeeping for a response received on `key`
    ///
    /// Creates the UAC dialog for 1xx/2xx with a To tag to a
    /// dialog-creating request, terminates an early dialog on a failure and
    /// the dialog of a BYE once it is answered.
    pub(crate) fn apply_response(
        &self,
        key: &TransactionKey,
        response: &Response,
    ) -> SipUnitResult<Option<DialogId>> {
        let Some(request) = self.tracker.client_request(key) else {
            return Ok(None);
        };
        let status = response.status();

        if let Some(id) = self.tracker.dialog_for(key) {
            if request.method() == &Method::Bye && status.is_final() {
                self.dialogs.terminate(&id)?;
            }
            return Ok(Some(id));
        }

        if !request.method().creates_dialog() {
            return Ok(None);
        }
        if status.is_failure() {
            return match self.dialogs.find_dialog_for_response(response) {
                Some(id) => {
                    self.dialogs.handle_response(&id, response)?;
                    Ok(Some(id))
                }
                None => Ok(None),
            };
        }
        if response.status_code() == 100 || response.to_tag().is_none() {
            return Ok(None);
        }
        let destination = self
            .tracker
            .client_destination(key)
            .ok_or_else(|| SipUnitError::invalid_state(format!("no transaction {}", key)))?;
        Ok(Some(self.dialogs.create_uac_dialog(&request, response, destination)?))
    }

    /// Waits for the final response on `key`, applying provisionals on the way
    pub(crate) async fn wait_final_response(
        &self,
        key: &TransactionKey,
        timeout: Duration,
    ) -> SipUnitResult<Response> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(response) = self.tracker.wait_response(key, remaining).await else {
                return Err(SipUnitError::timeout(
                    format!("final response to {}", key.method),
                    timeout,
                ));
            };
            self.apply_response(key, &response)?;
            if response.status().is_final() {
                return Ok(response);
            }
        }
    }

    /// Builds and sends a response to `event`
    ///
    /// Dialog-creating requests answered with 101-299 get a To tag that
    /// stays the same across every response on the transaction, plus the
    /// phone's Contact, and a UAS dialog.
    pub(crate) async fn reply(
        &self,
        event: &RequestEvent,
        code: u16,
        reason: Option<&str>,
        options: &ReplyOptions,
    ) -> SipUnitResult<(Response, Option<DialogId>)> {
        self.ensure_live()?;
        let key = event
            .server_key
            .clone()
            .ok_or_else(|| SipUnitError::invalid_state("ACK cannot be answered"))?;
        let status = StatusCode::from_u16(code)?;
        let request = &event.request;

        let mut builder = SimpleResponseBuilder::response_from_request(request, status, reason);
        if request.to_tag().is_none() && code != 100 {
            builder = builder.to_tag(&self.reply_tag(&key, options.to_tag.as_deref()));
        }

        let dialog_forming = request.method().creates_dialog() && (101..300).contains(&code);
        let contact = match &options.contact {
            Some(contact) => Some(contact.clone()),
            None if dialog_forming || !options.contact_params.is_empty() => {
                Some(self.contact.to_string())
            }
            None => None,
        };
        if let Some(contact) = contact {
            let mut value = contact;
            for param in &options.contact_params {
                value.push(';');
                value.push_str(param);
            }
            builder = builder.contact(&value);
        }
        if let Some(expires) = options.expires {
            builder = builder.expires(expires);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name, value);
        }
        if let Some((content_type, body)) = &options.body {
            builder = builder.body(content_type, body.clone());
        }
        let response = builder.build()?;

        self.tracker.send_reply(&key, response.clone()).await?;

        let mut dialog_id = None;
        if dialog_forming && response.to_tag().is_some() {
            dialog_id = Some(self.dialogs.create_uas_dialog(request, &response, event.source)?);
        } else if request.method().creates_dialog() && status.is_failure() {
            // An early dialog dies with the failed transaction that formed it
            if let (Some(call_id), Some(local_tag)) = (request.call_id(), response.to_tag()) {
                let remote_tag = request.from_tag();
                let early =
                    self.dialogs.find_dialog(call_id, Some(&local_tag), remote_tag.as_deref());
                if let Some(id) = early {
                    self.dialogs.terminate(&id)?;
                    dialog_id = Some(id);
                }
            }
        } else if request.method() == &Method::Bye && status.is_success() {
            if let Some(id) = self.dialogs.find_dialog_for_request(request) {
                self.dialogs.terminate(&id)?;
                dialog_id = Some(id);
            }
        }
        if status.is_final() {
            self.reply_tags.remove(&key);
        }
        Ok((response, dialog_id))
    }

    fn reply_tag(&self, key: &TransactionKey, requested: Option<&str>) -> String {
        match requested {
            Some(tag) => {
                self.reply_tags.insert(key.clone(), tag.to_string());
                tag.to_string()
            }
            None => self.reply_tags.entry(key.clone()).or_insert_with(generate_tag).clone(),
        }
    }

    /// Next queued request of `call_id` whose method is in `methods`
    pub(crate) async fn wait_in_call(
        &self,
        call_id: &str,
        methods: &[Method],
        timeout: Duration,
    ) -> Option<RequestEvent> {
        self.wait_in_call_where(call_id, methods, timeout, |_| true).await
    }

    /// Like [`wait_in_call`](Self::wait_in_call), also requiring `accept`
    pub(crate) async fn wait_in_call_where<F>(
        &self,
        call_id: &str,
        methods: &[Method],
        timeout: Duration,
        accept: F,
    ) -> Option<RequestEvent>
    where
        F: Fn(&Request) -> bool,
    {
        self.inbox
            .wait_for(
                |event| {
                    event.call_id() == Some(call_id)
                        && methods.contains(event.method())
                        && accept(&event.request)
                },
                timeout,
            )
            .await
    }

    /// Next queued request whose Call-ID nobody claimed
    async fn wait_unclaimed(
        &self,
        methods: Option<&[Method]>,
        timeout: Duration,
    ) -> Option<RequestEvent> {
        self.inbox
            .wait_for(
                |event| {
                    let unclaimed =
                        event.call_id().map(|id| !self.claimed.contains(id)).unwrap_or(true);
                    unclaimed && methods.map(|m| m.contains(event.method())).unwrap_or(true)
                },
                timeout,
            )
            .await
    }

    /// Called by the stack listener for every request addressed to this phone
    pub(crate) async fn deliver(&self, request: Request, source: SocketAddr) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let server_key = match self.tracker.on_request(&request, source).await {
            Ok(ServerRequestOutcome::New(key)) => Some(key),
            Ok(ServerRequestOutcome::Ack) => None,
            Ok(ServerRequestOutcome::Retransmission(key))
            | Ok(ServerRequestOutcome::AckAbsorbed(key)) => {
                debug!("{} consumed {} for {}", key, request.method(), self.user);
                return;
            }
            Err(TransactionError::MissingBranch) => {
                warn!("Dropping {} without Via branch from {}", request.method(), source);
                return;
            }
            Err(e) => {
                warn!("Cannot track {} from {}: {}", request.method(), source, e);
                return;
            }
        };
        debug!("Queued {} for {}", request.method(), self.user);
        self.inbox.push(RequestEvent {
            request,
            source,
            server_key,
        });
    }

    pub(crate) async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inbox.close();
        self.tracker.shutdown().await;
        self.dialogs.clear();
        self.claimed.clear();
        self.reply_tags.clear();
        info!("Phone {} on stack {} disposed", self.address.uri, self.stack_name);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// A simulated user agent; cheap to clone
#[derive(Clone)]
pub struct SipPhone {
    core: Arc<PhoneCore>,
    table: Arc<PhoneTable>,
    last_operation: Arc<LastOperation>,
}

impl SipPhone {
    pub(crate) fn new(core: Arc<PhoneCore>, table: Arc<PhoneTable>) -> Self {
        SipPhone {
            core,
            table,
            last_operation: Arc::new(LastOperation::new()),
        }
    }

    pub(crate) fn core(&self) -> &Arc<PhoneCore> {
        &self.core
    }

    /// Address of record
    pub fn uri(&self) -> &Uri {
        &self.core.address.uri
    }

    /// From address without tag
    pub fn address(&self) -> &Address {
        &self.core.address
    }

    pub fn contact(&self) -> &Address {
        &self.core.contact
    }

    /// The stack's bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.core.local_addr
    }

    pub fn stack_name(&self) -> &str {
        &self.core.stack_name
    }

    pub fn default_timeout(&self) -> Duration {
        self.core.default_timeout
    }

    /// Starts an out-of-dialog request to `target`
    ///
    /// The builder carries a fresh Call-ID, CSeq 1, a tagged From, the To,
    /// a Via with a new branch and the phone's Contact. Add headers and
    /// body before passing the built request to [`send_request`](Self::send_request).
    pub fn new_request(&self, method: Method, target: &str) -> SipUnitResult<SimpleRequestBuilder> {
        let result = self.core.ensure_live().and_then(|_| self.core.new_request(method, target));
        self.last_operation.record("new_request", result)
    }

    /// Sends `request` in a new client transaction
    ///
    /// Requests carrying the tags of one of the phone's dialogs go to that
    /// dialog's peer; others to the top Route or the Request-URI.
    pub async fn send_request(&self, request: Request) -> SipUnitResult<TransactionKey> {
        let result = self.core.send(request).await;
        self.last_operation.record("send_request", result)
    }

    /// Waits for the next response on `key`
    ///
    /// 1xx (other than 100) and 2xx responses with a To tag to INVITE or
    /// SUBSCRIBE create a dialog.
    pub async fn wait_response(&self, key: &TransactionKey, timeout: Duration) -> Option<Response> {
        const OP: &str = "wait_response";
        let Some(response) = self.core.tracker.wait_response(key, timeout).await else {
            self.last_operation
                .fail(OP, &SipUnitError::timeout(format!("response to {}", key.method), timeout));
            return None;
        };
        let code = response.status_code();
        match self.core.apply_response(key, &response) {
            Ok(_) => self.last_operation.succeed_with_status(OP, code),
            Err(e) => self.last_operation.fail_with_status(OP, &e, Some(code)),
        }
        Some(response)
    }

    /// Waits for the next request no call or subscription has claimed
    pub async fn wait_request(&self, timeout: Duration) -> Option<RequestEvent> {
        let event = self.core.wait_unclaimed(None, timeout).await;
        match &event {
            Some(_) => self.last_operation.succeed("wait_request"),
            None => self
                .last_operation
                .fail("wait_request", &SipUnitError::timeout("request", timeout)),
        }
        event
    }

    /// Answers a received request
    ///
    /// Fails with `DuplicateFinalResponse` after a final response was sent
    /// on the same transaction.
    pub async fn send_reply(
        &self,
        event: &RequestEvent,
        code: u16,
        reason: Option<&str>,
        options: ReplyOptions,
    ) -> SipUnitResult<Response> {
        let result = self
            .core
            .reply(event, code, reason, &options)
            .await
            .map(|(response, _)| response);
        self.last_operation.record_with_status("send_reply", result, code)
    }

    /// Builds the next request inside a dialog of this phone
    pub fn create_in_dialog_request(
        &self,
        dialog_id: &DialogId,
        method: Method,
    ) -> SipUnitResult<Request> {
        let result = self
            .core
            .ensure_live()
            .and_then(|_| Ok(self.core.dialogs.create_request(dialog_id, method)?));
        self.last_operation.record("create_in_dialog_request", result)
    }

    /// Snapshot of a dialog
    pub fn dialog(&self, dialog_id: &DialogId) -> Option<Dialog> {
        self.core.dialogs.get_dialog(dialog_id)
    }

    /// Dialog of a response to a request this phone sent
    pub fn dialog_for_response(&self, response: &Response) -> Option<DialogId> {
        self.core.dialogs.find_dialog_for_response(response)
    }

    /// Dialog of an in-dialog request received from the peer
    pub fn dialog_for_request(&self, request: &Request) -> Option<DialogId> {
        self.core.dialogs.find_dialog_for_request(request)
    }

    /// Dialog created by a response this phone sent
    pub fn dialog_for_reply(&self, response: &Response) -> Option<DialogId> {
        let local_tag = response.to_tag()?;
        self.core
            .dialogs
            .find_dialog(response.call_id()?, Some(&local_tag), response.from_tag().as_deref())
    }

    pub fn dialog_count(&self) -> usize {
        self.core.dialogs.len()
    }

    /// A new, idle outgoing call
    pub fn create_call(&self) -> SipCall {
        SipCall::outgoing(self.core.clone())
    }

    /// Waits for an INVITE that starts a new call
    pub async fn wait_for_incoming_call(&self, timeout: Duration) -> Option<SipCall> {
        const OP: &str = "wait_for_incoming_call";
        if let Err(e) = self.core.ensure_live() {
            self.last_operation.fail(OP, &e);
            return None;
        }
        let invites = [Method::Invite];
        let Some(event) = self.core.wait_unclaimed(Some(&invites[..]), timeout).await else {
            self.last_operation.fail(OP, &SipUnitError::timeout("INVITE", timeout));
            return None;
        };
        self.last_operation.succeed(OP);
        Some(SipCall::incoming(self.core.clone(), event))
    }

    /// Stops the phone's timers, drops its dialogs and detaches it from the
    /// stack. Safe to call more than once.
    pub async fn dispose(&self) {
        self.table
            .remove_if(&self.core.user, |_, registered| Arc::ptr_eq(registered, &self.core));
        self.core.dispose().await;
        self.last_operation.succeed("dispose");
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl HasLastOperation for SipPhone {
    fn last_operation(&self) -> &LastOperation {
        &self.last_operation
    }
}

impl std::fmt::Debug for SipPhone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SipPhone")
            .field("uri", &self.core.address.uri.to_string())
            .field("stack", &self.core.stack_name)
            .field("local_addr", &self.core.local_addr)
            .finish()
    }
}
