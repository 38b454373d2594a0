//! SUBSCRIBE/NOTIFY helpers
//!
//! [`EventSubscriber`] drives the subscriber side: it sends the initial
//! SUBSCRIBE, checks each NOTIFY against its dialog and event package, and
//! refreshes or ends the subscription. [`EventNotifier`] is the other side,
//! built from a received SUBSCRIBE.
//!
//! A NOTIFY the subscriber cannot accept is answered automatically and not
//! returned from [`EventSubscriber::wait_notify`]:
//!
//! | problem                           | answer |
//! |-----------------------------------|--------|
//! | no matching dialog                | 481    |
//! | CSeq not above the previous one   | 500    |
//! | no Subscription-State             | 400    |
//! | Event does not match subscription | 489    |

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sipunit_dialog_core::DialogId;
use sipunit_sip_core::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{SipUnitError, SipUnitResult};
use crate::operation::{HasLastOperation, LastOperation};
use crate::phone::{PhoneCore, ReplyOptions, RequestEvent, SipPhone};

/// Subscriber side of one subscription
pub struct EventSubscriber {
    phone: Arc<PhoneCore>,
    event: Option<Event>,
    call_id: Option<String>,
    dialog_id: Option<DialogId>,
    expires: Option<u32>,
    state: Option<SubscriptionState>,
    last_response: Option<Response>,
    last_operation: LastOperation,
}

impl EventSubscriber {
    pub fn new(phone: &SipPhone) -> Self {
        EventSubscriber {
            phone: phone.core().clone(),
            event: None,
            call_id: None,
            dialog_id: None,
            expires: None,
            state: None,
            last_response: None,
            last_operation: LastOperation::new(),
        }
    }

    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn dialog_id(&self) -> Option<&DialogId> {
        self.dialog_id.as_ref()
    }

    /// Expiry granted by the last 2xx to SUBSCRIBE
    pub fn expires(&self) -> Option<u32> {
        self.expires
    }

    /// Subscription-State of the last accepted NOTIFY
    pub fn subscription_state(&self) -> Option<&SubscriptionState> {
        self.state.as_ref()
    }

    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.as_ref().map(SubscriptionState::is_terminated).unwrap_or(false)
    }

    /// Sends the initial SUBSCRIBE and waits for its final response
    ///
    /// A 2xx creates the subscription dialog. Any other final response is
    /// returned as well but recorded as a failure.
    pub async fn subscribe(
        &mut self,
        target: &str,
        event: Event,
        expires: u32,
        timeout: Duration,
    ) -> SipUnitResult<Response> {
        const OP: &str = "subscribe";
        let result = self.send_initial(target, event, expires, timeout).await;
        self.finish(OP, result)
    }

    async fn send_initial(
        &mut self,
        target: &str,
        event: Event,
        expires: u32,
        timeout: Duration,
    ) -> SipUnitResult<Response> {
        self.phone.ensure_live()?;
        if self.call_id.is_some() {
            return Err(SipUnitError::invalid_state("subscription already started; use refresh"));
        }
        let request = self
            .phone
            .new_request(Method::Subscribe, target)?
            .event(&event)
            .expires(expires)
            .build()?;
        let call_id = request.call_id().unwrap_or_default().to_string();
        self.phone.claim(&call_id);
        self.call_id = Some(call_id);
        self.event = Some(event);

        let key = self.phone.send(request).await?;
        let response = self.phone.wait_final_response(&key, timeout).await?;
        if response.status().is_success() {
            self.dialog_id = self.phone.dialogs.find_dialog_for_response(&response);
            info!("Subscribed to {} ({})", target, response.status_code());
        }
        Ok(response)
    }

    /// Sends an in-dialog SUBSCRIBE with a new expiry
    pub async fn refresh(&mut self, expires: u32, timeout: Duration) -> SipUnitResult<Response> {
        let result = self.send_refresh(expires, timeout).await;
        self.finish("refresh", result)
    }

    /// Refresh with `Expires: 0`
    pub async fn unsubscribe(&mut self, timeout: Duration) -> SipUnitResult<Response> {
        let result = self.send_refresh(0, timeout).await;
        self.finish("unsubscribe", result)
    }

    async fn send_refresh(&mut self, expires: u32, timeout: Duration) -> SipUnitResult<Response> {
        self.phone.ensure_live()?;
        let id = self
            .dialog_id
            .clone()
            .ok_or_else(|| SipUnitError::invalid_state("no subscription dialog to refresh"))?;
        let event = self
            .event
            .clone()
            .ok_or_else(|| SipUnitError::invalid_state("no event package subscribed"))?;
        let request = self.phone.dialogs.create_request(&id, Method::Subscribe)?;
        let request = SimpleRequestBuilder::from_request(request)
            .event(&event)
            .expires(expires)
            .build()?;
        let destination = self.phone.dialog_destination(&id).await?;
        let key = self.phone.tracker.send_request(request, destination, Some(id)).await?;
        self.phone.wait_final_response(&key, timeout).await
    }

    /// Records a SUBSCRIBE result; non-2xx finals count as failures
    fn finish(&mut self, op: &str, result: SipUnitResult<Response>) -> SipUnitResult<Response> {
        match &result {
            Ok(response) => {
                let code = response.status_code();
                if response.status().is_success() {
                    if let Some(expires) = response.expires() {
                        self.expires = Some(expires);
                    }
                    self.last_operation.succeed_with_status(op, code);
                } else {
                    let error = SipUnitError::protocol(format!(
                        "SUBSCRIBE answered with {} {}",
                        code,
                        response.reason_phrase()
                    ));
                    self.last_operation.fail_with_status(op, &error, Some(code));
                }
                self.last_response = Some(response.clone());
            }
            Err(e) => self.last_operation.fail(op, e),
        }
        result
    }

    /// Waits for the next NOTIFY of this subscription
    ///
    /// The NOTIFY is validated first; see the module docs for the answers
    /// sent to invalid ones. The caller answers a returned NOTIFY with
    /// [`reply_to_notify`](Self::reply_to_notify).
    pub async fn wait_notify(&mut self, timeout: Duration) -> Option<RequestEvent> {
        const OP: &str = "wait_notify";
        let Some(call_id) = self.call_id.clone() else {
            self.last_operation
                .fail(OP, &SipUnitError::invalid_state("subscribe was not called"));
            return None;
        };
        let Some(event) = self.phone.wait_in_call(&call_id, &[Method::Notify], timeout).await else {
            self.last_operation.fail(OP, &SipUnitError::timeout("NOTIFY", timeout));
            return None;
        };

        if let Err((code, error)) = self.check_notify(&event.request) {
            if let Err(reply_err) =
                self.phone.reply(&event, code, None, &ReplyOptions::default()).await
            {
                warn!("Could not reject NOTIFY with {}: {}", code, reply_err);
            }
            self.last_operation.fail_with_status(OP, &error, Some(code));
            return None;
        }

        self.state = event.request.subscription_state();
        debug!("NOTIFY accepted, state {:?}", self.state.as_ref().map(|s| s.to_string()));
        self.last_operation.succeed(OP);
        Some(event)
    }

    /// Status code to reject `notify` with, if it is not acceptable
    fn check_notify(&mut self, notify: &Request) -> std::result::Result<(), (u16, SipUnitError)> {
        let Some(id) = self.phone.dialogs.find_dialog_for_request(notify) else {
            let error = SipUnitError::protocol("NOTIFY does not match the subscription dialog");
            return Err((481, error));
        };
        if self.dialog_id.is_none() {
            self.dialog_id = Some(id);
        }
        if let Err(e) = self.phone.dialogs.validate_incoming(notify) {
            return Err((500, e.into()));
        }
        if notify.subscription_state().is_none() {
            return Err((400, SipUnitError::protocol("NOTIFY has no Subscription-State")));
        }
        let expected = self.event.as_ref();
        match (expected, notify.event()) {
            (Some(expected), Some(received)) if expected.matches(&received) => Ok(()),
            (_, received) => Err((
                489,
                SipUnitError::protocol(format!(
                    "NOTIFY event {} does not match the subscription",
                    received.map(|e| e.to_string()).unwrap_or_else(|| "(none)".to_string())
                )),
            )),
        }
    }

    /// Answers a NOTIFY returned by [`wait_notify`](Self::wait_notify)
    pub async fn reply_to_notify(
        &self,
        event: &RequestEvent,
        code: u16,
        reason: Option<&str>,
    ) -> SipUnitResult<Response> {
        let result = self
            .phone
            .reply(event, code, reason, &ReplyOptions::default())
            .await
            .map(|(response, _)| response);
        self.last_operation.record_with_status("reply_to_notify", result, code)
    }
}

impl HasLastOperation for EventSubscriber {
    fn last_operation(&self) -> &LastOperation {
        &self.last_operation
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        if let Some(call_id) = &self.call_id {
            self.phone.release(call_id);
        }
    }
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber")
            .field("event", &self.event.as_ref().map(|e| e.to_string()))
            .field("call_id", &self.call_id)
            .field("dialog_id", &self.dialog_id)
            .finish()
    }
}

/// Notifier side of one subscription
pub struct EventNotifier {
    phone: Arc<PhoneCore>,
    subscribe: RequestEvent,
    event: Event,
    call_id: String,
    dialog_id: Option<DialogId>,
    expires: Option<u32>,
    notify_key: Option<sipunit_dialog_core::TransactionKey>,
    last_operation: LastOperation,
}

impl EventNotifier {
    /// Takes over a received SUBSCRIBE
    pub fn new(phone: &SipPhone, subscribe: RequestEvent) -> SipUnitResult<Self> {
        if subscribe.method() != &Method::Subscribe {
            return Err(SipUnitError::invalid_state(format!(
                "{} cannot start a subscription",
                subscribe.method()
            )));
        }
        let event = subscribe
            .request
            .event()
            .ok_or_else(|| SipUnitError::protocol("SUBSCRIBE has no Event header"))?;
        let call_id = subscribe
            .call_id()
            .ok_or_else(|| SipUnitError::protocol("SUBSCRIBE has no Call-ID"))?
            .to_string();
        let core = phone.core().clone();
        core.claim(&call_id);
        Ok(EventNotifier {
            phone: core,
            subscribe,
            event,
            call_id,
            dialog_id: None,
            expires: None,
            notify_key: None,
            last_operation: LastOperation::new(),
        })
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn dialog_id(&self) -> Option<&DialogId> {
        self.dialog_id.as_ref()
    }

    /// Expiry granted in the last 2xx sent
    pub fn expires(&self) -> Option<u32> {
        self.expires
    }

    /// The SUBSCRIBE that started the subscription
    pub fn subscribe_request(&self) -> &Request {
        &self.subscribe.request
    }

    /// Accepts the initial SUBSCRIBE
    ///
    /// `contact_params` are appended to the Contact, e.g. `["isfocus"]`.
    pub async fn accept(
        &mut self,
        code: u16,
        expires: u32,
        contact_params: &[&str],
    ) -> SipUnitResult<Response> {
        let result = self.send_accept(code, expires, contact_params).await;
        self.last_operation.record_with_status("accept", result, code)
    }

    async fn send_accept(
        &mut self,
        code: u16,
        expires: u32,
        contact_params: &[&str],
    ) -> SipUnitResult<Response> {
        if !(200..300).contains(&code) {
            return Err(SipUnitError::invalid_state(format!(
                "{} does not accept a subscription",
                code
            )));
        }
        let mut options = ReplyOptions::new().with_expires(expires);
        for param in contact_params {
            options = options.with_contact_param(*param);
        }
        let (response, dialog_id) = self.phone.reply(&self.subscribe, code, None, &options).await?;
        self.dialog_id = dialog_id;
        self.expires = Some(expires);
        info!("Subscription to {} accepted for {}s", self.event, expires);
        Ok(response)
    }

    /// Rejects the initial SUBSCRIBE
    pub async fn reject(&mut self, code: u16, reason: Option<&str>) -> SipUnitResult<Response> {
        let result = self.send_reject(code, reason).await;
        self.last_operation.record_with_status("reject", result, code)
    }

    async fn send_reject(&self, code: u16, reason: Option<&str>) -> SipUnitResult<Response> {
        if code < 300 {
            return Err(SipUnitError::invalid_state(format!("{} is not a rejection", code)));
        }
        let (response, _) = self
            .phone
            .reply(&self.subscribe, code, reason, &ReplyOptions::default())
            .await?;
        self.phone.release(&self.call_id);
        Ok(response)
    }

    /// Sends a NOTIFY in the subscription dialog
    ///
    /// The body is attached only when `content_type` is given.
    pub async fn send_notify(
        &mut self,
        state: SubscriptionState,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> SipUnitResult<()> {
        let result = self.build_and_send_notify(state, content_type, body.into()).await;
        self.last_operation.record("send_notify", result)
    }

    async fn build_and_send_notify(
        &mut self,
        state: SubscriptionState,
        content_type: Option<&str>,
        body: Bytes,
    ) -> SipUnitResult<()> {
        self.phone.ensure_live()?;
        let id = self
            .dialog_id
            .clone()
            .ok_or_else(|| SipUnitError::invalid_state("subscription was not accepted"))?;
        let request = self.phone.dialogs.create_request(&id, Method::Notify)?;
        let mut builder = SimpleRequestBuilder::from_request(request)
            .event(&self.event)
            .subscription_state(&state);
        if let Some(content_type) = content_type {
            builder = builder.body(content_type, body);
        }
        let request = builder.build()?;
        let destination = self.phone.dialog_destination(&id).await?;
        let key = self.phone.tracker.send_request(request, destination, Some(id)).await?;
        self.notify_key = Some(key);
        Ok(())
    }

    /// Waits for the final response to the last NOTIFY
    pub async fn wait_notify_response(&mut self, timeout: Duration) -> Option<Response> {
        const OP: &str = "wait_notify_response";
        let Some(key) = self.notify_key.clone() else {
            self.last_operation
                .fail(OP, &SipUnitError::invalid_state("no NOTIFY was sent"));
            return None;
        };
        match self.phone.wait_final_response(&key, timeout).await {
            Ok(response) => {
                self.last_operation.succeed_with_status(OP, response.status_code());
                Some(response)
            }
            Err(e) => {
                self.last_operation.fail(OP, &e);
                None
            }
        }
    }

    /// Waits for a refreshing (or terminating) SUBSCRIBE in the dialog
    pub async fn wait_subscribe(&mut self, timeout: Duration) -> Option<RequestEvent> {
        const OP: &str = "wait_subscribe";
        if self.dialog_id.is_none() {
            self.last_operation
                .fail(OP, &SipUnitError::invalid_state("subscription was not accepted"));
            return None;
        }
        let subscribes = [Method::Subscribe];
        let Some(event) = self.phone.wait_in_call(&self.call_id, &subscribes, timeout).await else {
            self.last_operation.fail(OP, &SipUnitError::timeout("SUBSCRIBE", timeout));
            return None;
        };
        if let Err(e) = self.phone.dialogs.validate_incoming(&event.request) {
            let e = SipUnitError::from(e);
            if let Err(reply_err) =
                self.phone.reply(&event, 500, None, &ReplyOptions::default()).await
            {
                warn!("Could not reject SUBSCRIBE: {}", reply_err);
            }
            self.last_operation.fail(OP, &e);
            return None;
        }
        self.last_operation.succeed(OP);
        Some(event)
    }

    /// Answers a SUBSCRIBE returned by [`wait_subscribe`](Self::wait_subscribe)
    pub async fn reply_to_subscribe(
        &mut self,
        event: &RequestEvent,
        code: u16,
        expires: u32,
    ) -> SipUnitResult<Response> {
        let options = ReplyOptions::new().with_expires(expires);
        let result = self
            .phone
            .reply(event, code, None, &options)
            .await
            .map(|(response, _)| response);
        if result.is_ok() && (200..300).contains(&code) {
            self.expires = Some(expires);
        }
        self.last_operation.record_with_status("reply_to_subscribe", result, code)
    }
}

impl HasLastOperation for EventNotifier {
    fn last_operation(&self) -> &LastOperation {
        &self.last_operation
    }
}

impl Drop for EventNotifier {
    fn drop(&mut self) {
        self.phone.release(&self.call_id);
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("event", &self.event.to_string())
            .field("call_id", &self.call_id)
            .field("dialog_id", &self.dialog_id)
            .finish()
    }
}
