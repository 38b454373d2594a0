//! INVITE call state machine
//!
//! ```text
//!  Idle ──initiate──▶ Calling ──18x──▶ Ringing ──2xx──▶ Confirmed
//!                        │                │               │
//!                        └──── ≥300 ──────┴──▶ Terminated ◀┴── BYE ── Disconnecting
//!
//!  transport failure or transaction timeout ──▶ Error
//! ```
//!
//! The same type serves both sides. An outgoing call comes from
//! [`SipPhone::create_call`](crate::SipPhone::create_call); an incoming one
//! from [`SipPhone::wait_for_incoming_call`](crate::SipPhone::wait_for_incoming_call),
//! already in `Calling` with the INVITE waiting to be answered.
//!
//! Invalid transitions fail immediately with `InvalidState`. Waits return
//! `None` on timeout; the reason is in the call's last operation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sipunit_dialog_core::{Dialog, DialogId, TransactionKey, TransactionState};
use sipunit_sip_core::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{SipUnitError, SipUnitResult};
use crate::operation::{HasLastOperation, LastOperation};
use crate::phone::{PhoneCore, ReplyOptions, RequestEvent};

/// Where a call is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    Calling,
    Ringing,
    Confirmed,
    Disconnecting,
    Terminated,
    Error,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "Idle",
            CallState::Calling => "Calling",
            CallState::Ringing => "Ringing",
            CallState::Confirmed => "Confirmed",
            CallState::Disconnecting => "Disconnecting",
            CallState::Terminated => "Terminated",
            CallState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One INVITE dialog usage, driven from either side
pub struct SipCall {
    phone: Arc<PhoneCore>,
    state: CallState,
    call_id: Option<String>,
    dialog_id: Option<DialogId>,
    // UAC side
    invite_key: Option<TransactionKey>,
    reinvite_key: Option<TransactionKey>,
    ack_pending: bool,
    last_response: Option<Response>,
    // UAS side
    incoming: Option<RequestEvent>,
    pending_reinvite: Option<RequestEvent>,
    expected_ack_cseq: Option<u32>,
    // BYE handshake
    listening: bool,
    pending_bye: Option<RequestEvent>,
    last_operation: LastOperation,
}

impl SipCall {
    pub(crate) fn outgoing(phone: Arc<PhoneCore>) -> Self {
        SipCall {
            phone,
            state: CallState::Idle,
            call_id: None,
            dialog_id: None,
            invite_key: None,
            reinvite_key: None,
            ack_pending: false,
            last_response: None,
            incoming: None,
            pending_reinvite: None,
            expected_ack_cseq: None,
            listening: false,
            pending_bye: None,
            last_operation: LastOperation::new(),
        }
    }

    pub(crate) fn incoming(phone: Arc<PhoneCore>, invite: RequestEvent) -> Self {
        let call_id = invite.call_id().map(str::to_string);
        if let Some(call_id) = &call_id {
            phone.claim(call_id);
        }
        info!("Incoming call {} from {}", call_id.as_deref().unwrap_or("?"), invite.source);
        let mut call = SipCall::outgoing(phone);
        call.state = CallState::Calling;
        call.call_id = call_id;
        call.incoming = Some(invite);
        call
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn dialog_id(&self) -> Option<&DialogId> {
        self.dialog_id.as_ref()
    }

    /// Snapshot of the call's dialog
    pub fn dialog(&self) -> Option<Dialog> {
        self.dialog_id.as_ref().and_then(|id| self.phone.dialogs.get_dialog(id))
    }

    /// Last response received on an INVITE, re-INVITE or BYE this side sent
    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    /// The INVITE that started an incoming call
    pub fn incoming_request(&self) -> Option<&Request> {
        self.incoming.as_ref().map(|event| &event.request)
    }

    pub fn is_terminated(&self) -> bool {
        self.state == CallState::Terminated
    }

    fn terminate(&mut self) {
        self.state = CallState::Terminated;
        self.listening = false;
        if let Some(call_id) = &self.call_id {
            self.phone.release(call_id);
        }
    }

    fn dialog_or_err(&self) -> SipUnitResult<DialogId> {
        self.dialog_id
            .clone()
            .ok_or_else(|| {
                SipUnitError::invalid_state(format!("call in state {} has no dialog", self.state))
            })
    }

    fn require(&self, expected: CallState, action: &str) -> SipUnitResult<()> {
        if self.state != expected {
            return Err(SipUnitError::invalid_state(format!(
                "cannot {} in state {} (needs {})",
                action, self.state, expected
            )));
        }
        Ok(())
    }

    /// Sends an INVITE to `target`, optionally through `route`
    pub async fn initiate_outgoing_call(
        &mut self,
        target: &str,
        route: Option<&str>,
    ) -> SipUnitResult<()> {
        let result = self.send_invite(target, route).await;
        self.last_operation.record("initiate_outgoing_call", result)
    }

    async fn send_invite(&mut self, target: &str, route: Option<&str>) -> SipUnitResult<()> {
        self.phone.ensure_live()?;
        self.require(CallState::Idle, "initiate a call")?;

        let mut builder = self.phone.new_request(Method::Invite, target)?;
        if let Some(route) = route {
            builder = builder.route(&route_value(route));
        }
        let invite = builder.build()?;
        let call_id = invite.call_id().unwrap_or_default().to_string();
        let destination = self.phone.destination_for(&invite).await?;

        match self.phone.tracker.send_request(invite, destination, None).await {
            Ok(key) => {
                self.phone.claim(&call_id);
                info!("Call {} to {} started", call_id, target);
                self.call_id = Some(call_id);
                self.invite_key = Some(key);
                self.state = CallState::Calling;
                Ok(())
            }
            Err(e) => {
                self.state = CallState::Error;
                Err(e.into())
            }
        }
    }

    /// Consumes the next response to the outgoing INVITE
    ///
    /// 18x moves to `Ringing`, 2xx to `Confirmed` with the dialog created,
    /// a failure to `Terminated`.
    pub async fn wait_outgoing_call_response(&mut self, timeout: Duration) -> Option<Response> {
        const OP: &str = "wait_outgoing_call_response";
        let Some(key) = self.invite_key.clone() else {
            self.last_operation
                .fail(OP, &SipUnitError::invalid_state("no outgoing INVITE was sent"));
            return None;
        };
        let response = self.consume_response(OP, &key, timeout).await?;
        match response.status_code() {
            100 => {}
            101..=199 => {
                if self.state == CallState::Calling {
                    self.state = CallState::Ringing;
                }
            }
            200..=299 => {
                self.state = CallState::Confirmed;
                self.ack_pending = true;
            }
            code => {
                debug!("Call {} failed with {}", self.call_id.as_deref().unwrap_or("?"), code);
                self.terminate();
            }
        }
        Some(response)
    }

    /// Waits for one response on `key`, updating dialog and last operation
    async fn consume_response(
        &mut self,
        op: &str,
        key: &TransactionKey,
        timeout: Duration,
    ) -> Option<Response> {
        let Some(response) = self.phone.tracker.wait_response(key, timeout).await else {
            if self.phone.tracker.state(key) == Some(TransactionState::TimedOut) {
                warn!("Transaction {} timed out", key);
                self.state = CallState::Error;
            }
            self.last_operation
                .fail(op, &SipUnitError::timeout(format!("response to {}", key.method), timeout));
            return None;
        };
        let code = response.status_code();
        match self.phone.apply_response(key, &response) {
            Ok(Some(id)) => {
                self.dialog_id = Some(id);
                self.last_operation.succeed_with_status(op, code);
            }
            Ok(None) => self.last_operation.succeed_with_status(op, code),
            Err(e) => self.last_operation.fail_with_status(op, &e, Some(code)),
        }
        self.last_response = Some(response.clone());
        Some(response)
    }

    /// ACKs the 2xx to the INVITE (or re-INVITE) this side sent
    pub async fn send_invite_ok_ack(&mut self) -> SipUnitResult<()> {
        let result = self.send_ack().await;
        self.last_operation.record("send_invite_ok_ack", result)
    }

    async fn send_ack(&mut self) -> SipUnitResult<()> {
        self.require(CallState::Confirmed, "send ACK")?;
        if !self.ack_pending {
            return Err(SipUnitError::invalid_state("no 2xx is waiting for an ACK"));
        }
        let id = self.dialog_or_err()?;
        let ack = self.phone.dialogs.create_request(&id, Method::Ack)?;
        let destination = self.phone.dialog_destination(&id).await?;
        if let Err(e) = self.phone.tracker.send_stateless(ack, destination).await {
            self.state = CallState::Error;
            return Err(e.into());
        }
        self.ack_pending = false;
        Ok(())
    }

    /// Answers the incoming INVITE
    ///
    /// A positive `sleep_ms` delays the send by that many milliseconds.
    pub async fn send_incoming_call_response(
        &mut self,
        code: u16,
        reason: Option<&str>,
        sleep_ms: i64,
    ) -> SipUnitResult<()> {
        let result = self.answer_invite(code, reason, sleep_ms).await;
        self.last_operation.record_with_status("send_incoming_call_response", result, code)
    }

    async fn answer_invite(
        &mut self,
        code: u16,
        reason: Option<&str>,
        sleep_ms: i64,
    ) -> SipUnitResult<()> {
        let invite = self
            .incoming
            .clone()
            .ok_or_else(|| SipUnitError::invalid_state("call has no incoming INVITE to answer"))?;
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms as u64)).await;
        }

        let sent = self.phone.reply(&invite, code, reason, &ReplyOptions::default()).await;
        let (_, dialog) = match sent {
            Ok(sent) => sent,
            Err(e) => {
                if matches!(e, SipUnitError::Transport { .. }) {
                    self.state = CallState::Error;
                }
                return Err(e);
            }
        };
        if dialog.is_some() {
            self.dialog_id = dialog;
        }
        match code {
            100 => {}
            101..=199 => self.state = CallState::Ringing,
            200..=299 => {
                self.state = CallState::Confirmed;
                self.expected_ack_cseq = invite.request.cseq().ok().map(|cseq| cseq.seq);
            }
            _ => self.terminate(),
        }
        Ok(())
    }

    /// Waits for the ACK to the 2xx this side sent
    pub async fn wait_for_ack(&mut self, timeout: Duration) -> Option<Request> {
        const OP: &str = "wait_for_ack";
        let (Some(call_id), Some(cseq)) = (self.call_id.clone(), self.expected_ack_cseq) else {
            self.last_operation
                .fail(OP, &SipUnitError::invalid_state("no 2xx was sent on this call"));
            return None;
        };
        let event = self
            .phone
            .wait_in_call_where(&call_id, &[Method::Ack], timeout, |request| {
                request.cseq().map(|c| c.seq == cseq).unwrap_or(false)
            })
            .await;
        match event {
            Some(event) => {
                self.expected_ack_cseq = None;
                self.last_operation.succeed(OP);
                Some(event.request)
            }
            None => {
                self.last_operation.fail(OP, &SipUnitError::timeout("ACK", timeout));
                None
            }
        }
    }

    /// Arms [`wait_for_disconnect`](Self::wait_for_disconnect)
    pub fn listen_for_disconnect(&mut self) -> SipUnitResult<()> {
        let result = self
            .require(CallState::Confirmed, "listen for BYE")
            .and_then(|_| self.dialog_or_err().map(|_| ()));
        if result.is_ok() {
            self.listening = true;
        }
        self.last_operation.record("listen_for_disconnect", result)
    }

    /// Waits for the peer's BYE; the call moves to `Disconnecting`
    ///
    /// Must be preceded by [`listen_for_disconnect`](Self::listen_for_disconnect).
    /// A BYE breaking CSeq order is answered 500 and not returned.
    pub async fn wait_for_disconnect(&mut self, timeout: Duration) -> Option<Request> {
        const OP: &str = "wait_for_disconnect";
        let Some(call_id) = self.call_id.clone().filter(|_| self.listening) else {
            self.last_operation.fail(
                OP,
                &SipUnitError::invalid_state("listen_for_disconnect was not called"),
            );
            return None;
        };
        let Some(event) = self.phone.wait_in_call(&call_id, &[Method::Bye], timeout).await else {
            self.last_operation.fail(OP, &SipUnitError::timeout("BYE", timeout));
            return None;
        };

        if let Err(e) = self.phone.dialogs.validate_incoming(&event.request) {
            let e = SipUnitError::from(e);
            if let Err(reply_err) =
                self.phone.reply(&event, 500, None, &ReplyOptions::default()).await
            {
                warn!("Could not reject out-of-order BYE: {}", reply_err);
            }
            self.last_operation.fail(OP, &e);
            return None;
        }
        self.listening = false;
        self.state = CallState::Disconnecting;
        self.last_operation.succeed(OP);
        let request = event.request.clone();
        self.pending_bye = Some(event);
        Some(request)
    }

    /// Answers the received BYE with 200 and terminates the call
    pub async fn respond_to_disconnect(&mut self) -> SipUnitResult<()> {
        let result = self.answer_bye().await;
        self.last_operation.record_with_status("respond_to_disconnect", result, 200)
    }

    async fn answer_bye(&mut self) -> SipUnitResult<()> {
        let bye = self
            .pending_bye
            .take()
            .ok_or_else(|| SipUnitError::invalid_state("no BYE received to respond to"))?;
        if let Err(e) = self.phone.reply(&bye, 200, None, &ReplyOptions::default()).await {
            self.pending_bye = Some(bye);
            return Err(e);
        }
        if let Some(id) = &self.dialog_id {
            self.phone.dialogs.terminate(id)?;
        }
        self.terminate();
        Ok(())
    }

    /// Sends BYE and waits (up to the phone's default timeout) for its
    /// final response
    pub async fn disconnect(&mut self) -> SipUnitResult<()> {
        let result = self.send_bye().await;
        let bye_response = self
            .last_response
            .as_ref()
            .filter(|r| r.cseq().map(|c| c.method == Method::Bye).unwrap_or(false));
        match bye_response {
            Some(response) => {
                let code = response.status_code();
                self.last_operation.record_with_status("disconnect", result, code)
            }
            None => self.last_operation.record("disconnect", result),
        }
    }

    async fn send_bye(&mut self) -> SipUnitResult<()> {
        self.require(CallState::Confirmed, "disconnect")?;
        let id = self.dialog_or_err()?;
        let bye = self.phone.dialogs.create_request(&id, Method::Bye)?;
        let destination = self.phone.dialog_destination(&id).await?;
        let key = match self.phone.tracker.send_request(bye, destination, Some(id)).await {
            Ok(key) => key,
            Err(e) => {
                self.state = CallState::Error;
                return Err(e.into());
            }
        };
        self.state = CallState::Disconnecting;

        match self.phone.wait_final_response(&key, self.phone.default_timeout).await {
            Ok(response) => {
                let success = response.status().is_success();
                let code = response.status_code();
                self.last_response = Some(response);
                self.terminate();
                if success {
                    Ok(())
                } else {
                    Err(SipUnitError::protocol(format!("BYE answered with {}", code)))
                }
            }
            Err(e) => {
                self.state = CallState::Error;
                Err(e)
            }
        }
    }

    /// Sends an in-dialog INVITE, optionally with a new body
    pub async fn send_reinvite(&mut self, body: Option<(&str, Bytes)>) -> SipUnitResult<()> {
        let result = self.start_reinvite(body).await;
        self.last_operation.record("send_reinvite", result)
    }

    async fn start_reinvite(&mut self, body: Option<(&str, Bytes)>) -> SipUnitResult<()> {
        self.require(CallState::Confirmed, "re-INVITE")?;
        if self.ack_pending {
            return Err(SipUnitError::invalid_state("previous 2xx has not been ACKed"));
        }
        let id = self.dialog_or_err()?;
        let mut request = self.phone.dialogs.create_request(&id, Method::Invite)?;
        if let Some((content_type, body)) = body {
            request = SimpleRequestBuilder::from_request(request).body(content_type, body).build()?;
        }
        let destination = self.phone.dialog_destination(&id).await?;
        let key = self.phone.tracker.send_request(request, destination, Some(id)).await?;
        self.reinvite_key = Some(key);
        Ok(())
    }

    /// Consumes the next response to the re-INVITE
    ///
    /// A 2xx must be acknowledged with [`send_invite_ok_ack`](Self::send_invite_ok_ack).
    pub async fn wait_reinvite_response(&mut self, timeout: Duration) -> Option<Response> {
        const OP: &str = "wait_reinvite_response";
        let Some(key) = self.reinvite_key.clone() else {
            self.last_operation
                .fail(OP, &SipUnitError::invalid_state("no re-INVITE was sent"));
            return None;
        };
        let response = self.consume_response(OP, &key, timeout).await?;
        if response.status().is_success() {
            self.ack_pending = true;
        }
        Some(response)
    }

    /// Waits for an in-dialog INVITE from the peer
    pub async fn wait_for_reinvite(&mut self, timeout: Duration) -> Option<Request> {
        const OP: &str = "wait_for_reinvite";
        let confirmed = self.state == CallState::Confirmed;
        let (Some(call_id), true) = (self.call_id.clone(), confirmed) else {
            let e = SipUnitError::invalid_state(format!(
                "no re-INVITE possible in state {}",
                self.state
            ));
            self.last_operation.fail(OP, &e);
            return None;
        };
        let Some(event) = self.phone.wait_in_call(&call_id, &[Method::Invite], timeout).await else {
            self.last_operation.fail(OP, &SipUnitError::timeout("re-INVITE", timeout));
            return None;
        };
        if let Err(e) = self.phone.dialogs.validate_incoming(&event.request) {
            let e = SipUnitError::from(e);
            if let Err(reply_err) =
                self.phone.reply(&event, 500, None, &ReplyOptions::default()).await
            {
                warn!("Could not reject out-of-order re-INVITE: {}", reply_err);
            }
            self.last_operation.fail(OP, &e);
            return None;
        }
        self.last_operation.succeed(OP);
        let request = event.request.clone();
        self.pending_reinvite = Some(event);
        Some(request)
    }

    /// Answers the re-INVITE returned by [`wait_for_reinvite`](Self::wait_for_reinvite)
    pub async fn respond_to_reinvite(
        &mut self,
        code: u16,
        reason: Option<&str>,
    ) -> SipUnitResult<()> {
        let result = self.answer_reinvite(code, reason).await;
        self.last_operation.record_with_status("respond_to_reinvite", result, code)
    }

    async fn answer_reinvite(&mut self, code: u16, reason: Option<&str>) -> SipUnitResult<()> {
        let event = self
            .pending_reinvite
            .clone()
            .ok_or_else(|| SipUnitError::invalid_state("no re-INVITE to respond to"))?;
        self.phone.reply(&event, code, reason, &ReplyOptions::default()).await?;
        if code >= 200 {
            self.pending_reinvite = None;
        }
        if (200..300).contains(&code) {
            self.expected_ack_cseq = event.request.cseq().ok().map(|cseq| cseq.seq);
        }
        Ok(())
    }
}

impl HasLastOperation for SipCall {
    fn last_operation(&self) -> &LastOperation {
        &self.last_operation
    }
}

impl Drop for SipCall {
    fn drop(&mut self) {
        if let Some(call_id) = &self.call_id {
            self.phone.release(call_id);
        }
    }
}

impl fmt::Debug for SipCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipCall")
            .field("state", &self.state)
            .field("call_id", &self.call_id)
            .field("dialog_id", &self.dialog_id)
            .finish()
    }
}

/// Route header value for a bare URI
fn route_value(route: &str) -> String {
    let route = route.trim();
    if route.starts_with('<') {
        route.to_string()
    } else {
        format!("<{}>", route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_value() {
        assert_eq!(route_value("sip:127.0.0.1:5070;lr"), "<sip:127.0.0.1:5070;lr>");
        assert_eq!(route_value(" <sip:proxy;lr> "), "<sip:proxy;lr>");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CallState::Disconnecting.to_string(), "Disconnecting");
    }
}
