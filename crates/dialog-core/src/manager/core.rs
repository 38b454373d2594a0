use std::net::SocketAddr;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sipunit_sip_core::{
    generate_branch, Address, HeaderAccess, Method, Request, Response, SimpleRequestBuilder,
};
use tracing::{debug, info};

use crate::dialog::{Dialog, DialogId, DialogRequestTemplate, DialogState};
use crate::errors::{DialogError, DialogResult};

/// How the local agent appears in requests it builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEndpoint {
    /// Via sent-by, `host:port`
    pub sent_by: String,
    /// Via transport token (`UDP`, `TCP`, `TLS`)
    pub transport: String,
    /// Contact placed on target-refresh requests
    pub contact: Address,
}

/// Dialog table for one user agent
#[derive(Debug)]
pub struct DialogManager {
    local: LocalEndpoint,
    dialogs: DashMap<DialogId, Dialog>,
}

impl DialogManager {
    pub fn new(local: LocalEndpoint) -> Self {
        DialogManager {
            local,
            dialogs: DashMap::new(),
        }
    }

    pub fn local(&self) -> &LocalEndpoint {
        &self.local
    }

    /// Creates or updates the UAC dialog for a response to a request we sent
    pub fn create_uac_dialog(
        &self,
        request: &Request,
        response: &Response,
        remote_addr: SocketAddr,
    ) -> DialogResult<DialogId> {
        if let Some(id) = self.find_dialog_for_response(response) {
            self.handle_response(&id, response)?;
            return Ok(id);
        }
        let mut dialog = Dialog::from_uac_response(request, response).ok_or_else(|| {
            DialogError::protocol_error(format!(
                "{} to {} cannot create a dialog",
                response.status(),
                request.method()
            ))
        })?;
        dialog.remote_addr = Some(remote_addr);
        let id = dialog.id.clone();
        info!("Created {} UAC dialog {} (Call-ID {})", dialog.state, id, dialog.call_id);
        self.dialogs.insert(id.clone(), dialog);
        Ok(id)
    }

    /// Creates the UAS dialog for a response we are sending to `request`
    pub fn create_uas_dialog(
        &self,
        request: &Request,
        response: &Response,
        remote_addr: SocketAddr,
    ) -> DialogResult<DialogId> {
        if let Some(id) = self.find_dialog(
            request.call_id().unwrap_or_default(),
            response.to_tag().as_deref(),
            request.from_tag().as_deref(),
        ) {
            if response.status().is_success() {
                if let Some(mut dialog) = self.dialogs.get_mut(&id) {
                    if dialog.state == DialogState::Early {
                        dialog.state = DialogState::Confirmed;
                        debug!("UAS dialog {} confirmed", id);
                    }
                }
            }
            return Ok(id);
        }
        let mut dialog = Dialog::from_uas_response(request, response).ok_or_else(|| {
            DialogError::protocol_error(format!(
                "{} to {} cannot create a dialog",
                response.status(),
                request.method()
            ))
        })?;
        dialog.remote_addr = Some(remote_addr);
        let id = dialog.id.clone();
        info!("Created {} UAS dialog {} (Call-ID {})", dialog.state, id, dialog.call_id);
        self.dialogs.insert(id.clone(), dialog);
        Ok(id)
    }

    /// Applies a response from the dialog-creating transaction
    pub fn handle_response(&self, id: &DialogId, response: &Response) -> DialogResult<DialogState> {
        let mut dialog = self
            .dialogs
            .get_mut(id)
            .ok_or_else(|| DialogError::dialog_not_found(id))?;
        if dialog.update_from_response(response) {
            debug!("Dialog {} is now {}", id, dialog.state);
        }
        Ok(dialog.state)
    }

    pub fn find_dialog(
        &self,
        call_id: &str,
        local_tag: Option<&str>,
        remote_tag: Option<&str>,
    ) -> Option<DialogId> {
        self.dialogs
            .iter()
            .find(|entry| entry.matches(call_id, local_tag, remote_tag))
            .map(|entry| entry.key().clone())
    }

    /// Dialog of a request received from the peer (To tag is ours)
    pub fn find_dialog_for_request(&self, request: &Request) -> Option<DialogId> {
        let call_id = request.call_id()?;
        let local_tag = request.to_tag()?;
        self.find_dialog(call_id, Some(&local_tag), request.from_tag().as_deref())
    }

    /// Dialog of a response to a request we sent (From tag is ours)
    pub fn find_dialog_for_response(&self, response: &Response) -> Option<DialogId> {
        let call_id = response.call_id()?;
        let remote_tag = response.to_tag()?;
        self.find_dialog(call_id, response.from_tag().as_deref(), Some(&remote_tag))
    }

    /// Checks an in-dialog request from the peer and records its CSeq
    pub fn validate_incoming(&self, request: &Request) -> DialogResult<DialogId> {
        let id = self.find_dialog_for_request(request).ok_or_else(|| DialogError::NotFound {
            id: format!(
                "Call-ID {} with tags {:?}/{:?}",
                request.call_id().unwrap_or("?"),
                request.to_tag(),
                request.from_tag()
            ),
        })?;
        let mut dialog = self
            .dialogs
            .get_mut(&id)
            .ok_or_else(|| DialogError::dialog_not_found(&id))?;
        if dialog.is_terminated() && request.method() != &Method::Ack {
            return Err(DialogError::invalid_state(format!(
                "{} received in terminated dialog {}",
                request.method(),
                id
            )));
        }
        dialog.update_remote_sequence(request)?;
        Ok(id)
    }

    /// Builds the next in-dialog request
    ///
    /// Uses the dialog's tags, remote target and route set with the next
    /// local CSeq (ACK keeps the INVITE's CSeq).
    pub fn create_request(&self, id: &DialogId, method: Method) -> DialogResult<Request> {
        let template = {
            let mut dialog = self
                .dialogs
                .get_mut(id)
                .ok_or_else(|| DialogError::dialog_not_found(id))?;
            dialog.create_request_template(method)?
        };
        self.build_dialog_request(&template)
    }

    fn build_dialog_request(&self, template: &DialogRequestTemplate) -> DialogResult<Request> {
        let branch = generate_branch();
        let mut builder =
            SimpleRequestBuilder::with_uri(template.method.clone(), template.target_uri.clone())
                .from_address(&template.local_address)
                .to_address(&template.remote_address)
                .call_id(&template.call_id)
                .cseq(template.cseq)
                .via(&self.local.sent_by, &self.local.transport, Some(&branch));
        for route in &template.route_set {
            builder = builder.route(&route.to_string());
        }
        if is_target_refresh(&template.method) {
            builder = builder.contact(&self.local.contact.to_string());
        }
        Ok(builder.build()?)
    }

    pub fn get_dialog(&self, id: &DialogId) -> Option<Dialog> {
        self.dialogs.get(id).map(|entry| entry.value().clone())
    }

    pub fn dialog_state(&self, id: &DialogId) -> Option<DialogState> {
        self.dialogs.get(id).map(|entry| entry.state)
    }

    /// Socket address in-dialog requests go to
    pub fn remote_addr(&self, id: &DialogId) -> Option<SocketAddr> {
        self.dialogs.get(id).and_then(|entry| entry.remote_addr)
    }

    pub fn set_remote_tag(&self, id: &DialogId, tag: String) -> DialogResult<()> {
        self.dialogs
            .get_mut(id)
            .ok_or_else(|| DialogError::dialog_not_found(id))?
            .set_remote_tag(tag)
    }

    pub fn terminate(&self, id: &DialogId) -> DialogResult<()> {
        let mut dialog = self
            .dialogs
            .get_mut(id)
            .ok_or_else(|| DialogError::dialog_not_found(id))?;
        if !dialog.is_terminated() {
            dialog.terminate();
            debug!("Dialog {} terminated", id);
        }
        Ok(())
    }

    /// Terminates every dialog and forgets them
    pub fn clear(&self) {
        for mut entry in self.dialogs.iter_mut() {
            entry.terminate();
        }
        self.dialogs.clear();
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }
}

fn is_target_refresh(method: &Method) -> bool {
    matches!(
        method,
        Method::Invite | Method::Subscribe | Method::Notify | Method::Refer | Method::Update
    )
}
