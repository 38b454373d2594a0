//! Dialog implementation for RFC 3261 SIP dialogs
//!
//! A dialog is created from the response that establishes it, on either
//! side, and then supplies the tags, CSeq, remote target and route set every
//! in-dialog request must reuse.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use sipunit_sip_core::{Address, HeaderAccess, Method, Request, Response, Uri};
use tracing::{debug, warn};

use super::dialog_id::DialogId;
use super::dialog_state::DialogState;
use super::dialog_utils::{extract_contact_uri, extract_route_set, without_tag};
use crate::errors::{DialogError, DialogResult};

/// A SIP dialog as defined in RFC 3261
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    /// Unique identifier for this dialog
    pub id: DialogId,

    /// Current state of the dialog
    pub state: DialogState,

    /// Call-ID for this dialog
    pub call_id: String,

    /// Local party (From on requests we send), without tag
    pub local_address: Address,

    /// Remote party (To on requests we send), without tag
    pub remote_address: Address,

    pub local_tag: Option<String>,

    pub remote_tag: Option<String>,

    /// CSeq of the last request we sent in this dialog
    pub local_cseq: u32,

    /// CSeq of the last request the peer sent; 0 until one arrives
    pub remote_cseq: u32,

    /// Request-URI for in-dialog requests (the peer's Contact)
    pub remote_target: Uri,

    /// Route set learned from Record-Route
    pub route_set: Vec<Address>,

    /// Whether the local UA sent the dialog-creating request
    pub is_initiator: bool,

    /// Method that created the dialog
    pub method: Method,

    /// Socket address in-dialog requests are sent to
    pub remote_addr: Option<SocketAddr>,
}

/// Everything needed to build one in-dialog request
#[derive(Debug, Clone)]
pub struct DialogRequestTemplate {
    pub method: Method,
    pub target_uri: Uri,
    pub call_id: String,
    /// Tagged local address (From)
    pub local_address: Address,
    /// Tagged remote address (To)
    pub remote_address: Address,
    pub cseq: u32,
    pub route_set: Vec<Address>,
}

impl Dialog {
    /// Create a new early dialog
    pub fn new(
        call_id: String,
        local_address: Address,
        remote_address: Address,
        local_tag: Option<String>,
        remote_tag: Option<String>,
        is_initiator: bool,
        method: Method,
    ) -> Self {
        let remote_target = remote_address.uri.clone();
        Self {
            id: DialogId::new(),
            state: DialogState::Early,
            call_id,
            local_address: without_tag(local_address),
            remote_address: without_tag(remote_address),
            local_tag,
            remote_tag,
            local_cseq: 0,
            remote_cseq: 0,
            remote_target,
            route_set: Vec::new(),
            is_initiator,
            method,
            remote_addr: None,
        }
    }

    /// Create the UAC side of a dialog from a 1xx (with To tag) or 2xx
    /// response to the dialog-creating request we sent
    pub fn from_uac_response(request: &Request, response: &Response) -> Option<Self> {
        if !request.method().creates_dialog() {
            debug!("Dialog creation skipped: {} does not create dialogs", request.method());
            return None;
        }
        let status = response.status();
        let state = if status.is_success() {
            DialogState::Confirmed
        } else if status.is_provisional() && status.as_u16() > 100 {
            DialogState::Early
        } else {
            return None;
        };

        let call_id = response.call_id()?.to_string();
        let from = response.from().ok()?;
        let to = response.to().ok()?;
        let remote_tag = match to.tag() {
            Some(tag) => tag.to_string(),
            None => {
                debug!("Dialog creation failed: {} without To tag", status);
                return None;
            }
        };
        let cseq = request.cseq().ok()?;
        let remote_target = extract_contact_uri(response).unwrap_or_else(|| request.uri().clone());

        let mut dialog = Self::new(
            call_id,
            from.clone(),
            to,
            from.tag().map(str::to_string),
            Some(remote_tag),
            true,
            request.method().clone(),
        );
        dialog.state = state;
        dialog.local_cseq = cseq.seq;
        dialog.remote_target = remote_target;
        dialog.route_set = extract_route_set(response, true);
        Some(dialog)
    }

    /// Create the UAS side of a dialog from the request we received and the
    /// 1xx/2xx we answered it with
    pub fn from_uas_response(request: &Request, response: &Response) -> Option<Self> {
        if !request.method().creates_dialog() {
            return None;
        }
        let status = response.status();
        let state = if status.is_success() {
            DialogState::Confirmed
        } else if status.is_provisional() && status.as_u16() > 100 {
            DialogState::Early
        } else {
            return None;
        };

        let call_id = request.call_id()?.to_string();
        let from = request.from().ok()?;
        let to = response.to().ok()?;
        let local_tag = to.tag()?.to_string();
        let cseq = request.cseq().ok()?;
        let remote_target = extract_contact_uri(request).unwrap_or_else(|| from.uri.clone());

        let mut dialog = Self::new(
            call_id,
            to,
            from.clone(),
            Some(local_tag),
            from.tag().map(str::to_string),
            false,
            request.method().clone(),
        );
        dialog.state = state;
        dialog.remote_cseq = cseq.seq;
        dialog.remote_target = remote_target;
        dialog.route_set = extract_route_set(request, false);
        Some(dialog)
    }

    /// Get the dialog ID tuple (Call-ID, local tag, remote tag)
    pub fn dialog_id_tuple(&self) -> Option<(String, String, String)> {
        match (&self.local_tag, &self.remote_tag) {
            (Some(local), Some(remote)) => {
                Some((self.call_id.clone(), local.clone(), remote.clone()))
            }
            _ => None,
        }
    }

    /// Whether this dialog is identified by the given triple
    pub fn matches(
        &self,
        call_id: &str,
        local_tag: Option<&str>,
        remote_tag: Option<&str>,
    ) -> bool {
        self.call_id == call_id
            && self.local_tag.as_deref() == local_tag
            && self.remote_tag.as_deref() == remote_tag
    }

    /// Set the remote tag for this dialog
    ///
    /// A confirmed dialog's tags never change; a different tag is rejected.
    pub fn set_remote_tag(&mut self, tag: String) -> DialogResult<()> {
        match (&self.state, &self.remote_tag) {
            (DialogState::Confirmed, Some(current)) if *current != tag => {
                Err(DialogError::TagMismatch {
                    expected: current.clone(),
                    actual: tag,
                })
            }
            (DialogState::Terminated, _) => Err(DialogError::invalid_state(format!(
                "cannot set remote tag on terminated dialog {}",
                self.id
            ))),
            _ => {
                debug!("Setting remote tag for dialog {}: {}", self.id, tag);
                self.remote_tag = Some(tag);
                Ok(())
            }
        }
    }

    /// Applies a response received (UAC) within this dialog's creating
    /// transaction. Returns whether the state changed.
    pub fn update_from_response(&mut self, response: &Response) -> bool {
        let status = response.status();
        if self.state != DialogState::Early {
            return false;
        }

        if status.is_failure() {
            debug!("Dialog {} terminated by {}", self.id, status);
            self.state = DialogState::Terminated;
            return true;
        }

        if let Some(uri) = extract_contact_uri(response) {
            self.remote_target = uri;
        }
        if status.is_success() {
            if let Some(tag) = response.to_tag() {
                if self.remote_tag.as_deref() != Some(tag.as_str()) {
                    warn!("Dialog {} confirmed with new remote tag {}", self.id, tag);
                    self.remote_tag = Some(tag);
                }
            }
            self.route_set = extract_route_set(response, self.is_initiator);
            self.state = DialogState::Confirmed;
            return true;
        }
        false
    }

    /// Checks and records the CSeq of a request received in this dialog
    ///
    /// ACK and CANCEL reuse the CSeq of the request they refer to and are
    /// exempt.
    pub fn update_remote_sequence(&mut self, request: &Request) -> DialogResult<()> {
        if matches!(request.method(), Method::Ack | Method::Cancel) {
            return Ok(());
        }
        let cseq = request
            .cseq()
            .map_err(|e| {
                DialogError::protocol_error(format!("Request missing CSeq header: {}", e))
            })?;

        if self.remote_cseq != 0 && cseq.seq <= self.remote_cseq {
            return Err(DialogError::protocol_error(format!(
                "Invalid CSeq: got {}, expected > {}",
                cseq.seq, self.remote_cseq
            )));
        }
        self.remote_cseq = cseq.seq;
        Ok(())
    }

    /// Reserves the next CSeq and collects what a new request needs
    ///
    /// ACK reuses the CSeq of the INVITE it acknowledges.
    pub fn create_request_template(
        &mut self,
        method: Method,
    ) -> DialogResult<DialogRequestTemplate> {
        if self.state == DialogState::Terminated {
            return Err(DialogError::invalid_state(format!(
                "cannot send {} in terminated dialog {}",
                method, self.id
            )));
        }
        let (local_tag, remote_tag) = match (&self.local_tag, &self.remote_tag) {
            (Some(local), Some(remote)) => (local.clone(), remote.clone()),
            _ => {
                return Err(DialogError::invalid_state(format!(
                    "dialog {} has no tag pair for {}",
                    self.id, method
                )))
            }
        };

        if method != Method::Ack {
            self.local_cseq += 1;
        }

        Ok(DialogRequestTemplate {
            method,
            target_uri: self.remote_target.clone(),
            call_id: self.call_id.clone(),
            local_address: self.local_address.clone().with_tag(local_tag),
            remote_address: self.remote_address.clone().with_tag(remote_tag),
            cseq: self.local_cseq,
            route_set: self.route_set.clone(),
        })
    }

    /// Terminate the dialog
    pub fn terminate(&mut self) {
        self.state = DialogState::Terminated;
    }

    /// Check if dialog is terminated
    pub fn is_terminated(&self) -> bool {
        self.state == DialogState::Terminated
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == DialogState::Confirmed
    }
}
