//! Subscription-State header (RFC 6665 Section 8.2.3)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::utils::parse_params;
use crate::types::param::{Param, ParamList};

/// Subscription state values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubState {
    Active,
    Pending,
    Terminated,
    Extension(String),
}

impl SubState {
    pub fn as_str(&self) -> &str {
        match self {
            SubState::Active => "active",
            SubState::Pending => "pending",
            SubState::Terminated => "terminated",
            SubState::Extension(s) => s,
        }
    }
}

impl fmt::Display for SubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Subscription-State: active;expires=3600`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub state: SubState,
    pub expires: Option<u32>,
    pub reason: Option<String>,
    /// Parameters other than expires/reason
    pub params: Vec<Param>,
}

impl SubscriptionState {
    pub fn active(expires: u32) -> Self {
        SubscriptionState {
            state: SubState::Active,
            expires: Some(expires),
            reason: None,
            params: Vec::new(),
        }
    }

    pub fn pending(expires: u32) -> Self {
        SubscriptionState {
            state: SubState::Pending,
            ..SubscriptionState::active(expires)
        }
    }

    pub fn terminated(reason: Option<&str>) -> Self {
        SubscriptionState {
            state: SubState::Terminated,
            expires: None,
            reason: reason.map(str::to_string),
            params: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SubState::Terminated
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(reason) = &self.reason {
            write!(f, ";reason={}", reason)?;
        }
        if let Some(expires) = self.expires {
            write!(f, ";expires={}", expires)?;
        }
        for p in &self.params {
            write!(f, ";{}", p)?;
        }
        Ok(())
    }
}

impl FromStr for SubscriptionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let (state, params) = match raw.find(';') {
            Some(semi) => (raw[..semi].trim(), &raw[semi..]),
            None => (raw, ""),
        };
        let state = match state.to_ascii_lowercase().as_str() {
            "active" => SubState::Active,
            "pending" => SubState::Pending,
            "terminated" => SubState::Terminated,
            "" => return Err(Error::malformed("Subscription-State", raw, "missing state")),
            other => SubState::Extension(other.to_string()),
        };
        let mut params = parse_params(params);
        let expires = match params.param_value("expires") {
            Some(v) => Some(v.parse::<u32>().map_err(|_| {
                Error::malformed("Subscription-State", raw, "non-numeric expires")
            })?),
            None => None,
        };
        let reason = params.param_value("reason").map(str::to_string);
        params.retain(|p| !p.is("expires") && !p.is("reason"));
        Ok(SubscriptionState {
            state,
            expires,
            reason,
            params,
        })
    }
}
