use std::fmt;

use serde::{Deserialize, Serialize};

/// A generic `name[=value]` parameter as found on URIs, name-addrs and Via
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        Param {
            name: name.into(),
            value: value.map(Into::into),
        }
    }

    /// A valueless parameter such as `lr` or `isfocus`
    pub fn flag(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            value: None,
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Param::new("tag", Some(tag))
    }

    pub fn branch(branch: impl Into<String>) -> Self {
        Param::new("branch", Some(branch))
    }

    /// Case-insensitive name comparison, as parameter names are
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

/// Lookup helpers over parameter lists
pub trait ParamList {
    fn find_param(&self, name: &str) -> Option<&Param>;
    fn param_value(&self, name: &str) -> Option<&str> {
        self.find_param(name).and_then(|p| p.value.as_deref())
    }
    fn has_param(&self, name: &str) -> bool {
        self.find_param(name).is_some()
    }
}

impl ParamList for Vec<Param> {
    fn find_param(&self, name: &str) -> Option<&Param> {
        self.iter().find(|p| p.is(name))
    }
}

/// Replaces an existing parameter of the same name or appends a new one
pub(crate) fn set_param(params: &mut Vec<Param>, param: Param) {
    if let Some(existing) = params.iter_mut().find(|p| p.is(&param.name)) {
        *existing = param;
    } else {
        params.push(param);
    }
}

pub(crate) fn write_params(f: &mut fmt::Formatter<'_>, params: &[Param]) -> fmt::Result {
    for p in params {
        write!(f, ";{}", p)?;
    }
    Ok(())
}
