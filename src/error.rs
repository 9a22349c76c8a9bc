//! Errors surfaced by proxies.
//!
//! Nothing in this crate retries or recovers: every failure reaches the
//! caller of the operation that caused it.

use crate::descriptor::DefinitionError;
use crate::value::ValueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("no method '{member}' on {interface}")]
    UnknownMethod { interface: String, member: String },

    #[error("no property '{member}' on {interface}")]
    UnknownProperty { interface: String, member: String },

    #[error("no signal '{member}' on {interface}")]
    UnknownSignal { interface: String, member: String },

    #[error("signature mismatch for {member}: {reason}")]
    SignatureMismatch { member: String, reason: String },

    #[error("property '{member}' on {interface} is read-only")]
    PropertyReadOnly { interface: String, member: String },

    /// The remote side answered with a D-Bus error.
    #[error("{name}: {message}")]
    Remote { name: String, message: String },

    /// The bus connection failed; passed through untouched.
    #[error("bus connection error: {0}")]
    Transport(#[from] zbus::Error),
}

impl ProxyError {
    pub(crate) fn mismatch(member: &str, reason: impl ToString) -> Self {
        ProxyError::SignatureMismatch {
            member: member.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The remote error name, if this is a remote error.
    pub fn remote_name(&self) -> Option<&str> {
        match self {
            ProxyError::Remote { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<ValueError> for ProxyError {
    fn from(e: ValueError) -> Self {
        ProxyError::SignatureMismatch {
            member: "reply".to_string(),
            reason: e.to_string(),
        }
    }
}

/// Result alias used throughout the proxy layer.
pub type Result<T, E = ProxyError> = std::result::Result<T, E>;
