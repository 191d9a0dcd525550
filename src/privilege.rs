//! Process-wide check for raw socket access.

use std::sync::OnceLock;

use tracing::debug;

use crate::error::TransportError;
use crate::socket::open_raw_icmp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    Granted,
    /// Raw sockets are refused; holds the OS error text.
    Denied(String),
}

static PRIVILEGE: OnceLock<Privilege> = OnceLock::new();

/// Result of trying to open a raw ICMP socket, computed once per process.
pub fn check() -> &'static Privilege {
    PRIVILEGE.get_or_init(|| match open_raw_icmp() {
        Ok(_) => Privilege::Granted,
        Err(err) => {
            debug!(error = %err, "Raw ICMP socket refused");
            Privilege::Denied(describe(&err))
        }
    })
}

pub fn has_privilege() -> bool {
    matches!(check(), Privilege::Granted)
}

/// Why raw sockets are unavailable, if they are.
pub fn denial_reason() -> Option<&'static str> {
    match check() {
        Privilege::Granted => None,
        Privilege::Denied(reason) => Some(reason.as_str()),
    }
}

fn describe(err: &TransportError) -> String {
    match err {
        TransportError::PermissionDenied(_) => format!(
            "{}. Run as root/Administrator or grant CAP_NET_RAW.",
            err
        ),
        other => other.to_string(),
    }
}
