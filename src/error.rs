//! Error types for the probe engine.

use crate::icmp::IcmpType;
use std::net::IpAddr;
use thiserror::Error;

/// Socket-level failure while probing.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open raw ICMP socket: {0}")]
    Open(#[source] std::io::Error),

    #[error("Not permitted to open raw ICMP socket: {0}")]
    PermissionDenied(#[source] std::io::Error),

    #[error("Failed to bind to address {addr}: {source}")]
    Bind {
        addr: IpAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: IpAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("Timed out waiting for reply")]
    Timeout,
}

impl TransportError {
    /// Classifies a socket creation error.
    pub fn open(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EPERM) | Some(libc::EACCES) => TransportError::PermissionDenied(err),
            _ if err.kind() == std::io::ErrorKind::PermissionDenied => {
                TransportError::PermissionDenied(err)
            }
            _ => TransportError::Open(err),
        }
    }

    /// Classifies a receive error; would-block means the read timeout fired.
    pub fn read(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                TransportError::Timeout
            }
            _ => TransportError::Read(err),
        }
    }
}

/// An ICMP buffer that cannot be encoded or decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("ICMP message too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("ICMP checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    BadChecksum { expected: u16, actual: u16 },

    #[error("ICMP message of {0} bytes does not fit in 16 bits")]
    Oversized(usize),
}

/// Failure of a single probe attempt. Always counted as a lost packet.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Malformed(#[from] MalformedMessage),

    #[error("{kind} (code {code})")]
    Unreachable { kind: IcmpType, code: u8 },
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Transport(TransportError::Timeout))
    }
}

/// Invalid engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid IP address: {0:?}")]
    InvalidAddress(String),

    #[error("IPv6 is not supported: {0}")]
    Ipv6Unsupported(IpAddr),
}
