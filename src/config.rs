use crate::error::ConfigError;
use std::net::IpAddr;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Payload carried by every Echo Request unless overridden.
pub const DEFAULT_PAYLOAD: &[u8] = b"PingPingPing";

/// Validated engine configuration.
#[derive(Debug, Clone)]
pub struct PingerConfig {
    pub local: IpAddr,
    pub remote: IpAddr,
    /// How long a single probe waits for its reply.
    pub timeout: Duration,
    /// Pause after each probe.
    pub interval: Duration,
    /// Number of probes to send; `None` runs until finished externally.
    pub count: Option<u64>,
    pub payload: Vec<u8>,
}

impl PingerConfig {
    /// Parses textual addresses. A negative `count` means unbounded.
    pub fn new(
        local: &str,
        remote: &str,
        timeout: Duration,
        count: i64,
    ) -> Result<Self, ConfigError> {
        let local = parse_ipv4(local)?;
        let remote = parse_ipv4(remote)?;

        Ok(Self {
            local,
            remote,
            timeout,
            interval: DEFAULT_INTERVAL,
            count: u64::try_from(count).ok(),
            payload: DEFAULT_PAYLOAD.to_vec(),
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }
}

fn parse_ipv4(s: &str) -> Result<IpAddr, ConfigError> {
    let addr: IpAddr = s
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
    if addr.is_ipv6() {
        return Err(ConfigError::Ipv6Unsupported(addr));
    }
    Ok(addr)
}
