//! A single Echo Request / Echo Reply round trip.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{ProbeError, TransportError};
use crate::icmp::{self, ECHO_HEADER_LEN};
use crate::socket::{Connection, Connector};

/// Smallest receive buffer (typical MTU).
const RECV_BUF_LEN: usize = 1500;

/// IPv4 header with the maximum 40 bytes of options.
const MAX_IPV4_HEADER_LEN: usize = 60;

/// Identifier carried by every probe of this process.
pub fn process_identifier() -> u16 {
    std::process::id() as u16
}

/// Outcome of a successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub sequence: u16,
    pub rtt: Duration,
    pub ttl: u8,
    /// Size of the reply's ICMP message.
    pub bytes: usize,
}

/// Things that happen during a probe which the caller may care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    /// The Echo Request left; `bytes` is its ICMP size.
    Sent { sequence: u16, bytes: usize },
    /// An Echo Reply for one of our other sequence numbers showed up.
    Stray { sequence: u16 },
}

/// Sends Echo Requests from `local` to `remote` over connections opened by `C`.
pub struct Prober<C> {
    connector: C,
    local: IpAddr,
    remote: IpAddr,
    timeout: Duration,
    identifier: u16,
    payload: Vec<u8>,
}

impl<C: Connector> Prober<C> {
    pub fn new(connector: C, local: IpAddr, remote: IpAddr, timeout: Duration) -> Self {
        Self {
            connector,
            local,
            remote,
            timeout,
            identifier: process_identifier(),
            payload: crate::config::DEFAULT_PAYLOAD.to_vec(),
        }
    }

    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// Sends one Echo Request and waits for the matching reply.
    ///
    /// Echo Replies are matched on identifier and sequence. Replies carrying
    /// our identifier but another sequence are reported as
    /// [`ProbeEvent::Stray`] and skipped. ICMP errors quoting this probe end
    /// it with [`ProbeError::Unreachable`].
    pub fn probe(
        &self,
        sequence: u16,
        events: &mut dyn FnMut(ProbeEvent),
    ) -> Result<ProbeResult, ProbeError> {
        let start = Instant::now();
        let deadline = start + self.timeout;

        let mut conn = self.connector.connect(self.local, self.remote)?;

        let pkt = icmp::encode_echo_request(self.identifier, sequence, &self.payload)?;
        conn.send(&pkt)?;
        events(ProbeEvent::Sent {
            sequence,
            bytes: pkt.len(),
        });

        // Large enough for the whole reply, or it fails its checksum
        let buf_len = (MAX_IPV4_HEADER_LEN + ECHO_HEADER_LEN + self.payload.len()).max(RECV_BUF_LEN);
        let mut buf = vec![0u8; buf_len];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout.into());
            }

            let n = conn.recv(&mut buf, remaining)?;
            let datagram = &buf[..n];
            let ttl = icmp::ipv4_ttl(datagram).unwrap_or(0);
            let payload = icmp::strip_ipv4_header(datagram);
            let msg = icmp::decode_icmp_message(payload)?;

            // Our own request looped back, or someone else's
            if msg.kind.is_echo_request() {
                continue;
            }

            if msg.kind.is_error() {
                match msg.quoted_echo() {
                    Some((id, seq)) if id == self.identifier && seq == sequence => {
                        return Err(ProbeError::Unreachable {
                            kind: msg.kind,
                            code: msg.code,
                        });
                    }
                    _ => {
                        trace!(kind = %msg.kind, "Ignored ICMP error for another probe");
                        continue;
                    }
                }
            }

            let Some(echo) = msg.echo() else {
                trace!(kind = %msg.kind, "Ignored unrelated ICMP message");
                continue;
            };

            if echo.identifier != self.identifier {
                trace!(
                    expected = self.identifier,
                    actual = echo.identifier,
                    "Ignored Echo Reply with different identifier"
                );
                continue;
            }

            if echo.sequence != sequence {
                events(ProbeEvent::Stray {
                    sequence: echo.sequence,
                });
                continue;
            }

            return Ok(ProbeResult {
                sequence,
                rtt: start.elapsed(),
                ttl,
                bytes: payload.len(),
            });
        }
    }
}
