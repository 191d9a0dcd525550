//! Raw ICMP sockets, behind a small factory trait so probes can be driven
//! by something other than the network.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::TransportError;

// SOCK_RAW is 3 everywhere we care about; libc::SOCK_RAW is missing on Windows.
const SOCK_RAW: i32 = 3;

const MIN_READ_TIMEOUT: Duration = Duration::from_micros(1);

/// One open ICMP conversation with a remote host.
pub trait Connection {
    fn send(&mut self, packet: &[u8]) -> Result<usize, TransportError>;

    /// Reads one raw IPv4 datagram, waiting at most `timeout`.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}

/// Opens connections. Called once per probe.
pub trait Connector: Send + Sync {
    type Conn: Connection;

    fn connect(&self, local: IpAddr, remote: IpAddr) -> Result<Self::Conn, TransportError>;
}

/// Opens `AF_INET / SOCK_RAW / IPPROTO_ICMP` sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSocketConnector;

pub struct RawSocket {
    sock: Socket,
}

impl Connector for RawSocketConnector {
    type Conn = RawSocket;

    fn connect(&self, local: IpAddr, remote: IpAddr) -> Result<RawSocket, TransportError> {
        let sock = open_raw_icmp()?;

        // Port is ignored for ICMP
        let local_sa = SockAddr::from(SocketAddr::new(local, 0));
        sock.bind(&local_sa).map_err(|source| TransportError::Bind {
            addr: local,
            source,
        })?;

        let remote_sa = SockAddr::from(SocketAddr::new(remote, 0));
        sock.connect(&remote_sa)
            .map_err(|source| TransportError::Connect {
                addr: remote,
                source,
            })?;

        Ok(RawSocket { sock })
    }
}

impl Connection for RawSocket {
    fn send(&mut self, packet: &[u8]) -> Result<usize, TransportError> {
        self.sock.send(packet).map_err(TransportError::Write)
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        // Below 1µs the timeval is zero, which SO_RCVTIMEO takes as "block forever"
        if timeout < MIN_READ_TIMEOUT {
            return Err(TransportError::Timeout);
        }
        self.sock
            .set_read_timeout(Some(timeout))
            .map_err(TransportError::Read)?;
        self.sock.read(buf).map_err(TransportError::read)
    }
}

/// Creates an unbound raw ICMPv4 socket.
pub fn open_raw_icmp() -> Result<Socket, TransportError> {
    Socket::new(Domain::IPV4, Type::from(SOCK_RAW), Some(Protocol::ICMPV4))
        .map_err(TransportError::open)
}
