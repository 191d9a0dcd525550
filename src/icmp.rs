//! ICMP Echo wire format (RFC 792) and the bits of IPv4 we need to read replies.

use crate::error::MalformedMessage;

/// Minimal IPv4 header (no options).
pub const IPV4_HEADER_LEN: usize = 20;

/// Type, code, checksum, identifier and sequence.
pub const ECHO_HEADER_LEN: usize = 8;

/// Offset of the TTL field inside the IPv4 header.
const IPV4_TTL_OFFSET: usize = 8;

/// ICMP message type.
///
/// Kept as an open newtype so that types we do not know about still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IcmpType(pub u8);

impl IcmpType {
    pub const ECHO_REPLY: Self = Self(0);
    pub const DESTINATION_UNREACHABLE: Self = Self(3);
    pub const ECHO_REQUEST: Self = Self(8);
    pub const TIME_EXCEEDED: Self = Self(11);
    pub const PARAMETER_PROBLEM: Self = Self(12);

    pub const V6_ECHO_REQUEST: Self = Self(128);
    pub const V6_ECHO_REPLY: Self = Self(129);

    pub fn is_echo_request(self) -> bool {
        self == Self::ECHO_REQUEST || self == Self::V6_ECHO_REQUEST
    }

    pub fn is_echo_reply(self) -> bool {
        self == Self::ECHO_REPLY || self == Self::V6_ECHO_REPLY
    }

    /// Error messages that quote the datagram which triggered them.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::DESTINATION_UNREACHABLE | Self::TIME_EXCEEDED | Self::PARAMETER_PROBLEM
        )
    }
}

impl std::fmt::Display for IcmpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::ECHO_REPLY => write!(f, "echo reply"),
            Self::DESTINATION_UNREACHABLE => write!(f, "destination unreachable"),
            Self::ECHO_REQUEST => write!(f, "echo request"),
            Self::TIME_EXCEEDED => write!(f, "time exceeded"),
            Self::PARAMETER_PROBLEM => write!(f, "parameter problem"),
            Self::V6_ECHO_REQUEST => write!(f, "icmpv6 echo request"),
            Self::V6_ECHO_REPLY => write!(f, "icmpv6 echo reply"),
            Self(other) => write!(f, "type {}", other),
        }
    }
}

/// Body of an Echo Request or Echo Reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub identifier: u16,
    pub sequence: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Echo(Echo),
    /// Error message; `original` is the quoted IPv4 header plus at least
    /// 8 bytes of the datagram that caused it.
    Error { original: Vec<u8> },
    Raw(Vec<u8>),
}

/// A decoded ICMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: IcmpType,
    pub code: u8,
    pub checksum: u16,
    pub body: Body,
}

impl Message {
    pub fn echo(&self) -> Option<&Echo> {
        match &self.body {
            Body::Echo(echo) => Some(echo),
            _ => None,
        }
    }

    /// Identifier and sequence of the Echo Request quoted by an error message.
    pub fn quoted_echo(&self) -> Option<(u16, u16)> {
        let Body::Error { original } = &self.body else {
            return None;
        };
        let inner = strip_ipv4_header(original);
        if original.len() < IPV4_HEADER_LEN || inner.len() < ECHO_HEADER_LEN {
            return None;
        }
        if !IcmpType(inner[0]).is_echo_request() {
            return None;
        }
        Some((
            u16::from_be_bytes([inner[4], inner[5]]),
            u16::from_be_bytes([inner[6], inner[7]]),
        ))
    }
}

/// Internet checksum (RFC 1071).
pub fn checksum(mut data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    while data.len() >= 2 {
        sum = sum.wrapping_add(u16::from_be_bytes([data[0], data[1]]) as u32);
        data = &data[2..];
    }
    if !data.is_empty() {
        sum = sum.wrapping_add((data[0] as u32) << 8);
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Builds an ICMPv4 Echo Request (type=8, code=0).
pub fn encode_echo_request(
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<Vec<u8>, MalformedMessage> {
    encode_echo(IcmpType::ECHO_REQUEST, identifier, sequence, payload)
}

/// Builds an ICMPv4 Echo Reply (type=0, code=0).
pub fn encode_echo_reply(
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<Vec<u8>, MalformedMessage> {
    encode_echo(IcmpType::ECHO_REPLY, identifier, sequence, payload)
}

fn encode_echo(
    kind: IcmpType,
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<Vec<u8>, MalformedMessage> {
    let len = ECHO_HEADER_LEN + payload.len();
    if len > u16::MAX as usize {
        return Err(MalformedMessage::Oversized(len));
    }

    let mut pkt = Vec::with_capacity(len);

    // Type, code, checksum placeholder
    pkt.extend_from_slice(&[kind.0, 0, 0, 0]);
    pkt.extend_from_slice(&identifier.to_be_bytes());
    pkt.extend_from_slice(&sequence.to_be_bytes());
    pkt.extend_from_slice(payload);

    let csum = checksum(&pkt);
    pkt[2..4].copy_from_slice(&csum.to_be_bytes());

    Ok(pkt)
}

/// Returns the payload of a raw IPv4 datagram.
///
/// Buffers shorter than a minimal IPv4 header are returned unchanged: some
/// platforms hand out bare ICMP on raw sockets and we'd rather try to decode
/// than fail. A header length running past the buffer yields an empty slice.
pub fn strip_ipv4_header(datagram: &[u8]) -> &[u8] {
    if datagram.len() < IPV4_HEADER_LEN {
        return datagram;
    }
    let ihl = (datagram[0] & 0x0F) as usize * 4;
    datagram.get(ihl..).unwrap_or(&[])
}

/// TTL of a raw IPv4 datagram.
pub fn ipv4_ttl(datagram: &[u8]) -> Option<u8> {
    if datagram.len() < IPV4_HEADER_LEN {
        return None;
    }
    Some(datagram[IPV4_TTL_OFFSET])
}

/// Parses an ICMP message and verifies its checksum.
pub fn decode_icmp_message(bytes: &[u8]) -> Result<Message, MalformedMessage> {
    if bytes.len() < 4 {
        return Err(MalformedMessage::Truncated {
            expected: 4,
            actual: bytes.len(),
        });
    }

    let kind = IcmpType(bytes[0]);
    let code = bytes[1];
    let stored = u16::from_be_bytes([bytes[2], bytes[3]]);

    if (kind.is_echo_request() || kind.is_echo_reply() || kind.is_error())
        && bytes.len() < ECHO_HEADER_LEN
    {
        return Err(MalformedMessage::Truncated {
            expected: ECHO_HEADER_LEN,
            actual: bytes.len(),
        });
    }

    if checksum(bytes) != 0 {
        let mut zeroed = bytes.to_vec();
        zeroed[2] = 0;
        zeroed[3] = 0;
        return Err(MalformedMessage::BadChecksum {
            expected: checksum(&zeroed),
            actual: stored,
        });
    }

    let body = if kind.is_echo_request() || kind.is_echo_reply() {
        Body::Echo(Echo {
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
            data: bytes[ECHO_HEADER_LEN..].to_vec(),
        })
    } else if kind.is_error() {
        // 4 unused (or pointer/MTU) bytes precede the quoted datagram
        Body::Error {
            original: bytes[ECHO_HEADER_LEN..].to_vec(),
        }
    } else {
        Body::Raw(bytes[4..].to_vec())
    };

    Ok(Message {
        kind,
        code,
        checksum: stored,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_header(ttl: u8) -> Vec<u8> {
        let mut hdr = vec![0u8; IPV4_HEADER_LEN];
        hdr[0] = 0x45;
        hdr[IPV4_TTL_OFFSET] = ttl;
        hdr[9] = 1;
        hdr
    }

    #[test]
    fn test_checksum_zeros() {
        assert_eq!(checksum(&[0u8; 20]), 0xFFFF);
    }

    #[test]
    fn test_checksum_odd_length() {
        // 0x0102 + 0x0300 = 0x0402
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), !0x0402);
    }

    #[test]
    fn test_echo_request_layout() {
        let pkt = encode_echo_request(0xABCD, 7, b"PingPingPing").unwrap();

        assert_eq!(pkt.len(), ECHO_HEADER_LEN + 12);
        assert_eq!(pkt[0], 8);
        assert_eq!(pkt[1], 0);
        assert_eq!(&pkt[4..6], &[0xAB, 0xCD]);
        assert_eq!(&pkt[6..8], &[0x00, 0x07]);
        assert_eq!(&pkt[8..], b"PingPingPing");
        assert_eq!(checksum(&pkt), 0);
    }

    #[test]
    fn test_known_checksum() {
        // type 8, id 1, seq 1, no payload: ~(0x0800 + 0x0001 + 0x0001)
        let pkt = encode_echo_request(1, 1, &[]).unwrap();
        assert_eq!(u16::from_be_bytes([pkt[2], pkt[3]]), 0xF7FD);
    }

    #[test]
    fn test_roundtrip_request_and_reply() {
        for pkt in [
            encode_echo_request(4242, 65535, b"abc").unwrap(),
            encode_echo_reply(4242, 65535, b"abc").unwrap(),
        ] {
            let msg = decode_icmp_message(&pkt).unwrap();
            let echo = msg.echo().unwrap();
            assert_eq!(echo.identifier, 4242);
            assert_eq!(echo.sequence, 65535);
            assert_eq!(echo.data, b"abc");
        }
        let reply = decode_icmp_message(&encode_echo_reply(1, 2, &[]).unwrap()).unwrap();
        assert_eq!(reply.kind, IcmpType::ECHO_REPLY);
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let pkt = encode_echo_reply(0x1234, 9, b"PingPingPing").unwrap();
        for byte in ECHO_HEADER_LEN..pkt.len() {
            for bit in 0..8 {
                let mut corrupted = pkt.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(matches!(
                    decode_icmp_message(&corrupted),
                    Err(MalformedMessage::BadChecksum { .. })
                ));
            }
        }
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(
            decode_icmp_message(&[0, 0]),
            Err(MalformedMessage::Truncated { expected: 4, actual: 2 })
        ));
        assert!(matches!(
            decode_icmp_message(&[0, 0, 0xFF, 0xFF, 0, 0]),
            Err(MalformedMessage::Truncated { expected: 8, actual: 6 })
        ));
    }

    #[test]
    fn test_decode_unknown_type_as_raw() {
        let mut pkt = vec![42, 0, 0, 0, 1, 2];
        let csum = checksum(&pkt);
        pkt[2..4].copy_from_slice(&csum.to_be_bytes());

        let msg = decode_icmp_message(&pkt).unwrap();
        assert_eq!(msg.kind, IcmpType(42));
        assert_eq!(msg.body, Body::Raw(vec![1, 2]));
    }

    #[test]
    fn test_oversized_payload() {
        let payload = vec![0u8; u16::MAX as usize];
        assert!(matches!(
            encode_echo_request(1, 1, &payload),
            Err(MalformedMessage::Oversized(_))
        ));
    }

    #[test]
    fn test_strip_short_buffer_unchanged() {
        let buf = [0x45u8; 19];
        assert_eq!(strip_ipv4_header(&buf), &buf[..]);
    }

    #[test]
    fn test_strip_minimal_header() {
        let mut datagram = ipv4_header(64);
        datagram.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(strip_ipv4_header(&datagram), &[1, 2, 3, 4]);
        assert_eq!(ipv4_ttl(&datagram), Some(64));
    }

    #[test]
    fn test_strip_header_with_options() {
        let mut datagram = ipv4_header(64);
        datagram[0] = 0x46;
        datagram.extend_from_slice(&[0, 0, 0, 0, 9, 9]);
        assert_eq!(strip_ipv4_header(&datagram), &[9, 9]);
    }

    #[test]
    fn test_strip_header_longer_than_buffer() {
        let mut datagram = ipv4_header(64);
        datagram[0] = 0x4F;
        assert!(strip_ipv4_header(&datagram).is_empty());
    }

    #[test]
    fn test_quoted_echo_in_time_exceeded() {
        let mut original = ipv4_header(1);
        original.extend_from_slice(&encode_echo_request(0xBEEF, 3, &[]).unwrap());

        let mut pkt = vec![11, 0, 0, 0, 0, 0, 0, 0];
        pkt.extend_from_slice(&original);
        let csum = checksum(&pkt);
        pkt[2..4].copy_from_slice(&csum.to_be_bytes());

        let msg = decode_icmp_message(&pkt).unwrap();
        assert_eq!(msg.kind, IcmpType::TIME_EXCEEDED);
        assert_eq!(msg.quoted_echo(), Some((0xBEEF, 3)));
    }
}
