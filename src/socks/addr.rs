//! SOCKS5 address codec
//!
//! A SOCKS5 address is the (ATYP, ADDR, PORT) triple shared by requests,
//! replies, and UDP datagrams. [`TargetAddr`] is the typed form: the domain
//! variant stores the bare name, so the wire-level length prefix exists only
//! inside the codec.

use crate::error::ProtocolError;
use crate::socks::consts::*;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A SOCKS5 destination or bind address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    /// An IPv4 or IPv6 socket address
    Ip(SocketAddr),
    /// A domain name and port, resolved at dial time
    Domain(String, u16),
}

impl TargetAddr {
    /// Create an IPv4 target
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an IPv6 target
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a domain target
    pub fn domain(name: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(name.into(), port)
    }

    /// The ATYP byte this address encodes as
    pub fn atyp(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ATYP_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ATYP_IPV6,
            TargetAddr::Domain(..) => SOCKS5_ATYP_DOMAIN,
        }
    }

    /// The port component
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Read the ADDR and PORT fields from a stream, the ATYP byte having
    /// already been consumed by the frame header.
    pub async fn read_from<R>(stream: &mut R, atyp: u8) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        match atyp {
            SOCKS5_ATYP_IPV4 => {
                let mut buf = [0u8; 6];
                stream.read_exact(&mut buf).await?;
                let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                let port = u16::from_be_bytes([buf[4], buf[5]]);
                Ok(TargetAddr::ipv4(ip, port))
            }
            SOCKS5_ATYP_DOMAIN => {
                let len = stream.read_u8().await? as usize;
                if len == 0 {
                    return Err(ProtocolError::InvalidDomain);
                }
                let mut name = vec![0u8; len];
                stream.read_exact(&mut name).await?;
                let name = String::from_utf8(name).map_err(|_| ProtocolError::InvalidDomain)?;
                let port = stream.read_u16().await?;
                Ok(TargetAddr::Domain(name, port))
            }
            SOCKS5_ATYP_IPV6 => {
                let mut octets = [0u8; 16];
                stream.read_exact(&mut octets).await?;
                let port = stream.read_u16().await?;
                Ok(TargetAddr::ipv6(Ipv6Addr::from(octets), port))
            }
            other => Err(ProtocolError::UnknownAtyp(other)),
        }
    }

    /// Decode the ADDR and PORT fields from a byte slice, advancing it past
    /// the consumed bytes. Used by the datagram codec.
    pub fn decode(buf: &mut &[u8], atyp: u8) -> Result<Self, ProtocolError> {
        match atyp {
            SOCKS5_ATYP_IPV4 => {
                if buf.len() < 6 {
                    return Err(ProtocolError::TruncatedAddress);
                }
                let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                buf.advance(4);
                let port = buf.get_u16();
                Ok(TargetAddr::ipv4(ip, port))
            }
            SOCKS5_ATYP_DOMAIN => {
                if buf.is_empty() {
                    return Err(ProtocolError::TruncatedAddress);
                }
                let len = buf[0] as usize;
                buf.advance(1);
                if len == 0 {
                    return Err(ProtocolError::InvalidDomain);
                }
                if buf.len() < len + 2 {
                    return Err(ProtocolError::TruncatedAddress);
                }
                let name = String::from_utf8(buf[..len].to_vec())
                    .map_err(|_| ProtocolError::InvalidDomain)?;
                buf.advance(len);
                let port = buf.get_u16();
                Ok(TargetAddr::Domain(name, port))
            }
            SOCKS5_ATYP_IPV6 => {
                if buf.len() < 18 {
                    return Err(ProtocolError::TruncatedAddress);
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[..16]);
                buf.advance(16);
                let port = buf.get_u16();
                Ok(TargetAddr::ipv6(Ipv6Addr::from(octets), port))
            }
            other => Err(ProtocolError::UnknownAtyp(other)),
        }
    }

    /// Append the wire form (ATYP, ADDR, PORT) to a buffer.
    ///
    /// Domains get exactly one length prefix here; the stored name never
    /// carries it.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                buf.put_u8(SOCKS5_ATYP_IPV4);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                buf.put_u8(SOCKS5_ATYP_IPV6);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            TargetAddr::Domain(name, port) => {
                buf.put_u8(SOCKS5_ATYP_DOMAIN);
                buf.put_u8(name.len().min(MAX_DOMAIN_LEN) as u8);
                buf.put_slice(&name.as_bytes()[..name.len().min(MAX_DOMAIN_LEN)]);
                buf.put_u16(*port);
            }
        }
    }

    /// The wire form as a standalone byte vector
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Resolve to a socket address. Domains go through the system resolver;
    /// IP targets return immediately.
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        match self {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(name, port) => {
                tokio::net::lookup_host((name.as_str(), *port))
                    .await?
                    .next()
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::AddrNotAvailable,
                            format!("no addresses for {name}"),
                        )
                    })
            }
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{addr}"),
            TargetAddr::Domain(name, port) => write!(f, "{name}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_ipv4() {
        let mut cursor = Cursor::new(vec![192, 168, 1, 1, 0x1F, 0x90]);
        let addr = TargetAddr::read_from(&mut cursor, SOCKS5_ATYP_IPV4)
            .await
            .unwrap();
        assert_eq!(addr, TargetAddr::ipv4(Ipv4Addr::new(192, 168, 1, 1), 8080));
    }

    #[tokio::test]
    async fn test_read_domain() {
        let mut data = vec![11u8];
        data.extend_from_slice(b"example.com");
        data.extend_from_slice(&443u16.to_be_bytes());
        let mut cursor = Cursor::new(data);
        let addr = TargetAddr::read_from(&mut cursor, SOCKS5_ATYP_DOMAIN)
            .await
            .unwrap();
        assert_eq!(addr, TargetAddr::domain("example.com", 443));
    }

    #[tokio::test]
    async fn test_read_ipv6() {
        let mut data = vec![0u8; 16];
        data[15] = 1;
        data.extend_from_slice(&80u16.to_be_bytes());
        let mut cursor = Cursor::new(data);
        let addr = TargetAddr::read_from(&mut cursor, SOCKS5_ATYP_IPV6)
            .await
            .unwrap();
        assert_eq!(addr, TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 80));
    }

    #[tokio::test]
    async fn test_read_unknown_atyp() {
        let mut cursor = Cursor::new(vec![0u8; 8]);
        let err = TargetAddr::read_from(&mut cursor, 0x02).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAtyp(0x02)));
    }

    #[tokio::test]
    async fn test_read_zero_length_domain() {
        let mut cursor = Cursor::new(vec![0u8, 0, 80]);
        let err = TargetAddr::read_from(&mut cursor, SOCKS5_ATYP_DOMAIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidDomain));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let targets = [
            TargetAddr::ipv4(Ipv4Addr::new(10, 0, 0, 1), 80),
            TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 8443),
            TargetAddr::domain("proxy.test", 1080),
        ];
        for target in targets {
            let bytes = target.to_bytes();
            let mut slice = &bytes[1..];
            let decoded = TargetAddr::decode(&mut slice, bytes[0]).unwrap();
            assert_eq!(decoded, target);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_encode_domain_single_prefix() {
        let bytes = TargetAddr::domain("test.com", 53).to_bytes();
        assert_eq!(bytes[0], SOCKS5_ATYP_DOMAIN);
        assert_eq!(bytes[1], 8);
        assert_eq!(&bytes[2..10], b"test.com");
        assert_eq!(&bytes[10..], &53u16.to_be_bytes());
    }

    #[test]
    fn test_decode_truncated() {
        let mut slice: &[u8] = &[192, 168, 1];
        let err = TargetAddr::decode(&mut slice, SOCKS5_ATYP_IPV4).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedAddress));

        let mut slice: &[u8] = &[5, b'a', b'b'];
        let err = TargetAddr::decode(&mut slice, SOCKS5_ATYP_DOMAIN).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedAddress));

        let mut slice: &[u8] = &[0u8; 10];
        let err = TargetAddr::decode(&mut slice, SOCKS5_ATYP_IPV6).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedAddress));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TargetAddr::ipv4(Ipv4Addr::new(127, 0, 0, 1), 80).to_string(),
            "127.0.0.1:80"
        );
        assert_eq!(TargetAddr::domain("a.example", 53).to_string(), "a.example:53");
    }

    #[tokio::test]
    async fn test_resolve_ip_is_identity() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let resolved = TargetAddr::Ip(addr).resolve().await.unwrap();
        assert_eq!(resolved, addr);
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let resolved = TargetAddr::domain("localhost", 80).resolve().await.unwrap();
        assert_eq!(resolved.port(), 80);
        assert!(resolved.ip().is_loopback());
    }
}
