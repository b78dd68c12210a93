//! SOCKS5 request and reply codecs
//!
//! The request frame carries the client's command and destination; the
//! reply frame mirrors it with a status code and a BND address.

use crate::error::{ProtocolError, ReplyCode};
use crate::socks::addr::TargetAddr;
use crate::socks::consts::*;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// SOCKS5 commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Establish a TCP connection to the destination
    Connect,
    /// Listen for an inbound TCP connection (not supported here)
    Bind,
    /// Set up a UDP relay association
    UdpAssociate,
}

impl Command {
    /// Parse from the CMD byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_CONNECT => Some(Command::Connect),
            SOCKS5_CMD_BIND => Some(Command::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(Command::UdpAssociate),
            _ => None,
        }
    }

    /// The CMD byte
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Connect => SOCKS5_CMD_CONNECT,
            Command::Bind => SOCKS5_CMD_BIND,
            Command::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// A parsed SOCKS5 request
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The requested command
    pub command: Command,
    /// The destination address triple
    pub addr: TargetAddr,
}

impl Request {
    /// Read a request frame from the stream
    pub async fn read_from<R>(stream: &mut R) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;

        if header[0] != SOCKS5_VERSION {
            return Err(ProtocolError::BadVersion(header[0]));
        }
        if header[2] != SOCKS5_RESERVED {
            return Err(ProtocolError::BadReserved(header[2]));
        }
        let command =
            Command::from_byte(header[1]).ok_or(ProtocolError::UnknownCommand(header[1]))?;
        let addr = TargetAddr::read_from(stream, header[3]).await?;

        Ok(Request { command, addr })
    }

    /// The wire form, used by tests and by clients
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(SOCKS5_VERSION);
        buf.put_u8(self.command.to_byte());
        buf.put_u8(SOCKS5_RESERVED);
        self.addr.encode(&mut buf);
        buf.to_vec()
    }
}

/// Send a reply frame: `VER | REP | RSV | ATYP | BND.ADDR | BND.PORT`
pub async fn write_reply<W>(
    stream: &mut W,
    code: ReplyCode,
    bnd: &TargetAddr,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(code.into());
    buf.put_u8(SOCKS5_RESERVED);
    bnd.encode(&mut buf);
    stream.write_all(&buf).await?;
    stream.flush().await
}

/// Send an error reply whose zero BND address matches the address-family
/// class of the request: IPv4-zero for IPv4 and domain requests, IPv6-zero
/// for IPv6 requests.
pub async fn write_error_reply<W>(
    stream: &mut W,
    code: ReplyCode,
    request_addr: &TargetAddr,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bnd = match request_addr.atyp() {
        SOCKS5_ATYP_IPV6 => TargetAddr::ipv6(Ipv6Addr::UNSPECIFIED, 0),
        _ => TargetAddr::ipv4(Ipv4Addr::UNSPECIFIED, 0),
    };
    write_reply(stream, code, &bnd).await
}

/// Decode a reply frame from a byte slice, used by tests and by clients
pub fn parse_reply(data: &[u8]) -> Result<(ReplyCode, TargetAddr), ProtocolError> {
    if data.len() < 4 {
        return Err(ProtocolError::TruncatedAddress);
    }
    if data[0] != SOCKS5_VERSION {
        return Err(ProtocolError::BadVersion(data[0]));
    }
    if data[2] != SOCKS5_RESERVED {
        return Err(ProtocolError::BadReserved(data[2]));
    }
    let code = ReplyCode::try_from(data[1])?;
    let mut slice = &data[4..];
    let bnd = TargetAddr::decode(&mut slice, data[3])?;
    Ok((code, bnd))
}
