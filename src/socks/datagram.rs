//! UDP datagram encapsulation codec
//!
//! Every datagram crossing the server's UDP socket is wrapped in the
//! SOCKS5 UDP request header.

use crate::error::ProtocolError;
use crate::socks::addr::TargetAddr;
use crate::socks::consts::SOCKS5_RESERVED;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A SOCKS5-encapsulated UDP datagram
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    /// Fragment number; only 0 (standalone) is relayed
    pub frag: u8,
    /// Destination (client→server) or source (server→client) address
    pub addr: TargetAddr,
    /// The encapsulated payload
    pub payload: Bytes,
}

impl UdpDatagram {
    /// Wrap a payload in an unfragmented datagram
    pub fn new(addr: TargetAddr, payload: Bytes) -> Self {
        UdpDatagram {
            frag: 0,
            addr,
            payload,
        }
    }

    /// Whether the datagram is part of a fragment train
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }

    /// Parse a datagram from a received UDP packet
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 4 {
            return Err(ProtocolError::TruncatedAddress);
        }
        let mut buf = data;
        let rsv = buf.get_u16();
        if rsv != 0 {
            return Err(ProtocolError::BadReserved((rsv & 0xFF) as u8));
        }
        let frag = buf.get_u8();
        let atyp = buf.get_u8();
        let addr = TargetAddr::decode(&mut buf, atyp)?;
        let payload = Bytes::copy_from_slice(buf);

        Ok(UdpDatagram { frag, addr, payload })
    }

    /// The wire form, ready for a single `send_to`
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.payload.len() + 19);
        buf.put_u16(0);
        buf.put_u8(self.frag);
        self.addr.encode(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
