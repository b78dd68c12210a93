//! Error types for socksd
//!
//! Defines the typed protocol errors produced by the wire codecs and the
//! reply-code mapping used when a CONNECT dial fails.

use std::io;
use thiserror::Error;

/// Errors produced while decoding SOCKS5 frames.
///
/// Each variant classifies one way a frame can be malformed, so callers
/// can decide between replying (where the protocol permits) and closing.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The peer closed the stream mid-frame
    #[error("short read: {0}")]
    UnexpectedEof(#[from] io::Error),

    /// VER byte was not 0x05
    #[error("bad SOCKS version: {0:#04x}")]
    BadVersion(u8),

    /// Username/password sub-negotiation VER byte was not 0x01
    #[error("bad auth sub-negotiation version: {0:#04x}")]
    BadSubVersion(u8),

    /// RSV byte was not zero
    #[error("bad reserved byte: {0:#04x}")]
    BadReserved(u8),

    /// ATYP byte was none of IPv4/Domain/IPv6
    #[error("unknown address type: {0:#04x}")]
    UnknownAtyp(u8),

    /// Address bytes shorter than the ATYP demands
    #[error("truncated address")]
    TruncatedAddress,

    /// Domain name was empty or not valid UTF-8
    #[error("invalid domain name")]
    InvalidDomain,

    /// Negotiation request carried zero methods
    #[error("no authentication methods offered")]
    NoMethods,

    /// CMD byte was none of CONNECT/BIND/UDP ASSOCIATE
    #[error("unknown command: {0:#04x}")]
    UnknownCommand(u8),
}

/// Session-terminating conditions that have already produced their
/// protocol-level reply.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Credentials did not match; failure status was sent
    #[error("username/password authentication failed")]
    AuthFailed,

    /// Client offered no method the server accepts; 0xFF was sent
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    /// Command outside the supported set; reply 0x07 was sent
    #[error("unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),
}

/// Reply codes for the SOCKS5 reply frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Request succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddressTypeNotSupported),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            io::ErrorKind::HostUnreachable => ReplyCode::HostUnreachable,
            io::ErrorKind::AddrNotAvailable => ReplyCode::HostUnreachable,
            io::ErrorKind::TimedOut => ReplyCode::HostUnreachable,
            _ => ReplyCode::GeneralFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code_round_trip() {
        for byte in 0x00u8..=0x08 {
            let code = ReplyCode::try_from(byte).unwrap();
            assert_eq!(u8::from(code), byte);
        }
    }

    #[test]
    fn test_reply_code_invalid() {
        assert!(ReplyCode::try_from(0x09).is_err());
        assert!(ReplyCode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_reply_code_from_io_error() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, ReplyCode::ConnectionRefused),
            (io::ErrorKind::NetworkUnreachable, ReplyCode::NetworkUnreachable),
            (io::ErrorKind::HostUnreachable, ReplyCode::HostUnreachable),
            (io::ErrorKind::AddrNotAvailable, ReplyCode::HostUnreachable),
            (io::ErrorKind::TimedOut, ReplyCode::HostUnreachable),
            (io::ErrorKind::PermissionDenied, ReplyCode::GeneralFailure),
            (io::ErrorKind::Other, ReplyCode::GeneralFailure),
        ];
        for (kind, expected) in cases {
            let err = io::Error::new(kind, "test");
            assert_eq!(ReplyCode::from(&err), expected);
        }
    }

    #[test]
    fn test_protocol_error_display() {
        assert_eq!(
            format!("{}", ProtocolError::BadVersion(0x04)),
            "bad SOCKS version: 0x04"
        );
        assert_eq!(
            format!("{}", ProtocolError::UnknownAtyp(0x02)),
            "unknown address type: 0x02"
        );
        assert_eq!(
            format!("{}", ProtocolError::TruncatedAddress),
            "truncated address"
        );
    }

    #[test]
    fn test_session_error_display() {
        assert_eq!(
            format!("{}", SessionError::AuthFailed),
            "username/password authentication failed"
        );
        assert_eq!(
            format!("{}", SessionError::UnsupportedCommand(0x02)),
            "unsupported command: 0x02"
        );
    }
}
