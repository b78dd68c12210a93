//! Method negotiation and username/password sub-negotiation codecs
//!
//! Server-side decoders for the two frames a client opens with, and the
//! single-byte-status replies the server answers them with (RFC 1928 §3,
//! RFC 1929).

use crate::error::ProtocolError;
use crate::socks::consts::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The client's opening method-negotiation frame
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRequest {
    /// Method bytes the client offers, in client order
    pub methods: Vec<u8>,
}

impl MethodRequest {
    /// Read a method-negotiation request from the stream
    pub async fn read_from<R>(stream: &mut R) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;
        if header[0] != SOCKS5_VERSION {
            return Err(ProtocolError::BadVersion(header[0]));
        }
        if header[1] == 0 {
            return Err(ProtocolError::NoMethods);
        }
        let mut methods = vec![0u8; header[1] as usize];
        stream.read_exact(&mut methods).await?;
        Ok(MethodRequest { methods })
    }

    /// Whether the client offered the given method byte
    pub fn offers(&self, method: u8) -> bool {
        self.methods.contains(&method)
    }

    /// The wire form, used by tests and by clients
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![SOCKS5_VERSION, self.methods.len() as u8];
        out.extend_from_slice(&self.methods);
        out
    }
}

/// Send the server's method selection: `VER | METHOD`
pub async fn write_method_reply<W>(stream: &mut W, method: u8) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS5_VERSION, method]).await?;
    stream.flush().await
}

/// The RFC 1929 username/password frame
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Credentials stay as raw bytes: the match against the configured pair is
/// byte-for-byte, and the wire does not promise UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPassRequest {
    /// Username octets
    pub uname: Vec<u8>,
    /// Password octets
    pub passwd: Vec<u8>,
}

impl UserPassRequest {
    /// Read a username/password sub-negotiation request from the stream
    pub async fn read_from<R>(stream: &mut R) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;
        if header[0] != SOCKS5_AUTH_VERSION {
            return Err(ProtocolError::BadSubVersion(header[0]));
        }
        let mut uname = vec![0u8; header[1] as usize];
        stream.read_exact(&mut uname).await?;

        let plen = stream.read_u8().await?;
        let mut passwd = vec![0u8; plen as usize];
        stream.read_exact(&mut passwd).await?;

        Ok(UserPassRequest { uname, passwd })
    }

    /// Byte-exact credential check
    pub fn matches(&self, username: &[u8], password: &[u8]) -> bool {
        self.uname == username && self.passwd == password
    }

    /// The wire form, used by tests and by clients
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![SOCKS5_AUTH_VERSION, self.uname.len() as u8];
        out.extend_from_slice(&self.uname);
        out.push(self.passwd.len() as u8);
        out.extend_from_slice(&self.passwd);
        out
    }
}

/// Send the sub-negotiation status: `0x01 | STATUS` (0x00 success)
pub async fn write_userpass_reply<W>(stream: &mut W, status: u8) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await
}
