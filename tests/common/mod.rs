//! Test utilities for socksd integration tests
//!
//! Helpers to spin up a server on an ephemeral port, run throwaway echo
//! services, and speak the client side of the SOCKS5 handshake.

use socksd::config::ServerConfig;
use socksd::server::{DefaultHandler, Server, ServerContext};
use socksd::socks::parse_reply;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Bind a server on an ephemeral port and start serving in the background
pub async fn spawn_server(config: ServerConfig) -> (Arc<ServerContext>, SocketAddr) {
    let config = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        ..config
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let ctx = server.context();
    tokio::spawn(server.serve(Arc::new(DefaultHandler)));
    (ctx, addr)
}

/// A TCP service answering every "PING" with "PONG"
pub async fn spawn_tcp_pong() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                while stream.read_exact(&mut buf).await.is_ok() {
                    if &buf == b"PING" {
                        let _ = stream.write_all(b"PONG").await;
                    }
                }
            });
        }
    });
    addr
}

/// A UDP service echoing every datagram back to its sender
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..len], from).await;
        }
    });
    addr
}

/// A UDP service reporting each sender address without replying
pub async fn spawn_udp_observer() -> (SocketAddr, tokio::sync::mpsc::UnboundedReceiver<SocketAddr>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        while let Ok((_, from)) = socket.recv_from(&mut buf).await {
            if tx.send(from).is_err() {
                break;
            }
        }
    });
    (addr, rx)
}

/// Complete the NoAuth method negotiation
pub async fn negotiate_noauth(stream: &mut TcpStream) {
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

/// Offer UserPass and run the sub-negotiation; returns the status byte
pub async fn negotiate_userpass(stream: &mut TcpStream, username: &[u8], password: &[u8]) -> u8 {
    stream.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);

    let mut frame = vec![0x01, username.len() as u8];
    frame.extend_from_slice(username);
    frame.push(password.len() as u8);
    frame.extend_from_slice(password);
    stream.write_all(&frame).await.unwrap();

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await.unwrap();
    assert_eq!(status[0], 0x01);
    status[1]
}

/// Send a request frame for the given command and IPv4 destination
pub async fn send_request(stream: &mut TcpStream, cmd: u8, dst: SocketAddr) {
    let SocketAddr::V4(dst) = dst else {
        panic!("test destinations are IPv4");
    };
    let mut frame = vec![0x05, cmd, 0x00, 0x01];
    frame.extend_from_slice(&dst.ip().octets());
    frame.extend_from_slice(&dst.port().to_be_bytes());
    stream.write_all(&frame).await.unwrap();
}

/// Read a full reply frame and decode it
pub async fn read_reply(stream: &mut TcpStream) -> (u8, SocketAddr) {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let addr_len = match header[3] {
        0x01 => 6,
        0x04 => 18,
        other => panic!("unexpected ATYP {other}"),
    };
    let mut rest = vec![0u8; addr_len];
    stream.read_exact(&mut rest).await.unwrap();

    let mut frame = header.to_vec();
    frame.extend_from_slice(&rest);
    let (code, bnd) = parse_reply(&frame).unwrap();
    let bnd = match bnd {
        socksd::socks::TargetAddr::Ip(addr) => addr,
        other => panic!("unexpected BND {other}"),
    };
    (code.into(), bnd)
}

/// Wrap a payload in an unfragmented UDP request datagram for an IPv4 dst
pub fn udp_request(dst: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let SocketAddr::V4(dst) = dst else {
        panic!("test destinations are IPv4");
    };
    let mut frame = vec![0x00, 0x00, 0x00, 0x01];
    frame.extend_from_slice(&dst.ip().octets());
    frame.extend_from_slice(&dst.port().to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
