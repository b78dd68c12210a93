//! UDP datagram routing
//!
//! Demultiplexes the server's single UDP socket into per-(client, dst)
//! exchanges. A datagram either reuses its exchange's remote socket or
//! creates one, and each exchange runs one pump task carrying remote
//! replies back through the server socket until the exchange dies: idle
//! deadline, remote error, or the controlling TCP association closing.

use crate::assoc::{AssocSignal, ExchangeKey, UdpExchange};
use crate::server::ServerContext;
use crate::socks::{TargetAddr, UdpDatagram, MAX_UDP_DATAGRAM};
use anyhow::{bail, Context, Result};
use bytes::Bytes;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

/// Route one inbound datagram from a client UDP source.
///
/// Applies the association policy, then either forwards along the
/// existing exchange or dials a new remote socket and spawns its pump.
pub async fn route_datagram(
    ctx: Arc<ServerContext>,
    client: SocketAddr,
    datagram: UdpDatagram,
) -> Result<()> {
    let signal = match ctx.assoc.signal(&client) {
        Some(signal) => signal,
        None if ctx.config.limit_udp => {
            bail!("udp source {client} is not associated with a tcp connection")
        }
        // unlimited mode: a never-closed stand-in keeps the pump's select well-formed
        None => AssocSignal::new(),
    };

    let key = ExchangeKey::new(client, &datagram.addr);
    if let Some(exchange) = ctx.assoc.exchange(&key) {
        return forward(&exchange, &signal, &datagram.payload).await;
    }

    let dst = datagram
        .addr
        .resolve()
        .await
        .with_context(|| format!("Failed to resolve udp target {}", datagram.addr))?;

    let (remote, reused_hint) = dial_udp(ctx.assoc.source_hint(&key), dst).await?;
    if !reused_hint {
        ctx.assoc.store_source_hint(&key, remote.local_addr()?);
    }

    let exchange = Arc::new(UdpExchange {
        client_addr: client,
        remote,
    });
    debug!(
        "new udp exchange {client} -> {} (local {})",
        datagram.addr,
        exchange.remote.local_addr()?
    );

    forward(&exchange, &signal, &datagram.payload).await?;
    ctx.assoc.insert_exchange(&key, exchange.clone());

    let pump_ctx = ctx.clone();
    let dst_addr = datagram.addr.clone();
    ctx.tracker.clone().spawn(async move {
        pump(pump_ctx, key, exchange, signal, dst_addr).await;
    });
    Ok(())
}

/// Write a payload toward the remote, unless the association already died
async fn forward(exchange: &UdpExchange, signal: &AssocSignal, payload: &[u8]) -> Result<()> {
    if signal.is_closed() {
        bail!(
            "association for {} closed, dropping datagram",
            exchange.client_addr
        );
    }
    exchange
        .remote
        .send(payload)
        .await
        .context("Failed to send to udp remote")?;
    Ok(())
}

/// Dial a connected UDP socket toward `dst`, preferring the hinted local
/// address so the remote keeps seeing one source port. A hint the OS
/// rejects with `AddrInUse`/`AddrNotAvailable` falls back to an ephemeral
/// port; the second element reports whether the hint was used.
async fn dial_udp(hint: Option<SocketAddr>, dst: SocketAddr) -> io::Result<(UdpSocket, bool)> {
    if let Some(local) = hint {
        match bind_connect(local, dst).await {
            Ok(socket) => return Ok((socket, true)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable
                ) => {}
            Err(e) => return Err(e),
        }
    }
    let local = match dst {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = bind_connect(local, dst).await?;
    Ok((socket, false))
}

async fn bind_connect(local: SocketAddr, dst: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(local).await?;
    socket.connect(dst).await?;
    Ok(socket)
}

/// Carry remote replies back to the client until the exchange dies.
///
/// Whichever comes first ends the pump: a remote read error, the idle
/// deadline, or the association signal closing. The exchange entry is
/// removed under the same key it was created with, and dropping the
/// exchange closes the remote socket.
async fn pump(
    ctx: Arc<ServerContext>,
    key: ExchangeKey,
    exchange: Arc<UdpExchange>,
    signal: AssocSignal,
    dst: TargetAddr,
) {
    let idle = (ctx.config.udp_timeout != 0).then(|| Duration::from_secs(ctx.config.udp_timeout));
    let mut buf = vec![0u8; MAX_UDP_DATAGRAM];

    loop {
        let received = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = signal.closed() => {
                debug!("association for {} closed, ending exchange", exchange.client_addr);
                break;
            }
            res = recv_with_idle(&exchange.remote, &mut buf, idle) => res,
        };
        let len = match received {
            Ok(len) => len,
            Err(e) => {
                debug!("udp exchange for {} ended: {e}", exchange.client_addr);
                break;
            }
        };

        let reply = UdpDatagram::new(dst.clone(), Bytes::copy_from_slice(&buf[..len]));
        if let Err(e) = ctx
            .udp_socket
            .send_to(&reply.to_bytes(), exchange.client_addr)
            .await
        {
            debug!("failed to send to client {}: {e}", exchange.client_addr);
            break;
        }
    }

    ctx.assoc.remove_exchange(&key);
}

async fn recv_with_idle(
    socket: &UdpSocket,
    buf: &mut [u8],
    idle: Option<Duration>,
) -> io::Result<usize> {
    match idle {
        Some(deadline) => tokio::time::timeout(deadline, socket.recv(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "udp idle deadline"))?,
        None => socket.recv(buf).await,
    }
}
