//! CONNECT handling and the TCP relay
//!
//! Dials the destination, maps dial failures to reply codes, and then
//! copies bytes in both directions. Each direction refreshes an idle
//! deadline before every read; a failure on either side ends both.

use crate::error::ReplyCode;
use crate::server::ServerContext;
use crate::socks::{write_error_reply, write_reply, TargetAddr};
use anyhow::{Context, Result};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const RELAY_BUF_SIZE: usize = 2048;

/// Handle a CONNECT request: dial, reply, relay.
///
/// No success is reported to the client before the remote dial completes;
/// on failure the mapped error reply is sent and the session ends.
pub async fn handle_connect(
    ctx: Arc<ServerContext>,
    mut client: TcpStream,
    dst: TargetAddr,
) -> Result<()> {
    let remote = match dial(&dst).await {
        Ok(remote) => remote,
        Err(e) => {
            write_error_reply(&mut client, ReplyCode::from(&e), &dst).await?;
            return Err(e).with_context(|| format!("Failed to connect to {dst}"));
        }
    };

    let bnd = TargetAddr::from(remote.local_addr()?);
    write_reply(&mut client, ReplyCode::Succeeded, &bnd)
        .await
        .context("Failed to send CONNECT reply")?;
    debug!("relay established to {dst} via {bnd}");

    relay(client, remote, ctx.config.tcp_timeout).await;
    Ok(())
}

async fn dial(dst: &TargetAddr) -> io::Result<TcpStream> {
    let addr = dst.resolve().await?;
    TcpStream::connect(addr).await
}

/// Copy bytes between client and remote until either direction ends.
///
/// EOF and I/O errors are not distinguished beyond the debug log; both
/// sockets close fully when this returns.
pub async fn relay(client: TcpStream, remote: TcpStream, timeout_secs: u64) {
    let idle = (timeout_secs != 0).then(|| Duration::from_secs(timeout_secs));
    let (client_read, client_write) = client.into_split();
    let (remote_read, remote_write) = remote.into_split();

    tokio::select! {
        res = copy_with_idle(client_read, remote_write, idle) => {
            log_direction("client->remote", res);
        }
        res = copy_with_idle(remote_read, client_write, idle) => {
            log_direction("remote->client", res);
        }
    }
}

fn log_direction(direction: &str, result: io::Result<u64>) {
    match result {
        Ok(bytes) => debug!("{direction} finished after {bytes} bytes"),
        Err(e) => debug!("{direction} ended: {e}"),
    }
}

/// One relay direction. The deadline covers only the read; writes block
/// until the peer drains them.
async fn copy_with_idle<R, W>(mut reader: R, mut writer: W, idle: Option<Duration>) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; RELAY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match idle {
            Some(deadline) => tokio::time::timeout(deadline, reader.read(&mut buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "relay idle deadline"))??,
            None => reader.read(&mut buf).await?,
        };
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}
