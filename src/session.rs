//! Per-connection TCP state machine
//!
//! Drives a client connection through negotiation, optional
//! username/password authentication, and command gating, then dispatches
//! to the CONNECT or UDP ASSOCIATE handler. Every terminating path has
//! already written the reply the protocol calls for.

use crate::error::{ReplyCode, SessionError};
use crate::relay;
use crate::server::{Handler, ServerContext};
use crate::socks::{
    write_error_reply, write_method_reply, write_reply, write_userpass_reply, Command,
    MethodRequest, Request, TargetAddr, UserPassRequest, SOCKS5_AUTH_METHOD_NONE,
    SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE, SOCKS5_AUTH_METHOD_PASSWORD,
    SOCKS5_AUTH_STATUS_FAILURE, SOCKS5_AUTH_STATUS_SUCCESS,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Run one client connection from negotiation through dispatch
pub async fn run(
    ctx: Arc<ServerContext>,
    handler: Arc<dyn Handler>,
    mut stream: TcpStream,
) -> Result<()> {
    negotiate(&mut stream, &ctx).await?;
    let request = read_request(&mut stream).await?;
    info!("{} request for {}", request.command, request.addr);
    handler.handle_tcp(ctx, stream, request).await
}

/// Method negotiation plus the RFC 1929 sub-negotiation when credentials
/// are configured. GSSAPI (0x01) is never offered.
async fn negotiate<S>(stream: &mut S, ctx: &ServerContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let offered = MethodRequest::read_from(stream).await?;
    let method = if ctx.config.has_credentials() {
        SOCKS5_AUTH_METHOD_PASSWORD
    } else {
        SOCKS5_AUTH_METHOD_NONE
    };

    if !offered.offers(method) {
        write_method_reply(stream, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE).await?;
        return Err(SessionError::NoAcceptableMethod.into());
    }
    write_method_reply(stream, method).await?;

    if method == SOCKS5_AUTH_METHOD_PASSWORD {
        authenticate(stream, ctx).await?;
    }
    Ok(())
}

/// Byte-exact credential check against the configured pair
async fn authenticate<S>(stream: &mut S, ctx: &ServerContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = UserPassRequest::read_from(stream).await?;
    let username = ctx.config.username.as_deref().unwrap_or_default();
    let password = ctx.config.password.as_deref().unwrap_or_default();

    if request.matches(username.as_bytes(), password.as_bytes()) {
        write_userpass_reply(stream, SOCKS5_AUTH_STATUS_SUCCESS).await?;
        debug!("authenticated user {}", String::from_utf8_lossy(&request.uname));
        Ok(())
    } else {
        write_userpass_reply(stream, SOCKS5_AUTH_STATUS_FAILURE).await?;
        Err(SessionError::AuthFailed.into())
    }
}

/// Read the request frame and gate the command. BIND gets reply 0x07 with
/// a zero BND matching the request's address-family class.
async fn read_request<S>(stream: &mut S) -> Result<Request>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = Request::read_from(stream).await?;
    match request.command {
        Command::Connect | Command::UdpAssociate => Ok(request),
        Command::Bind => {
            write_error_reply(stream, ReplyCode::CommandNotSupported, &request.addr).await?;
            Err(SessionError::UnsupportedCommand(request.command.to_byte()).into())
        }
    }
}

/// Dispatch a gated request: CONNECT enters the TCP relay, UDP ASSOCIATE
/// becomes a keepalive holder for the association.
pub(crate) async fn dispatch(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    request: Request,
) -> Result<()> {
    match request.command {
        Command::Connect => relay::handle_connect(ctx, stream, request.addr).await,
        Command::UdpAssociate => handle_associate(ctx, stream, request.addr).await,
        Command::Bind => Err(SessionError::UnsupportedCommand(request.command.to_byte()).into()),
    }
}

/// Handle UDP ASSOCIATE: advertise the server UDP address, register the
/// association signal, then hold the connection open until the client
/// drops it. Teardown removes the signal and closes it, ending every
/// exchange keyed to this client.
async fn handle_associate(
    ctx: Arc<ServerContext>,
    mut stream: TcpStream,
    claimed: TargetAddr,
) -> Result<()> {
    let client_udp = client_udp_source(&claimed, stream.peer_addr()?).await;

    write_reply(
        &mut stream,
        ReplyCode::Succeeded,
        &TargetAddr::from(ctx.advertised_udp),
    )
    .await
    .context("Failed to send UDP ASSOCIATE reply")?;
    let signal = ctx.assoc.insert_signal(client_udp);
    debug!("udp association established for {client_udp}");

    // keepalive: discard client bytes until end-of-stream
    let mut sink = [0u8; 1024];
    loop {
        match stream.read(&mut sink).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }

    ctx.assoc.remove_signal(&client_udp);
    signal.close();
    debug!("udp association for {client_udp} torn down");
    Ok(())
}

/// The client's UDP source: the address it advertised in the request, or
/// its TCP peer address when the claim is unspecified or unresolvable.
async fn client_udp_source(claimed: &TargetAddr, tcp_peer: SocketAddr) -> SocketAddr {
    match claimed.resolve().await {
        Ok(addr) if !addr.ip().is_unspecified() && addr.port() != 0 => addr,
        _ => tcp_peer,
    }
}
