//! The SOCKS5 server: sockets, accept loops, and the handler seam
//!
//! One TCP listener and one UDP socket share the configured address. Each
//! accepted connection and each received datagram is handed to a spawned
//! task running the configured [`Handler`]; per-task failures are logged
//! and isolated, while listener-level errors end the loop.

use crate::assoc::AssociationTable;
use crate::config::ServerConfig;
use crate::session;
use crate::socks::{Request, UdpDatagram};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Shared server state handed to every handler invocation
pub struct ServerContext {
    /// The server configuration
    pub config: ServerConfig,
    /// The three UDP association namespaces
    pub assoc: AssociationTable,
    /// The server's UDP socket; the recv loop reads it, every pump writes it
    pub udp_socket: Arc<UdpSocket>,
    /// The UDP address advertised in UDP ASSOCIATE replies
    pub advertised_udp: SocketAddr,
    pub(crate) cancel: CancellationToken,
    pub(crate) tracker: TaskTracker,
}

impl ServerContext {
    /// Begin a graceful shutdown: both accept loops stop, and in-flight
    /// handler tasks are cancelled and drained.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// The extension seam: one method per transport.
///
/// The request reaching `handle_tcp` has already passed negotiation,
/// authentication, and command gating; the datagram reaching `handle_udp`
/// has already passed parsing and the fragment check. A custom handler can
/// add access control or routing policy without touching the protocol
/// engine.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle a gated SOCKS5 request on its client connection
    async fn handle_tcp(
        &self,
        ctx: Arc<ServerContext>,
        stream: TcpStream,
        request: Request,
    ) -> Result<()>;

    /// Handle one parsed, unfragmented datagram from a client UDP source
    async fn handle_udp(
        &self,
        ctx: Arc<ServerContext>,
        client: SocketAddr,
        datagram: UdpDatagram,
    ) -> Result<()>;
}

/// The built-in handler: CONNECT relay and UDP association routing
pub struct DefaultHandler;

#[async_trait]
impl Handler for DefaultHandler {
    async fn handle_tcp(
        &self,
        ctx: Arc<ServerContext>,
        stream: TcpStream,
        request: Request,
    ) -> Result<()> {
        session::dispatch(ctx, stream, request).await
    }

    async fn handle_udp(
        &self,
        ctx: Arc<ServerContext>,
        client: SocketAddr,
        datagram: UdpDatagram,
    ) -> Result<()> {
        crate::udp::route_datagram(ctx, client, datagram).await
    }
}

/// A bound SOCKS5 server, ready to serve
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Bind the TCP listener and UDP socket at the configured address.
    ///
    /// The UDP socket is bound to the port the listener actually got, so
    /// an ephemeral `listen` port works and both transports share it.
    pub async fn bind(config: ServerConfig) -> Result<Server> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {}", config.listen))?;
        let local = listener.local_addr()?;
        let udp_socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("Failed to bind UDP socket on {local}"))?;

        let advertised_udp = match config.public_ip {
            Some(ip) => SocketAddr::new(ip, local.port()),
            None => local,
        };

        let ctx = Arc::new(ServerContext {
            config,
            assoc: AssociationTable::new(),
            udp_socket: Arc::new(udp_socket),
            advertised_udp,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        Ok(Server { listener, ctx })
    }

    /// The address both sockets are bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A handle to the shared state, usable to trigger shutdown
    pub fn context(&self) -> Arc<ServerContext> {
        self.ctx.clone()
    }

    /// Run the TCP accept loop and the UDP recv loop until shutdown.
    ///
    /// Returns after both loops have stopped and all in-flight handler
    /// tasks have drained.
    pub async fn serve(self, handler: Arc<dyn Handler>) -> Result<()> {
        let Server { listener, ctx } = self;
        info!("SOCKS5 server listening on {}", listener.local_addr()?);

        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => Ok(()),
            res = Self::tcp_loop(&listener, &ctx, &handler) => res,
            res = Self::udp_loop(&ctx, &handler) => res,
        };

        // closing the tracker lets already-spawned tasks finish draining
        ctx.cancel.cancel();
        ctx.tracker.close();
        ctx.tracker.wait().await;
        info!("SOCKS5 server stopped");
        result
    }

    async fn tcp_loop(
        listener: &TcpListener,
        ctx: &Arc<ServerContext>,
        handler: &Arc<dyn Handler>,
    ) -> Result<()> {
        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .context("TCP accept failed, stopping listener")?;
            debug!("accepted connection from {peer}");

            let ctx = ctx.clone();
            let handler = handler.clone();
            ctx.tracker.clone().spawn(async move {
                let cancel = ctx.cancel.clone();
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    res = session::run(ctx, handler, stream) => {
                        if let Err(e) = res {
                            debug!("session from {peer} ended: {e:#}");
                        }
                    }
                }
            });
        }
    }

    async fn udp_loop(ctx: &Arc<ServerContext>, handler: &Arc<dyn Handler>) -> Result<()> {
        let mut buf = vec![0u8; crate::socks::MAX_UDP_DATAGRAM];
        loop {
            let (len, src) = ctx
                .udp_socket
                .recv_from(&mut buf)
                .await
                .context("UDP recv failed, stopping socket")?;

            let datagram = match UdpDatagram::parse(&buf[..len]) {
                Ok(d) => d,
                Err(e) => {
                    warn!("dropping malformed datagram from {src}: {e}");
                    continue;
                }
            };
            if datagram.is_fragmented() {
                debug!("dropping fragmented datagram from {src} (frag={})", datagram.frag);
                continue;
            }

            let ctx = ctx.clone();
            let handler = handler.clone();
            ctx.tracker.clone().spawn(async move {
                if let Err(e) = handler.handle_udp(ctx, src, datagram).await {
                    debug!("datagram from {src} not relayed: {e:#}");
                }
            });
        }
    }
}
