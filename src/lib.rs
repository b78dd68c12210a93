//! # socksd - SOCKS5 Proxy Server
//!
//! socksd is a standalone SOCKS5 proxy server implementing RFC 1928 with
//! the RFC 1929 username/password subnegotiation. It relays TCP streams
//! (CONNECT) and UDP datagrams (UDP ASSOCIATE) between clients and the
//! destinations they name.
//!
//! ## Features
//!
//! - **CONNECT**: full-duplex TCP relay with per-direction idle deadlines
//! - **UDP ASSOCIATE**: NAT-style exchange tables tie every UDP flow to
//!   its controlling TCP connection; dropping the connection tears the
//!   flows down
//! - **Authentication**: NoAuth or byte-exact username/password
//! - **Source-port stickiness**: outbound UDP sockets reuse the local
//!   address last used for a (client, destination) pair
//! - **Pluggable handler**: swap in access control or routing policy
//!   without touching the protocol engine
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksd::config::ServerConfig;
//! use socksd::server::{DefaultHandler, Server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.serve(Arc::new(DefaultHandler)).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! TCP client -> Server -> session (negotiate/auth/request) -> relay | associate
//! UDP client -> Server -> udp router -> exchange -> remote
//!                                   <- pump     <-
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod assoc;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod session;
pub mod socks;
pub mod udp;

// Re-export commonly used items
pub use config::{load_config, Config, ServerConfig};
pub use error::{ProtocolError, ReplyCode, SessionError};
pub use server::{DefaultHandler, Handler, Server, ServerContext};

/// Version of the socksd library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "socksd");
    }
}
