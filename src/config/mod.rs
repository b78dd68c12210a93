//! Configuration for socksd
//!
//! A small TOML surface with defaults for every field, so a bare
//! `socksd` invocation serves NoAuth on localhost.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

/// Default listen address
fn default_listen() -> SocketAddr {
    "127.0.0.1:1080".parse().expect("static address")
}

/// Default UDP idle deadline in seconds
fn default_udp_timeout() -> u64 {
    60
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// SOCKS5 server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address for both the TCP listener and the UDP socket
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Publicly reachable IP advertised in UDP ASSOCIATE replies; falls
    /// back to the listen IP when unset (the port is always the listen port)
    #[serde(default)]
    pub public_ip: Option<IpAddr>,

    /// Username for RFC 1929 auth; both credentials empty selects NoAuth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for RFC 1929 auth
    #[serde(default)]
    pub password: Option<String>,

    /// TCP relay idle deadline in seconds, 0 disables
    #[serde(default)]
    pub tcp_timeout: u64,

    /// UDP exchange idle deadline in seconds, 0 disables
    #[serde(default = "default_udp_timeout")]
    pub udp_timeout: u64,

    /// Require a prior UDP ASSOCIATE before relaying a source's datagrams
    #[serde(default)]
    pub limit_udp: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_ip: None,
            username: None,
            password: None,
            tcp_timeout: 0,
            udp_timeout: default_udp_timeout(),
            limit_udp: false,
        }
    }
}

impl ServerConfig {
    /// Whether both credentials are configured (selects the UserPass method)
    pub fn has_credentials(&self) -> bool {
        matches!(&self.username, Some(u) if !u.is_empty())
            && matches!(&self.password, Some(p) if !p.is_empty())
    }

    /// The address clients should send UDP datagrams to
    pub fn advertised_udp_addr(&self) -> SocketAddr {
        match self.public_ip {
            Some(ip) => SocketAddr::new(ip, self.listen.port()),
            None => self.listen,
        }
    }

    /// Reject half-configured credentials
    pub fn validate(&self) -> Result<()> {
        let has_user = matches!(&self.username, Some(u) if !u.is_empty());
        let has_pass = matches!(&self.password, Some(p) if !p.is_empty());
        if has_user != has_pass {
            bail!("username and password must be configured together");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.server.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.listen, default_listen());
        assert!(!config.server.has_credentials());
        assert_eq!(config.server.udp_timeout, 60);
        assert_eq!(config.server.tcp_timeout, 0);
        assert!(!config.server.limit_udp);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.listen, default_listen());
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
[server]
listen = "0.0.0.0:1090"
public_ip = "203.0.113.7"
username = "user"
password = "pass"
tcp_timeout = 30
udp_timeout = 120
limit_udp = true
"#,
        )
        .unwrap();

        let server = config.server;
        assert_eq!(server.listen, "0.0.0.0:1090".parse().unwrap());
        assert!(server.has_credentials());
        assert_eq!(server.tcp_timeout, 30);
        assert_eq!(server.udp_timeout, 120);
        assert!(server.limit_udp);
        assert_eq!(
            server.advertised_udp_addr(),
            "203.0.113.7:1090".parse().unwrap()
        );
    }

    #[test]
    fn test_advertised_addr_falls_back_to_listen() {
        let config = ServerConfig::default();
        assert_eq!(config.advertised_udp_addr(), config.listen);
    }

    #[test]
    fn test_validate_rejects_half_credentials() {
        let config = parse_config(
            r#"
[server]
username = "user"
"#,
        );
        assert!(config.is_err());

        let config = parse_config(
            r#"
[server]
password = "pass"
"#,
        );
        assert!(config.is_err());
    }

    #[test]
    fn test_empty_credentials_mean_noauth() {
        let config = parse_config(
            r#"
[server]
username = ""
password = ""
"#,
        )
        .unwrap();
        assert!(!config.server.has_credentials());
    }
}
