//! UDP association state
//!
//! Three keyed namespaces tie a client's UDP flows to its TCP control
//! connection: live exchanges, association teardown signals, and local
//! source-address hints. They share one TTL-map primitive but are exposed
//! as narrowly-typed views, each with its own key space.

mod signal;
mod ttl;

pub use signal::AssocSignal;
pub use ttl::TtlMap;

use crate::socks::TargetAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Default lifetime of an association-table entry
pub const ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One active proxied UDP flow: the client's UDP source and the connected
/// socket toward the destination. The router writes to `remote`; the
/// exchange's pump task is the sole reader.
#[derive(Debug)]
pub struct UdpExchange {
    /// The client's UDP source address
    pub client_addr: SocketAddr,
    /// The connected socket toward the destination
    pub remote: UdpSocket,
}

/// Canonical key for an exchange: the client's UDP source plus the
/// destination exactly as the client wrote it. One rendering is used for
/// creation, lookup, and deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeKey {
    client: SocketAddr,
    dst: String,
}

impl ExchangeKey {
    /// Build the key for a (client source, destination) pair
    pub fn new(client: SocketAddr, dst: &TargetAddr) -> Self {
        ExchangeKey {
            client,
            dst: dst.to_string(),
        }
    }

    /// The client's UDP source address
    pub fn client(&self) -> SocketAddr {
        self.client
    }

    fn render(&self) -> String {
        format!("{}|{}", self.client, self.dst)
    }
}

/// The three association namespaces
pub struct AssociationTable {
    exchanges: TtlMap<Arc<UdpExchange>>,
    signals: TtlMap<AssocSignal>,
    source_hints: TtlMap<SocketAddr>,
}

impl AssociationTable {
    /// Create empty tables
    pub fn new() -> Self {
        AssociationTable {
            exchanges: TtlMap::new(),
            signals: TtlMap::new(),
            source_hints: TtlMap::new(),
        }
    }

    /// Look up the live exchange for a (client, destination) pair
    pub fn exchange(&self, key: &ExchangeKey) -> Option<Arc<UdpExchange>> {
        self.exchanges.get(&key.render())
    }

    /// Register an exchange under its canonical key
    pub fn insert_exchange(&self, key: &ExchangeKey, exchange: Arc<UdpExchange>) {
        self.exchanges.insert(key.render(), exchange, ENTRY_TTL);
    }

    /// Drop an exchange; the same key form used at creation
    pub fn remove_exchange(&self, key: &ExchangeKey) {
        self.exchanges.remove(&key.render());
    }

    /// The teardown signal for a client UDP source, if it is associated
    pub fn signal(&self, client: &SocketAddr) -> Option<AssocSignal> {
        self.signals.get(&client.to_string())
    }

    /// Create and register the teardown signal for a new association
    pub fn insert_signal(&self, client: SocketAddr) -> AssocSignal {
        let signal = AssocSignal::new();
        self.signals
            .insert(client.to_string(), signal.clone(), ENTRY_TTL);
        signal
    }

    /// Unregister an association's signal, handing it back for closing
    pub fn remove_signal(&self, client: &SocketAddr) -> Option<AssocSignal> {
        self.signals.remove(&client.to_string())
    }

    /// The local source-address hint last used for this (client, dst) pair
    pub fn source_hint(&self, key: &ExchangeKey) -> Option<SocketAddr> {
        self.source_hints.get(&key.render())
    }

    /// Record the local address used to reach a destination so later
    /// datagrams keep the same source port
    pub fn store_source_hint(&self, key: &ExchangeKey, local: SocketAddr) {
        self.source_hints.insert(key.render(), local, ENTRY_TTL);
    }
}

impl Default for AssociationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn client() -> SocketAddr {
        SocketAddr::new(Ipv4Addr::new(127, 0, 0, 1).into(), 50000)
    }

    #[test]
    fn test_exchange_key_canonical_form() {
        let ip_key = ExchangeKey::new(client(), &TargetAddr::ipv4(Ipv4Addr::new(8, 8, 8, 8), 53));
        assert_eq!(ip_key.render(), "127.0.0.1:50000|8.8.8.8:53");

        let domain_key = ExchangeKey::new(client(), &TargetAddr::domain("dns.example", 53));
        assert_eq!(domain_key.render(), "127.0.0.1:50000|dns.example:53");
    }

    #[test]
    fn test_same_key_from_equal_parts() {
        let a = ExchangeKey::new(client(), &TargetAddr::domain("x.test", 80));
        let b = ExchangeKey::new(client(), &TargetAddr::domain("x.test", 80));
        assert_eq!(a, b);
        assert_eq!(a.render(), b.render());
    }

    #[tokio::test]
    async fn test_exchange_namespace() {
        let table = AssociationTable::new();
        let key = ExchangeKey::new(client(), &TargetAddr::ipv4(Ipv4Addr::new(1, 1, 1, 1), 53));
        assert!(table.exchange(&key).is_none());

        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let exchange = Arc::new(UdpExchange {
            client_addr: client(),
            remote,
        });
        table.insert_exchange(&key, exchange.clone());
        assert!(table.exchange(&key).is_some());

        table.remove_exchange(&key);
        assert!(table.exchange(&key).is_none());
    }

    #[test]
    fn test_signal_namespace() {
        let table = AssociationTable::new();
        assert!(table.signal(&client()).is_none());

        let signal = table.insert_signal(client());
        let looked_up = table.signal(&client()).unwrap();
        assert!(!looked_up.is_closed());

        table.remove_signal(&client()).unwrap().close();
        assert!(signal.is_closed());
        assert!(table.signal(&client()).is_none());
    }

    #[test]
    fn test_source_hint_namespace() {
        let table = AssociationTable::new();
        let key = ExchangeKey::new(client(), &TargetAddr::domain("x.test", 1));
        assert!(table.source_hint(&key).is_none());

        let local: SocketAddr = "0.0.0.0:41000".parse().unwrap();
        table.store_source_hint(&key, local);
        assert_eq!(table.source_hint(&key), Some(local));
    }

    #[test]
    fn test_namespaces_are_independent() {
        let table = AssociationTable::new();
        let key = ExchangeKey::new(client(), &TargetAddr::ipv4(Ipv4Addr::new(9, 9, 9, 9), 53));

        table.insert_signal(client());
        table.store_source_hint(&key, "0.0.0.0:1".parse().unwrap());
        // neither insert is visible through the exchange view
        assert!(table.exchange(&key).is_none());
    }
}
