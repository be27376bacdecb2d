//! Local interface enumeration behind a trait so the resolver can be
//! exercised against a fixed interface table in tests.

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::IpNetwork;
use pnet::datalink;

/// View of the machine's network interfaces.
pub trait Interfaces: Send + Sync {
    /// Addresses of all usable interfaces, both families.
    fn addrs(&self) -> Vec<IpAddr>;

    /// IPv4 directed broadcast addresses, one per usable interface.
    fn broadcast_addrs(&self) -> Vec<IpAddr>;

    /// True when `addr` is one of this machine's own addresses.
    fn is_local(&self, addr: &IpAddr) -> bool {
        self.addrs().iter().any(|a| a == addr)
    }

    fn is_my_ipv4(&self, addr: Ipv4Addr) -> bool {
        self.is_local(&IpAddr::V4(addr))
    }
}

/// Interface table of the running system, excluding loopback and
/// interfaces that are down.
pub struct SystemInterfaces;

fn usable_networks() -> Vec<IpNetwork> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .flat_map(|iface| iface.ips)
        .collect()
}

impl Interfaces for SystemInterfaces {
    fn addrs(&self) -> Vec<IpAddr> {
        usable_networks().into_iter().map(|net| net.ip()).collect()
    }

    fn broadcast_addrs(&self) -> Vec<IpAddr> {
        usable_networks()
            .into_iter()
            .filter_map(|net| match net {
                IpNetwork::V4(v4) => Some(IpAddr::V4(v4.broadcast())),
                IpNetwork::V6(_) => None,
            })
            .collect()
    }
}

/// Fixed interface table for tests.
#[cfg(test)]
pub struct StaticInterfaces {
    pub addrs: Vec<IpAddr>,
    pub bcasts: Vec<IpAddr>,
}

#[cfg(test)]
impl Interfaces for StaticInterfaces {
    fn addrs(&self) -> Vec<IpAddr> {
        self.addrs.clone()
    }

    fn broadcast_addrs(&self) -> Vec<IpAddr> {
        self.bcasts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_interfaces_is_local() {
        let ifaces = StaticInterfaces {
            addrs: vec!["192.168.1.10".parse().unwrap()],
            bcasts: vec!["192.168.1.255".parse().unwrap()],
        };
        assert!(ifaces.is_local(&"192.168.1.10".parse().unwrap()));
        assert!(!ifaces.is_local(&"192.168.1.11".parse().unwrap()));
        assert!(ifaces.is_my_ipv4(Ipv4Addr::new(192, 168, 1, 10)));
    }

    #[test]
    fn test_system_interfaces_do_not_panic() {
        let ifaces = SystemInterfaces;
        // Content depends on the host; just make sure enumeration works
        // and broadcast addresses are IPv4.
        for addr in ifaces.broadcast_addrs() {
            assert!(addr.is_ipv4());
        }
    }
}
