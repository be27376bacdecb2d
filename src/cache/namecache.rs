//! Positive name cache and node-status cache. Both live in the generic
//! TTL store; addresses are kept as comma-separated textual entries so a
//! cache dump stays human readable.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::GenCache;
use crate::net::endpoint::Endpoint;

/// Cache of resolved `(name, type)` pairs and node-status answers.
pub struct NameCache {
    cache: Arc<GenCache>,
    ttl: Duration,
}

fn namecache_key(name: &str, name_type: u16) -> String {
    format!("NBT/{}#{:02X}", name.to_uppercase(), name_type)
}

fn status_key(name: &str, name_type: u8, desired_type: u8, addr: &IpAddr) -> String {
    format!(
        "NBT-STATUS/{}#{:02X},{:02X},{}",
        name.to_uppercase(),
        name_type,
        desired_type,
        addr
    )
}

impl NameCache {
    /// A zero TTL disables the positive cache entirely.
    pub fn new(cache: Arc<GenCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Store a positive lookup result.
    pub fn store(&self, name: &str, name_type: u16, endpoints: &[Endpoint]) {
        if self.ttl.is_zero() || endpoints.is_empty() {
            return;
        }
        let value = endpoints
            .iter()
            .map(|e| e.addr.to_string())
            .collect::<Vec<_>>()
            .join(",");
        log::trace!("namecache store {}#{:02x} -> {}", name, name_type, value);
        self.cache.set(&namecache_key(name, name_type), &value, self.ttl);
    }

    /// Fetch a previously stored lookup result. Entries that no longer
    /// parse are dropped rather than surfaced.
    pub fn fetch(&self, name: &str, name_type: u16) -> Option<Vec<Endpoint>> {
        if self.ttl.is_zero() {
            return None;
        }
        let value = self.cache.get(&namecache_key(name, name_type))?;
        let endpoints: Vec<Endpoint> = value
            .split(',')
            .filter_map(|s| s.parse::<IpAddr>().ok())
            .map(Endpoint::new)
            .collect();
        if endpoints.is_empty() {
            return None;
        }
        log::trace!(
            "namecache hit for {}#{:02x}: {} entries",
            name,
            name_type,
            endpoints.len()
        );
        Some(endpoints)
    }

    /// Drop a positive entry, if present.
    pub fn delete(&self, name: &str, name_type: u16) {
        self.cache.delete(&namecache_key(name, name_type));
    }

    /// Remember which name a node-status query against `addr` produced.
    pub fn status_store(
        &self,
        name: &str,
        name_type: u8,
        desired_type: u8,
        addr: &IpAddr,
        found: &str,
    ) {
        if self.ttl.is_zero() {
            return;
        }
        self.cache.set(
            &status_key(name, name_type, desired_type, addr),
            found,
            self.ttl,
        );
    }

    pub fn status_fetch(
        &self,
        name: &str,
        name_type: u8,
        desired_type: u8,
        addr: &IpAddr,
    ) -> Option<String> {
        if self.ttl.is_zero() {
            return None;
        }
        self.cache.get(&status_key(name, name_type, desired_type, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn cache_with_ttl(secs: u64) -> NameCache {
        NameCache::new(Arc::new(GenCache::new()), Duration::from_secs(secs))
    }

    fn ep(a: u8, b: u8, c: u8, d: u8) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)))
    }

    #[test]
    fn test_store_fetch_roundtrip() {
        let cache = cache_with_ttl(60);
        cache.store("server", 0x20, &[ep(10, 0, 0, 1), ep(10, 0, 0, 2)]);

        let fetched = cache.fetch("server", 0x20).unwrap();
        assert_eq!(fetched, vec![ep(10, 0, 0, 1), ep(10, 0, 0, 2)]);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let cache = cache_with_ttl(60);
        cache.store("Server", 0x20, &[ep(10, 0, 0, 1)]);
        assert!(cache.fetch("SERVER", 0x20).is_some());
        assert!(cache.fetch("server", 0x20).is_some());
    }

    #[test]
    fn test_type_is_part_of_the_key() {
        let cache = cache_with_ttl(60);
        cache.store("server", 0x20, &[ep(10, 0, 0, 1)]);
        assert!(cache.fetch("server", 0x1c).is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = cache_with_ttl(0);
        cache.store("server", 0x20, &[ep(10, 0, 0, 1)]);
        assert!(cache.fetch("server", 0x20).is_none());
    }

    #[test]
    fn test_delete() {
        let cache = cache_with_ttl(60);
        cache.store("server", 0x20, &[ep(10, 0, 0, 1)]);
        cache.delete("server", 0x20);
        assert!(cache.fetch("server", 0x20).is_none());
    }

    #[test]
    fn test_status_cache_keyed_by_target() {
        let cache = cache_with_ttl(60);
        let addr1 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let addr2 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        cache.status_store("*", 0x00, 0x20, &addr1, "FILESRV");
        assert_eq!(
            cache.status_fetch("*", 0x00, 0x20, &addr1),
            Some("FILESRV".to_string())
        );
        assert_eq!(cache.status_fetch("*", 0x00, 0x20, &addr2), None);
        assert_eq!(cache.status_fetch("*", 0x00, 0x1b, &addr1), None);
    }
}
