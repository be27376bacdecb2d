//! Resolver configuration. Mirrors the name-resolution knobs of an smb.conf
//! style configuration file with serde-friendly defaults.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default TTL for positive name cache entries, in seconds.
pub const DEFAULT_NAME_CACHE_TTL: u64 = 660;
/// Default TTL for server affinity entries, in seconds.
pub const DEFAULT_SAF_TTL: u64 = 900;
/// Default TTL for server affinity entries recorded at join time.
pub const DEFAULT_SAF_JOIN_TTL: u64 = 3600;
/// Default wall-clock budget for a batch of async DNS lookups.
pub const DEFAULT_ASYNC_DNS_TIMEOUT: u64 = 10;

/// Security mode of the client. Only `Ads` changes resolver behaviour:
/// PDC lookups then try a DNS-SRV-only pass before the configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    User,
    Domain,
    Ads,
}

/// One replicating group of WINS servers. Servers within a tag hold the
/// same data, so querying any live one of them is sufficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinsTag {
    pub tag: String,
    pub servers: Vec<Ipv4Addr>,
}

/// Resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered list of backend tags: `lmhosts`, `wins`, `host` (alias
    /// `hosts`), `bcast`, `ads`, `kdc`. The literal `NULL` in first
    /// position disables resolution entirely.
    pub resolve_order: Vec<String>,

    /// When true, every NetBIOS path (wins, bcast, node status) fails
    /// immediately.
    pub disable_netbios: bool,

    /// Source address for NetBIOS client sockets. Unset means bind to
    /// the IPv4 wildcard address.
    pub nbt_client_addr: Option<Ipv4Addr>,

    /// Destination port for NetBIOS name service datagrams.
    pub nbt_port: u16,

    /// Wall-clock budget, in seconds, for a batch of parallel DNS
    /// A/AAAA lookups.
    pub async_dns_timeout_secs: u64,

    /// TTL for positive name cache entries. Zero disables the cache.
    pub name_cache_timeout_secs: u64,

    /// TTL for `SAF/DOMAIN/...` affinity entries.
    pub saf_ttl_secs: u64,

    /// TTL for `SAFJOIN/DOMAIN/...` affinity entries.
    pub saf_join_ttl_secs: u64,

    pub security: SecurityMode,

    /// Statically configured domain controllers, `name` or `name:port`.
    /// The wildcard `*` requests an automatic lookup.
    pub password_servers: Vec<String>,

    pub workgroup: String,
    pub realm: String,

    /// WINS servers grouped by replication tag.
    pub wins_servers: Vec<WinsTag>,

    /// Path of the static lmhosts file, if one is used.
    pub lmhosts_path: Option<PathBuf>,

    /// True when running inside the name service daemon itself. WINS
    /// resolution then skips the machine's own address to avoid
    /// querying ourselves in a loop.
    pub in_nmbd: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolve_order: vec![
                "lmhosts".to_string(),
                "wins".to_string(),
                "host".to_string(),
                "bcast".to_string(),
            ],
            disable_netbios: false,
            nbt_client_addr: None,
            nbt_port: crate::nbt::NBT_PORT,
            async_dns_timeout_secs: DEFAULT_ASYNC_DNS_TIMEOUT,
            name_cache_timeout_secs: DEFAULT_NAME_CACHE_TTL,
            saf_ttl_secs: DEFAULT_SAF_TTL,
            saf_join_ttl_secs: DEFAULT_SAF_JOIN_TTL,
            security: SecurityMode::default(),
            password_servers: Vec::new(),
            workgroup: String::new(),
            realm: String::new(),
            wins_servers: Vec::new(),
            lmhosts_path: None,
            in_nmbd: false,
        }
    }
}

impl Config {
    /// Source address NetBIOS sockets bind to, downgraded to IPv4. A
    /// missing or unusable configuration yields the wildcard address.
    pub fn nbt_source_addr(&self) -> Ipv4Addr {
        self.nbt_client_addr.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolve_order() {
        let config = Config::default();
        assert_eq!(config.resolve_order, ["lmhosts", "wins", "host", "bcast"]);
    }

    #[test]
    fn test_default_ttls() {
        let config = Config::default();
        assert_eq!(config.saf_ttl_secs, 900);
        assert_eq!(config.saf_join_ttl_secs, 3600);
        assert_eq!(config.name_cache_timeout_secs, 660);
        assert_eq!(config.nbt_port, 137);
    }

    #[test]
    fn test_nbt_source_addr_defaults_to_wildcard() {
        let config = Config::default();
        assert_eq!(config.nbt_source_addr(), Ipv4Addr::UNSPECIFIED);

        let config = Config {
            nbt_client_addr: Some(Ipv4Addr::new(192, 168, 1, 10)),
            ..Config::default()
        };
        assert_eq!(config.nbt_source_addr(), Ipv4Addr::new(192, 168, 1, 10));
    }
}
