//! Domain controller list assembly: merge the affinity server, the
//! statically configured password servers, and automatic lookups into
//! one deduplicated, IPv4-first candidate list.

use std::net::IpAddr;

use crate::error::ResolveError;
use crate::nbt::KDC_NAME_TYPE;
use crate::net::endpoint::{prioritize_ipv4, remove_duplicate_endpoints, Endpoint};
use crate::net::rank::sort_endpoints;
use crate::resolver::Resolver;

const LDAP_PORT: u16 = 389;
const DEFAULT_KRB5_PORT: u16 = 88;

/// Cache of recently unreachable servers, consulted so a known-bad
/// domain controller is not handed out again immediately.
pub trait NegativeConnCache: Send + Sync {
    fn is_negative(&self, domain: &str, addr: &IpAddr) -> bool;
}

/// Default implementation: nothing is ever considered bad.
pub struct NoNegativeCache;

impl NegativeConnCache for NoNegativeCache {
    fn is_negative(&self, _domain: &str, _addr: &IpAddr) -> bool {
        false
    }
}

/// How a DC list should be assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcLookupType {
    /// Use the configured resolve order.
    Normal,
    /// Restrict to DNS SRV lookups for LDAP servers.
    AdsOnly,
    /// Restrict to DNS SRV lookups for Kerberos KDCs.
    KdcOnly,
}

impl Resolver {
    /// Build the candidate list for `domain`. Returns the endpoints and
    /// whether the list is already meaningfully ordered (explicitly
    /// configured servers and SRV answers are; plain lookups are not).
    async fn get_dc_list(
        &self,
        domain: &str,
        sitename: Option<&str>,
        lookup_type: DcLookupType,
    ) -> Result<(Vec<Endpoint>, bool), ResolveError> {
        let mut ordered = false;
        let mut auto_name_type: u16 = 0x1c;

        // When restricted to DNS the configured order must actually
        // allow host lookups; otherwise the restriction deliberately
        // produces an order that the driver will reject.
        let resolve_order: Vec<String> = match lookup_type {
            DcLookupType::AdsOnly => {
                if self
                    .config
                    .resolve_order
                    .iter()
                    .any(|tok| tok.eq_ignore_ascii_case("host"))
                {
                    // SRV answers are already sorted by priority and weight.
                    ordered = true;
                    vec!["ads".to_string()]
                } else {
                    vec!["NULL".to_string()]
                }
            }
            DcLookupType::KdcOnly => {
                ordered = true;
                auto_name_type = KDC_NAME_TYPE;
                vec!["kdc".to_string()]
            }
            DcLookupType::Normal => self.config.resolve_order.clone(),
        };

        // The server we have affinity for goes in front of the
        // configured password servers; for foreign domains the list is
        // the affinity server plus an automatic lookup.
        let saf_servername = self.saf.fetch(domain);
        let pserver = if domain.eq_ignore_ascii_case(&self.config.workgroup)
            || domain.eq_ignore_ascii_case(&self.config.realm)
        {
            format!(
                "{}, {}",
                saf_servername.as_deref().unwrap_or(""),
                self.config.password_servers.join(", ")
            )
        } else {
            format!("{}, *", saf_servername.as_deref().unwrap_or(""))
        };

        log::info!("get_dc_list: preferred server list: \"{}\"", pserver);

        let tokens: Vec<&str> = pserver
            .split([',', ' ', '\t'])
            .filter(|tok| !tok.is_empty())
            .collect();

        // First pass: run the single automatic lookup and count what
        // the explicit entries will contribute.
        let mut auto_list: Vec<Endpoint> = Vec::new();
        let mut done_auto_lookup = false;
        let mut num_addresses = 0usize;

        for tok in &tokens {
            if *tok == "*" && !done_auto_lookup {
                done_auto_lookup = true;
                match self
                    .internal_resolve_name(domain, auto_name_type, sitename, &resolve_order)
                    .await
                {
                    Ok(list) => {
                        log::debug!("get_dc_list: adding {} DCs from auto lookup", list.len());
                        num_addresses += list.len();
                        auto_list = list;
                    }
                    Err(_) => continue,
                }
            } else {
                num_addresses += 1;
            }
        }

        if num_addresses == 0 {
            if done_auto_lookup {
                log::info!("get_dc_list: no servers found");
                return Err(ResolveError::NoLogonServers);
            }
            let list = self
                .internal_resolve_name(domain, auto_name_type, sitename, &resolve_order)
                .await?;
            return Ok((list, ordered));
        }

        // Second pass: fill in real addresses.
        let mut return_list: Vec<Endpoint> = Vec::new();

        for tok in &tokens {
            if *tok == "*" {
                for endpoint in &auto_list {
                    // Drop any known bad DC addresses.
                    if self.negative_conn.is_negative(domain, &endpoint.addr) {
                        log::debug!(
                            "get_dc_list: negative entry {} removed from DC list",
                            endpoint.addr
                        );
                        continue;
                    }
                    return_list.push(*endpoint);
                }
                continue;
            }

            // `name:port` syntax picks the LDAP port for ADS lookups;
            // Kerberos tickets always go to the default KDC port.
            let default_port = match lookup_type {
                DcLookupType::AdsOnly => Some(LDAP_PORT),
                DcLookupType::KdcOnly => Some(DEFAULT_KRB5_PORT),
                DcLookupType::Normal => None,
            };
            let (host, port) = match tok.split_once(':') {
                Some((host, port_str)) if lookup_type != DcLookupType::KdcOnly => {
                    (host, port_str.parse::<u16>().ok().or(default_port))
                }
                Some((host, _)) => (host, default_port),
                None => (*tok, default_port),
            };

            let Ok(resolved) = self.resolve_name(host, 0x20, true).await else {
                continue;
            };
            if self.negative_conn.is_negative(domain, &resolved.addr) {
                log::debug!(
                    "get_dc_list: negative entry {} removed from DC list",
                    host
                );
                continue;
            }
            return_list.push(Endpoint {
                addr: resolved.addr,
                port,
            });
            ordered = true;
        }

        // Explicit password servers can repeat what the auto lookup
        // found; drop the duplicates.
        remove_duplicate_endpoints(&mut return_list);

        // DCs prefer IPv4 because W2K3 never learned LDAP, KRB5, or
        // CLDAP over IPv6.
        prioritize_ipv4(&mut return_list);

        if return_list.is_empty() {
            return Err(ResolveError::NoLogonServers);
        }

        if log::log_enabled!(log::Level::Info) {
            let listing = return_list
                .iter()
                .map(Endpoint::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            log::info!(
                "get_dc_list: returning {} addresses in an {}ordered list: {}",
                return_list.len(),
                if ordered { "" } else { "un" },
                listing
            );
        }

        Ok((return_list, ordered))
    }

    /// Domain controller candidates for `domain`, sorted by proximity
    /// unless the assembly already produced a meaningful order. A site
    /// restriction that yields nothing is retried without the site.
    pub async fn get_sorted_dc_list(
        &self,
        domain: &str,
        sitename: Option<&str>,
        ads_only: bool,
    ) -> Result<Vec<Endpoint>, ResolveError> {
        let lookup_type = if ads_only {
            DcLookupType::AdsOnly
        } else {
            DcLookupType::Normal
        };

        log::info!(
            "get_sorted_dc_list: attempting lookup for name {} (sitename {})",
            domain,
            sitename.unwrap_or("NULL")
        );

        let result = self.get_dc_list(domain, sitename, lookup_type).await;
        let (mut list, ordered) = match result {
            Err(ResolveError::NoLogonServers) if sitename.is_some() => {
                log::info!(
                    "get_sorted_dc_list: no server for name {} available in site {}, \
                     fallback to all servers",
                    domain,
                    sitename.unwrap_or_default()
                );
                self.get_dc_list(domain, None, lookup_type).await?
            }
            other => other?,
        };

        if !ordered {
            sort_endpoints(&*self.interfaces, &mut list);
        }
        Ok(list)
    }

    /// Kerberos KDC candidates for `realm`, reusing the DC assembly.
    pub async fn get_kdc_list(
        &self,
        realm: &str,
        sitename: Option<&str>,
    ) -> Result<Vec<Endpoint>, ResolveError> {
        let (mut list, ordered) = self
            .get_dc_list(realm, sitename, DcLookupType::KdcOnly)
            .await?;

        if !ordered {
            sort_endpoints(&*self.interfaces, &mut list);
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::net::interfaces::{Interfaces, StaticInterfaces};
    use crate::resolve::ads::testing::MockDnsClient;
    use crate::resolve::ads::SrvRecord;
    use std::sync::Arc;

    fn test_interfaces() -> Arc<dyn Interfaces> {
        Arc::new(StaticInterfaces {
            addrs: vec!["192.168.1.10".parse().unwrap()],
            bcasts: vec![],
        })
    }

    fn srv(hostname: &str, addrs: &[&str]) -> SrvRecord {
        SrvRecord {
            hostname: Some(hostname.to_string()),
            port: 389,
            addrs: addrs.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    fn base_config() -> Config {
        Config {
            resolve_order: vec!["host".to_string()],
            workgroup: "EXAMPLE".to_string(),
            realm: "EXAMPLE.COM".to_string(),
            ..Config::default()
        }
    }

    fn resolver(config: Config, dns: Arc<MockDnsClient>) -> Resolver {
        Resolver::new(config)
            .with_interfaces(test_interfaces())
            .with_dns_client(dns)
    }

    #[tokio::test]
    async fn test_ads_only_uses_srv_answers() {
        let dns = Arc::new(MockDnsClient::new());
        *dns.srv_records.lock().unwrap() = vec![
            srv("dc1.example.com", &["192.0.2.1"]),
            srv("dc2.example.com", &["192.0.2.2"]),
        ];

        let mut config = base_config();
        config.password_servers = vec!["*".to_string()];
        let resolver = resolver(config, dns);

        let list = resolver
            .get_sorted_dc_list("EXAMPLE", None, true)
            .await
            .unwrap();
        // SRV order is preserved: the list is already ordered, so no
        // proximity sort may reshuffle it.
        assert_eq!(
            list,
            vec![
                Endpoint::new("192.0.2.1".parse().unwrap()),
                Endpoint::new("192.0.2.2".parse().unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ads_only_without_host_order_fails() {
        let dns = Arc::new(MockDnsClient::new());
        *dns.srv_records.lock().unwrap() = vec![srv("dc1.example.com", &["192.0.2.1"])];

        let mut config = base_config();
        config.resolve_order = vec!["wins".to_string()];
        config.password_servers = vec!["*".to_string()];
        let resolver = resolver(config, dns.clone());

        let err = resolver
            .get_sorted_dc_list("EXAMPLE", None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoLogonServers));
        // The sabotaged NULL order never reached DNS.
        assert_eq!(dns.srv_query_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_password_servers_keep_their_ports() {
        let mut config = base_config();
        config.password_servers = vec!["10.0.0.9:445".to_string(), "10.0.0.10".to_string()];
        let resolver = resolver(config, Arc::new(MockDnsClient::new()));

        let list = resolver
            .get_sorted_dc_list("EXAMPLE", None, false)
            .await
            .unwrap();
        assert_eq!(
            list,
            vec![
                Endpoint::with_port("10.0.0.9".parse().unwrap(), 445),
                Endpoint::new("10.0.0.10".parse().unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn test_kdc_list_forces_kerberos_port() {
        let dns = Arc::new(MockDnsClient::new());
        let mut config = base_config();
        // An explicit port on a KDC entry is ignored.
        config.password_servers = vec!["10.0.0.7:9999".to_string()];
        config.workgroup = "EXAMPLE.COM".to_string();
        let resolver = resolver(config, dns);

        let list = resolver.get_kdc_list("EXAMPLE.COM", None).await.unwrap();
        assert_eq!(
            list,
            vec![Endpoint::with_port("10.0.0.7".parse().unwrap(), 88)]
        );
    }

    #[tokio::test]
    async fn test_affinity_server_comes_first() {
        let dns = Arc::new(MockDnsClient::new());
        *dns.srv_records.lock().unwrap() = vec![srv("dc9.example.com", &["192.0.2.9"])];

        let mut config = base_config();
        config.password_servers = vec!["*".to_string()];
        let resolver = resolver(config, dns);
        resolver.saf_store("EXAMPLE", "10.0.0.50").unwrap();

        let list = resolver
            .get_sorted_dc_list("EXAMPLE", None, true)
            .await
            .unwrap();
        assert_eq!(list[0].addr, "10.0.0.50".parse::<IpAddr>().unwrap());
        assert!(list.contains(&Endpoint::new("192.0.2.9".parse().unwrap())));
    }

    #[tokio::test]
    async fn test_negative_cache_filters_candidates() {
        struct RejectOne;
        impl NegativeConnCache for RejectOne {
            fn is_negative(&self, _domain: &str, addr: &IpAddr) -> bool {
                *addr == "192.0.2.1".parse::<IpAddr>().unwrap()
            }
        }

        let dns = Arc::new(MockDnsClient::new());
        *dns.srv_records.lock().unwrap() = vec![
            srv("dc1.example.com", &["192.0.2.1"]),
            srv("dc2.example.com", &["192.0.2.2"]),
        ];

        let mut config = base_config();
        config.password_servers = vec!["*".to_string()];
        let resolver = resolver(config, dns).with_negative_conn_cache(Arc::new(RejectOne));

        let list = resolver
            .get_sorted_dc_list("EXAMPLE", None, true)
            .await
            .unwrap();
        assert_eq!(list, vec![Endpoint::new("192.0.2.2".parse().unwrap())]);
    }

    #[tokio::test]
    async fn test_site_restriction_falls_back() {
        let dns = Arc::new(MockDnsClient::new());
        // DNS knows nothing, so both the sited and the unrestricted
        // assembly fail; the fallback must still have been attempted.
        let mut config = base_config();
        config.password_servers = vec!["*".to_string()];
        let resolver = resolver(config, dns.clone());

        let err = resolver
            .get_sorted_dc_list("EXAMPLE", Some("Default-First-Site"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoLogonServers));
        assert_eq!(dns.srv_query_count(), 2);
    }

    #[tokio::test]
    async fn test_foreign_domain_auto_looks_up() {
        let dns = Arc::new(MockDnsClient::new());
        *dns.srv_records.lock().unwrap() = vec![srv("dc.other.com", &["198.51.100.7"])];

        // Not our workgroup: the preferred list becomes "<saf>, *".
        let config = base_config();
        let resolver = resolver(config, dns);

        let list = resolver
            .get_sorted_dc_list("OTHERDOM", None, true)
            .await
            .unwrap();
        assert_eq!(list, vec![Endpoint::new("198.51.100.7".parse().unwrap())]);
    }
}
