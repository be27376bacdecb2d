//! The resolver handle and its pipeline driver. A symbolic server name
//! plus a NetBIOS name type goes in; an ordered list of reachable
//! endpoints comes out, produced by whichever configured backend
//! answers first.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{GenCache, NameCache, SafCache};
use crate::config::{Config, SecurityMode};
use crate::dc::{NegativeConnCache, NoNegativeCache};
use crate::error::ResolveError;
use crate::nbt::query::NbtClient;
use crate::nbt::relay::RelayReaderFactory;
use crate::nbt::KDC_NAME_TYPE;
use crate::net::endpoint::{
    is_broadcast_addr, is_zero_addr, remove_duplicate_endpoints, Endpoint,
};
use crate::net::interfaces::{Interfaces, SystemInterfaces};
use crate::net::rank::sort_endpoints;
use crate::resolve::ads::{resolve_ads, DnsClient};
use crate::resolve::bcast::name_resolve_bcast;
use crate::resolve::hosts::resolve_hosts;
use crate::resolve::lmhosts::resolve_lmhosts;
use crate::resolve::wins::{resolve_wins, WinsLiveness};

const MAX_NETBIOS_NAME_LEN: usize = 16;

/// Name resolution service. Construction wires the caches and the
/// pluggable collaborators; every lookup method borrows the handle
/// immutably, so one instance serves the whole process.
pub struct Resolver {
    pub(crate) config: Config,
    pub(crate) interfaces: Arc<dyn Interfaces>,
    pub(crate) dns: Option<Arc<dyn DnsClient>>,
    pub(crate) relay: Option<Arc<dyn RelayReaderFactory>>,
    pub(crate) namecache: NameCache,
    pub(crate) saf: SafCache,
    pub(crate) wins_liveness: WinsLiveness,
    pub(crate) negative_conn: Arc<dyn NegativeConnCache>,
}

/// Names longer than 15 characters or containing a dot cannot travel
/// over NetBIOS at all.
fn name_is_nbt_eligible(name: &str) -> bool {
    name.len() <= MAX_NETBIOS_NAME_LEN - 1 && !name.contains('.')
}

/// Drop the NetBIOS-only backends from a resolve order.
pub(crate) fn filter_out_nbt_lookup(order: &[String]) -> Vec<String> {
    order
        .iter()
        .filter(|tok| {
            !tok.eq_ignore_ascii_case("lmhosts")
                && !tok.eq_ignore_ascii_case("wins")
                && !tok.eq_ignore_ascii_case("bcast")
        })
        .cloned()
        .collect()
}

impl Resolver {
    /// Resolver over the system interface table with no DNS client, no
    /// daemon relay, and no negative connection cache.
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(GenCache::new());
        let namecache = NameCache::new(
            cache.clone(),
            Duration::from_secs(config.name_cache_timeout_secs),
        );
        let saf = SafCache::new(
            cache.clone(),
            Duration::from_secs(config.saf_ttl_secs),
            Duration::from_secs(config.saf_join_ttl_secs),
        );
        Self {
            config,
            interfaces: Arc::new(SystemInterfaces),
            dns: None,
            relay: None,
            namecache,
            saf,
            wins_liveness: WinsLiveness::new(),
            negative_conn: Arc::new(NoNegativeCache),
        }
    }

    pub fn with_interfaces(mut self, interfaces: Arc<dyn Interfaces>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn with_dns_client(mut self, dns: Arc<dyn DnsClient>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn with_relay(mut self, relay: Arc<dyn RelayReaderFactory>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_negative_conn_cache(mut self, cache: Arc<dyn NegativeConnCache>) -> Self {
        self.negative_conn = cache;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn nbt_client(&self) -> NbtClient {
        NbtClient::new(
            self.interfaces.clone(),
            self.relay.clone(),
            self.config.nbt_source_addr(),
            self.config.nbt_port,
            self.config.disable_netbios,
        )
    }

    fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.config.async_dns_timeout_secs)
    }

    /// Remember `servername` as the working server for `domain`.
    pub fn saf_store(&self, domain: &str, servername: &str) -> Result<(), ResolveError> {
        self.saf.store(domain, servername)
    }

    /// Like [`saf_store`](Self::saf_store) with the longer join TTL.
    pub fn saf_join_store(&self, domain: &str, servername: &str) -> Result<(), ResolveError> {
        self.saf.join_store(domain, servername)
    }

    pub fn saf_delete(&self, domain: &str) -> Result<(), ResolveError> {
        self.saf.delete(domain)
    }

    pub fn saf_fetch(&self, domain: &str) -> Option<String> {
        self.saf.fetch(domain)
    }

    /// The pipeline driver. Short-circuits IP literals, consults the
    /// name cache, then walks `resolve_order` until a backend produces
    /// addresses. Backend failures are logged and swallowed; only when
    /// every backend has failed does the last error surface.
    pub async fn internal_resolve_name(
        &self,
        name: &str,
        name_type: u16,
        sitename: Option<&str>,
        resolve_order: &[String],
    ) -> Result<Vec<Endpoint>, ResolveError> {
        log::debug!(
            "internal_resolve_name: looking up {}#{:x} (sitename {})",
            name,
            name_type,
            sitename.unwrap_or("(null)")
        );

        if let Ok(addr) = name.parse::<IpAddr>() {
            if is_zero_addr(&addr) {
                return Err(ResolveError::Unsuccessful);
            }
            return Ok(vec![Endpoint::new(addr)]);
        }

        if let Some(mut cached) = self.namecache.fetch(name, name_type) {
            cached.retain(|e| !is_zero_addr(&e.addr));
            remove_duplicate_endpoints(&mut cached);
            if cached.is_empty() {
                return Err(ResolveError::Unsuccessful);
            }
            return Ok(cached);
        }

        if resolve_order.first().map(String::as_str) == Some("NULL") {
            log::debug!("internal_resolve_name: all lookups disabled");
            return Err(ResolveError::InvalidParameter);
        }

        let mut order: Vec<String> = if resolve_order.is_empty() {
            vec!["host".to_string()]
        } else {
            resolve_order.to_vec()
        };

        if !name_is_nbt_eligible(name) {
            // The name would not fit in an NBT query anyway.
            order = filter_out_nbt_lookup(&order);
        }

        let mut status = ResolveError::Unsuccessful;
        let mut found: Option<Vec<IpAddr>> = None;
        let mut used_kdc = false;

        for tok in &order {
            let result = if tok.eq_ignore_ascii_case("host") || tok.eq_ignore_ascii_case("hosts") {
                resolve_hosts(name, name_type).await
            } else if tok.eq_ignore_ascii_case("kdc") {
                // Results in a _kerberos SRV record lookup.
                let result = match &self.dns {
                    Some(dns) => {
                        resolve_ads(
                            dns.as_ref(),
                            name,
                            KDC_NAME_TYPE,
                            sitename,
                            self.dns_timeout(),
                        )
                        .await
                    }
                    None => {
                        log::debug!("kdc lookup requested but no DNS client is configured");
                        Err(ResolveError::Unsuccessful)
                    }
                };
                if result.is_ok() {
                    used_kdc = true;
                }
                result
            } else if tok.eq_ignore_ascii_case("ads") {
                // Results in a SRV record lookup for 0x1b and 0x1c names.
                match &self.dns {
                    Some(dns) => {
                        resolve_ads(dns.as_ref(), name, name_type, sitename, self.dns_timeout())
                            .await
                    }
                    None => {
                        log::debug!("ads lookup requested but no DNS client is configured");
                        Err(ResolveError::Unsuccessful)
                    }
                }
            } else if tok.eq_ignore_ascii_case("lmhosts") {
                match &self.config.lmhosts_path {
                    Some(path) => resolve_lmhosts(path, name, name_type as u8),
                    None => Err(ResolveError::Unsuccessful),
                }
            } else if tok.eq_ignore_ascii_case("wins") {
                if name_type == 0x1d {
                    // Master browser names are never registered in WINS.
                    continue;
                }
                let client = self.nbt_client();
                resolve_wins(
                    &client,
                    &self.wins_liveness,
                    &self.config.wins_servers,
                    self.config.nbt_source_addr(),
                    self.config.in_nmbd,
                    |ip| self.interfaces.is_my_ipv4(ip),
                    name,
                    name_type as u8,
                )
                .await
                .map(|r| r.addrs)
            } else if tok.eq_ignore_ascii_case("bcast") {
                let client = self.nbt_client();
                name_resolve_bcast(
                    &client,
                    &*self.interfaces,
                    self.config.disable_netbios,
                    name,
                    name_type as u8,
                )
                .await
            } else {
                log::error!("internal_resolve_name: unknown name switch type {}", tok);
                continue;
            };

            match result {
                Ok(addrs) => {
                    found = Some(addrs);
                    break;
                }
                Err(err) => {
                    log::debug!("internal_resolve_name: backend {} failed: {}", tok, err);
                    status = err;
                }
            }
        }

        let Some(addrs) = found else {
            return Err(status);
        };

        let mut endpoints: Vec<Endpoint> = addrs
            .into_iter()
            .filter(|addr| !is_zero_addr(addr))
            .map(Endpoint::new)
            .collect();

        // Some queries, notably 0x1c, return the PDC first and then all
        // domain controllers including the PDC again. Trying the PDC
        // twice when it is down costs two sets of timeouts.
        remove_duplicate_endpoints(&mut endpoints);

        if endpoints.is_empty() {
            return Err(ResolveError::Unsuccessful);
        }

        if !used_kdc {
            // KDC results carry the synthetic name type and are not
            // cached alongside real lookups.
            self.namecache.store(name, name_type, &endpoints);
        }

        if log::log_enabled!(log::Level::Trace) {
            let listing = endpoints
                .iter()
                .map(Endpoint::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            log::trace!(
                "internal_resolve_name: returning {} addresses: {}",
                endpoints.len(),
                listing
            );
        }

        Ok(endpoints)
    }

    /// Resolve a name to a single connectable endpoint. Broadcast
    /// addresses never qualify; `prefer_ipv4` scans for an IPv4
    /// candidate before settling for anything else.
    pub async fn resolve_name(
        &self,
        name: &str,
        name_type: u16,
        prefer_ipv4: bool,
    ) -> Result<Endpoint, ResolveError> {
        if let Ok(addr) = name.parse::<IpAddr>() {
            if is_zero_addr(&addr) {
                return Err(ResolveError::Unsuccessful);
            }
            return Ok(Endpoint::new(addr));
        }

        let sitename = self.saf.sitename_fetch(&self.config.realm);
        let list = self
            .internal_resolve_name(
                name,
                name_type,
                sitename.as_deref(),
                &self.config.resolve_order,
            )
            .await?;

        if prefer_ipv4 {
            if let Some(endpoint) = list
                .iter()
                .find(|e| !is_broadcast_addr(&e.addr) && e.addr.is_ipv4())
            {
                return Ok(*endpoint);
            }
        }
        list.iter()
            .find(|e| !is_broadcast_addr(&e.addr))
            .copied()
            .ok_or(ResolveError::Unsuccessful)
    }

    /// Resolve a name to every connectable endpoint it maps to.
    pub async fn resolve_name_list(
        &self,
        name: &str,
        name_type: u16,
    ) -> Result<Vec<Endpoint>, ResolveError> {
        if let Ok(addr) = name.parse::<IpAddr>() {
            if is_zero_addr(&addr) {
                return Err(ResolveError::NotFound);
            }
            return Ok(vec![Endpoint::new(addr)]);
        }

        let sitename = self.saf.sitename_fetch(&self.config.realm);
        let list = self
            .internal_resolve_name(
                name,
                name_type,
                sitename.as_deref(),
                &self.config.resolve_order,
            )
            .await?;

        let list: Vec<Endpoint> = list
            .into_iter()
            .filter(|e| !is_zero_addr(&e.addr) && !is_broadcast_addr(&e.addr))
            .collect();
        if list.is_empty() {
            return Err(ResolveError::NotFound);
        }
        Ok(list)
    }

    /// Find the master browser or domain master browser of a workgroup.
    pub async fn find_master_ip(&self, group: &str) -> Result<Endpoint, ResolveError> {
        if self.config.disable_netbios {
            log::debug!("find_master_ip({}): netbios is disabled", group);
            return Err(ResolveError::Disabled);
        }

        for name_type in [0x1d, 0x1b] {
            if let Ok(list) = self
                .internal_resolve_name(group, name_type, None, &self.config.resolve_order)
                .await
                && let Some(first) = list.first()
            {
                return Ok(*first);
            }
        }
        Err(ResolveError::NotFound)
    }

    /// Primary domain controller of a domain, by its 0x1b name. Under
    /// ADS security a DNS-SRV-only pass runs first.
    pub async fn get_pdc_ip(&self, domain: &str) -> Result<Endpoint, ResolveError> {
        let mut list = if self.config.security == SecurityMode::Ads {
            let ads_order = vec!["ads".to_string()];
            self.internal_resolve_name(domain, 0x1b, None, &ads_order)
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        if list.is_empty() {
            list = self
                .internal_resolve_name(domain, 0x1b, None, &self.config.resolve_order)
                .await?;
        }

        if list.len() > 1 {
            // More than one address means a multi-homed PDC, not a
            // misconfiguration.
            log::info!("get_pdc_ip: PDC has {} IP addresses", list.len());
            sort_endpoints(&*self.interfaces, &mut list);
        }

        list.first().copied().ok_or(ResolveError::Unsuccessful)
    }
}
